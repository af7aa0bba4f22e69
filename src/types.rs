// src/types.rs

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec;
use crate::crypto::hash_bytes_sha256;

pub type Hash = [u8; 32];

pub const MAX_PAYLOAD_BYTES: usize = 8 * 1024;
pub const SIGNATURE_BYTES: usize = 64;
pub const MIN_ADDRESS_LEN: usize = 8;
pub const MAX_ADDRESS_LEN: usize = 128;
pub const MAX_TXS_PER_BLOCK: usize = 1_000_000;

/// Milliseconds since the unix epoch, as carried in headers and transactions.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

/// Addresses are opaque identifiers: 8-128 chars drawn from [0-9a-fA-F_:-].
pub fn is_valid_address(addr: &str) -> bool {
    let len = addr.len();
    if len < MIN_ADDRESS_LEN || len > MAX_ADDRESS_LEN {
        return false;
    }
    addr.chars()
        .all(|c| c.is_ascii_hexdigit() || c == '_' || c == '-' || c == ':')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    UnsupportedVersion(u32),
    BadChainId(u32),
    BadAddress(&'static str),
    SelfTransfer,
    NonPositiveAmount(i64),
    NegativeFee(i64),
    BadTimestamp(i64),
    PayloadTooLarge(usize),
    BadSignatureLength(usize),
    TooManyTransactions(usize),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UnsupportedVersion(v) => write!(f, "unsupported version: {}", v),
            ValidationError::BadChainId(id) => write!(f, "invalid chain id: {}", id),
            ValidationError::BadAddress(field) => write!(f, "bad {} address", field),
            ValidationError::SelfTransfer => write!(f, "from == to"),
            ValidationError::NonPositiveAmount(a) => write!(f, "amount must be > 0, got {}", a),
            ValidationError::NegativeFee(fee) => write!(f, "fee must be >= 0, got {}", fee),
            ValidationError::BadTimestamp(ts) => write!(f, "timestamp must be > 0, got {}", ts),
            ValidationError::PayloadTooLarge(len) => {
                write!(f, "payload too large: {} bytes (max {})", len, MAX_PAYLOAD_BYTES)
            }
            ValidationError::BadSignatureLength(len) => {
                write!(f, "signature must be empty or {} bytes, got {}", SIGNATURE_BYTES, len)
            }
            ValidationError::TooManyTransactions(n) => {
                write!(f, "too many transactions: {} (max {})", n, MAX_TXS_PER_BLOCK)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Immutable value transfer. `id` is the SHA-256 of the unsigned encoding,
/// so it never moves when the signature or public key change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub chain_id: u32,
    pub from: String,
    pub to: String,
    pub amount_minor: i64,
    pub fee_minor: i64,
    pub nonce: u64,
    pub timestamp_ms: i64,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
}

impl Transaction {
    pub fn builder() -> TransactionBuilder {
        TransactionBuilder::new()
    }

    /// Stateless checks only; stateful admission lives in the mempool.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version != 1 {
            return Err(ValidationError::UnsupportedVersion(self.version));
        }
        if self.chain_id == 0 {
            return Err(ValidationError::BadChainId(self.chain_id));
        }
        if !is_valid_address(&self.from) {
            return Err(ValidationError::BadAddress("from"));
        }
        if !is_valid_address(&self.to) {
            return Err(ValidationError::BadAddress("to"));
        }
        if self.from == self.to {
            return Err(ValidationError::SelfTransfer);
        }
        if self.amount_minor <= 0 {
            return Err(ValidationError::NonPositiveAmount(self.amount_minor));
        }
        if self.fee_minor < 0 {
            return Err(ValidationError::NegativeFee(self.fee_minor));
        }
        if self.timestamp_ms <= 0 {
            return Err(ValidationError::BadTimestamp(self.timestamp_ms));
        }
        if self.payload.len() > MAX_PAYLOAD_BYTES {
            return Err(ValidationError::PayloadTooLarge(self.payload.len()));
        }
        if !self.signature.is_empty() && self.signature.len() != SIGNATURE_BYTES {
            return Err(ValidationError::BadSignatureLength(self.signature.len()));
        }
        Ok(())
    }

    /// Deterministic encoding of everything except signature and public key.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        codec::tx_unsigned_bytes(self)
    }

    /// Full wire encoding, signature and public key included.
    pub fn serialize(&self) -> Vec<u8> {
        codec::tx_bytes(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Transaction, codec::DecodeError> {
        codec::decode_transaction(bytes)
    }

    pub fn id(&self) -> Hash {
        hash_bytes_sha256(&self.unsigned_bytes())
    }
}

pub struct TransactionBuilder {
    version: u32,
    chain_id: u32,
    from: String,
    to: String,
    amount_minor: i64,
    fee_minor: i64,
    nonce: u64,
    timestamp_ms: i64,
    payload: Vec<u8>,
    signature: Vec<u8>,
    public_key: Vec<u8>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            version: 1,
            chain_id: 1,
            from: String::new(),
            to: String::new(),
            amount_minor: 0,
            fee_minor: 0,
            nonce: 0,
            timestamp_ms: now_ms(),
            payload: Vec::new(),
            signature: Vec::new(),
            public_key: Vec::new(),
        }
    }

    pub fn version(mut self, v: u32) -> Self {
        self.version = v;
        self
    }
    pub fn chain_id(mut self, id: u32) -> Self {
        self.chain_id = id;
        self
    }
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }
    pub fn amount_minor(mut self, amount: i64) -> Self {
        self.amount_minor = amount;
        self
    }
    pub fn fee_minor(mut self, fee: i64) -> Self {
        self.fee_minor = fee;
        self
    }
    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }
    pub fn timestamp_ms(mut self, ts: i64) -> Self {
        self.timestamp_ms = ts;
        self
    }
    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }
    pub fn signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = signature;
        self
    }
    pub fn public_key(mut self, public_key: Vec<u8>) -> Self {
        self.public_key = public_key;
        self
    }

    pub fn build(self) -> Result<Transaction, ValidationError> {
        let tx = Transaction {
            version: self.version,
            chain_id: self.chain_id,
            from: self.from,
            to: self.to,
            amount_minor: self.amount_minor,
            fee_minor: self.fee_minor,
            nonce: self.nonce,
            timestamp_ms: self.timestamp_ms,
            payload: self.payload,
            signature: self.signature,
            public_key: self.public_key,
        };
        tx.validate()?;
        Ok(tx)
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything needed to identify and verify a block without tx bodies.
/// An all-zero parent_hash marks a genesis parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub parent_hash: Hash,
    pub merkle_root: Hash,
    pub height: u64,
    pub timestamp_ms: i64,
    /// Required leading zero bits of the header hash; clamped to [0, 256].
    pub difficulty_bits: i64,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn serialize(&self) -> Vec<u8> {
        codec::header_bytes(self)
    }

    pub fn hash(&self) -> Hash {
        hash_bytes_sha256(&self.serialize())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn build(header: BlockHeader, transactions: Vec<Transaction>) -> Result<Block, ValidationError> {
        if transactions.len() > MAX_TXS_PER_BLOCK {
            return Err(ValidationError::TooManyTransactions(transactions.len()));
        }
        Ok(Block { header, transactions })
    }

    pub fn serialize(&self) -> Vec<u8> {
        codec::block_bytes(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Block, codec::DecodeError> {
        codec::decode_block(bytes)
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TransactionBuilder {
        Transaction::builder()
            .from("a11ce000")
            .to("b0b00000")
            .amount_minor(10)
            .fee_minor(1)
    }

    #[test]
    fn builder_accepts_valid_transfer() {
        let tx = base().build().expect("valid tx");
        assert_eq!(tx.version, 1);
        assert_eq!(tx.amount_minor, 10);
    }

    #[test]
    fn rejects_self_transfer() {
        let err = base().to("a11ce000").build().unwrap_err();
        assert_eq!(err, ValidationError::SelfTransfer);
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(!is_valid_address("short"));
        assert!(!is_valid_address("has spaces"));
        assert!(is_valid_address("a11ce000"));
        assert!(is_valid_address("00ff:aa-bb_cc"));
        let err = base().from("xyz").build().unwrap_err();
        assert_eq!(err, ValidationError::BadAddress("from"));
    }

    #[test]
    fn rejects_bad_amounts_and_fees() {
        assert_eq!(
            base().amount_minor(0).build().unwrap_err(),
            ValidationError::NonPositiveAmount(0)
        );
        assert_eq!(
            base().fee_minor(-1).build().unwrap_err(),
            ValidationError::NegativeFee(-1)
        );
    }

    #[test]
    fn rejects_bad_signature_length() {
        let err = base().signature(vec![0u8; 10]).build().unwrap_err();
        assert_eq!(err, ValidationError::BadSignatureLength(10));
        assert!(base().signature(vec![0u8; 64]).build().is_ok());
        assert!(base().signature(Vec::new()).build().is_ok());
    }

    #[test]
    fn rejects_oversize_payload() {
        let err = base().payload(vec![0u8; MAX_PAYLOAD_BYTES + 1]).build().unwrap_err();
        assert_eq!(err, ValidationError::PayloadTooLarge(MAX_PAYLOAD_BYTES + 1));
    }

    #[test]
    fn id_ignores_signature() {
        let tx = base().signature(vec![1u8; 64]).build().unwrap();
        let mut other = tx.clone();
        other.signature = vec![9u8; 64];
        other.public_key = vec![5u8; 32];
        assert_eq!(tx.id(), other.id());
        assert_ne!(tx.serialize(), other.serialize());
    }
}
