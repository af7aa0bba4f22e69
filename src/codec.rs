// src/codec.rs
//
// Canonical wire encoding. Every multi-byte integer is big-endian; every
// variable-length field is a 4-byte unsigned length followed by that many
// bytes (strings are UTF-8 under the same rule). Field order is fixed per
// type and round-trips byte-exactly.

use std::fmt;

use crate::types::{Block, BlockHeader, Hash, Transaction, ValidationError, MAX_TXS_PER_BLOCK};

const MAX_EMBEDDED_TX_BYTES: usize = 16_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    BadLength(u32),
    BadCount(u32),
    BadUtf8,
    Invalid(ValidationError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "truncated input"),
            DecodeError::BadLength(len) => write!(f, "bad field length: {}", len),
            DecodeError::BadCount(n) => write!(f, "bad item count: {}", n),
            DecodeError::BadUtf8 => write!(f, "invalid utf-8 in string field"),
            DecodeError::Invalid(e) => write!(f, "decoded value invalid: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<ValidationError> for DecodeError {
    fn from(e: ValidationError) -> Self {
        DecodeError::Invalid(e)
    }
}

// --- write primitives ---

fn put_u32(dst: &mut Vec<u8>, x: u32) {
    dst.extend_from_slice(&x.to_be_bytes());
}

fn put_u64(dst: &mut Vec<u8>, x: u64) {
    dst.extend_from_slice(&x.to_be_bytes());
}

fn put_i64(dst: &mut Vec<u8>, x: i64) {
    dst.extend_from_slice(&x.to_be_bytes());
}

fn put_bytes(dst: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(dst, bytes.len() as u32);
    dst.extend_from_slice(bytes);
}

fn put_str(dst: &mut Vec<u8>, s: &str) {
    put_bytes(dst, s.as_bytes());
}

// --- read cursor ---

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.buf.len() - self.pos < n {
            return Err(DecodeError::Truncated);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes(b.try_into().expect("4-byte slice")))
    }

    fn take_u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes(b.try_into().expect("8-byte slice")))
    }

    fn take_i64(&mut self) -> Result<i64, DecodeError> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes(b.try_into().expect("8-byte slice")))
    }

    fn take_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.take_u32()?;
        if len as usize > self.buf.len() - self.pos {
            return Err(DecodeError::BadLength(len));
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    /// Older encodings omit trailing optional fields entirely.
    fn take_bytes_or_empty(&mut self) -> Result<Vec<u8>, DecodeError> {
        if self.at_end() {
            return Ok(Vec::new());
        }
        self.take_bytes()
    }

    fn take_str(&mut self) -> Result<String, DecodeError> {
        let raw = self.take_bytes()?;
        String::from_utf8(raw).map_err(|_| DecodeError::BadUtf8)
    }

    /// Length-prefixed 32-byte hash. A zero length decodes as 32 zero bytes,
    /// the default for parents and roots.
    fn take_hash(&mut self) -> Result<Hash, DecodeError> {
        let len = self.take_u32()?;
        if len == 0 {
            return Ok([0u8; 32]);
        }
        if len != 32 {
            return Err(DecodeError::BadLength(len));
        }
        let b = self.take(32)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(b);
        Ok(out)
    }
}

// --- transaction ---

/// Unsigned form: all fields except signature and public key, fixed order.
pub fn tx_unsigned_bytes(tx: &Transaction) -> Vec<u8> {
    let mut v = Vec::with_capacity(
        4 + 4 + 4 + tx.from.len() + 4 + tx.to.len() + 8 * 4 + 4 + tx.payload.len(),
    );
    put_u32(&mut v, tx.version);
    put_u32(&mut v, tx.chain_id);
    put_str(&mut v, &tx.from);
    put_str(&mut v, &tx.to);
    put_i64(&mut v, tx.amount_minor);
    put_i64(&mut v, tx.fee_minor);
    put_u64(&mut v, tx.nonce);
    put_i64(&mut v, tx.timestamp_ms);
    put_bytes(&mut v, &tx.payload);
    v
}

/// Signed form: unsigned fields then signature and public key.
pub fn tx_bytes(tx: &Transaction) -> Vec<u8> {
    let mut v = tx_unsigned_bytes(tx);
    put_bytes(&mut v, &tx.signature);
    put_bytes(&mut v, &tx.public_key);
    v
}

pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, DecodeError> {
    let mut r = Reader::new(bytes);
    let version = r.take_u32()?;
    let chain_id = r.take_u32()?;
    let from = r.take_str()?;
    let to = r.take_str()?;
    let amount_minor = r.take_i64()?;
    let fee_minor = r.take_i64()?;
    let nonce = r.take_u64()?;
    let timestamp_ms = r.take_i64()?;
    let payload = r.take_bytes()?;
    let signature = r.take_bytes_or_empty()?;
    let public_key = r.take_bytes_or_empty()?;

    let tx = Transaction::builder()
        .version(version)
        .chain_id(chain_id)
        .from(from)
        .to(to)
        .amount_minor(amount_minor)
        .fee_minor(fee_minor)
        .nonce(nonce)
        .timestamp_ms(timestamp_ms)
        .payload(payload)
        .signature(signature)
        .public_key(public_key)
        .build()?;
    Ok(tx)
}

// --- header ---

pub fn header_bytes(h: &BlockHeader) -> Vec<u8> {
    let mut v = Vec::with_capacity((4 + 32) * 2 + 8 * 4);
    put_bytes(&mut v, &h.parent_hash);
    put_bytes(&mut v, &h.merkle_root);
    put_u64(&mut v, h.height);
    put_i64(&mut v, h.timestamp_ms);
    put_i64(&mut v, h.difficulty_bits);
    put_u64(&mut v, h.nonce);
    v
}

fn decode_header_from(r: &mut Reader<'_>) -> Result<BlockHeader, DecodeError> {
    let parent_hash = r.take_hash()?;
    let merkle_root = r.take_hash()?;
    let height = r.take_u64()?;
    let timestamp_ms = r.take_i64()?;
    let difficulty_bits = r.take_i64()?;
    let nonce = r.take_u64()?;
    Ok(BlockHeader {
        parent_hash,
        merkle_root,
        height,
        timestamp_ms,
        difficulty_bits,
        nonce,
    })
}

pub fn decode_header(bytes: &[u8]) -> Result<BlockHeader, DecodeError> {
    decode_header_from(&mut Reader::new(bytes))
}

// --- block ---

/// header_bytes || tx_count || per tx: length || signed tx bytes.
pub fn block_bytes(b: &Block) -> Vec<u8> {
    let mut v = header_bytes(&b.header);
    put_u32(&mut v, b.transactions.len() as u32);
    for tx in &b.transactions {
        put_bytes(&mut v, &tx_bytes(tx));
    }
    v
}

pub fn decode_block(bytes: &[u8]) -> Result<Block, DecodeError> {
    let mut r = Reader::new(bytes);
    let header = decode_header_from(&mut r)?;
    let count = r.take_u32()?;
    if count as usize > MAX_TXS_PER_BLOCK {
        return Err(DecodeError::BadCount(count));
    }
    let mut txs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let raw = r.take_bytes()?;
        if raw.len() > MAX_EMBEDDED_TX_BYTES {
            return Err(DecodeError::BadLength(raw.len() as u32));
        }
        txs.push(decode_transaction(&raw)?);
    }
    Block::build(header, txs).map_err(DecodeError::Invalid)
}
