// src/consensus/mod.rs

pub mod pow;

use std::fmt;

use crate::crypto::merkle_root;
use crate::store::{ChainStore, StorageError};
use crate::types::{now_ms, Block, Hash};

/// Maximum producer clock drift tolerated for incoming headers.
pub const MAX_FUTURE_DRIFT_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    UnknownParent,
    BadHeight { expected: u64, got: u64 },
    MerkleMismatch,
    BadProofOfWork,
    TimestampOutOfRange,
    /// Chain store failed while the rules were reading it.
    Store(StorageError),
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::UnknownParent => write!(f, "unknown parent"),
            ConsensusError::BadHeight { expected, got } => {
                write!(f, "bad block height: expected {}, got {}", expected, got)
            }
            ConsensusError::MerkleMismatch => write!(f, "merkle root mismatch"),
            ConsensusError::BadProofOfWork => write!(f, "proof-of-work target not met"),
            ConsensusError::TimestampOutOfRange => write!(f, "timestamp out of range"),
            ConsensusError::Store(e) => write!(f, "chain store failure: {}", e),
        }
    }
}

impl std::error::Error for ConsensusError {}

impl From<StorageError> for ConsensusError {
    fn from(e: StorageError) -> Self {
        ConsensusError::Store(e)
    }
}

/// Block-shape validation against the chain store.
///
/// An all-zero parent hash means "genesis parent" (parent height -1); any
/// other parent must already be stored. Height must be exactly parent + 1,
/// the merkle root must commit to the tx ids, the header must meet its own
/// PoW target, and the timestamp must be within 60s of local time and
/// strictly after the parent's.
pub fn validate_block(block: &Block, store: &dyn ChainStore) -> Result<(), ConsensusError> {
    let hdr = &block.header;
    let zero: Hash = [0u8; 32];

    let (parent_height, parent_ts) = if hdr.parent_hash == zero {
        (-1i64, None)
    } else {
        match store.get_block(&hdr.parent_hash)? {
            Some(parent) => (parent.header.height as i64, Some(parent.header.timestamp_ms)),
            None => return Err(ConsensusError::UnknownParent),
        }
    };

    let expected = (parent_height + 1) as u64;
    if hdr.height != expected {
        return Err(ConsensusError::BadHeight {
            expected,
            got: hdr.height,
        });
    }

    let ids: Vec<Hash> = block.transactions.iter().map(|tx| tx.id()).collect();
    if hdr.merkle_root != merkle_root(&ids) {
        return Err(ConsensusError::MerkleMismatch);
    }

    if !pow::meets_target(hdr) {
        return Err(ConsensusError::BadProofOfWork);
    }

    if hdr.timestamp_ms > now_ms() + MAX_FUTURE_DRIFT_MS {
        return Err(ConsensusError::TimestampOutOfRange);
    }
    if let Some(parent_ts) = parent_ts {
        if hdr.timestamp_ms <= parent_ts {
            return Err(ConsensusError::TimestampOutOfRange);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryChainStore;
    use crate::types::{now_ms, Block, BlockHeader, Transaction};

    fn empty_block(parent_hash: Hash, height: u64, timestamp_ms: i64) -> Block {
        Block {
            header: BlockHeader {
                parent_hash,
                merkle_root: [0u8; 32],
                height,
                timestamp_ms,
                difficulty_bits: 0,
                nonce: 0,
            },
            transactions: Vec::new(),
        }
    }

    fn store_with_genesis(now: i64) -> (InMemoryChainStore, Block) {
        let store = InMemoryChainStore::new();
        let genesis = empty_block([0u8; 32], 0, now);
        store.put_block(&genesis).unwrap();
        (store, genesis)
    }

    #[test]
    fn accepts_valid_child() {
        let now = now_ms();
        let (store, genesis) = store_with_genesis(now);
        let child = empty_block(genesis.hash(), 1, now + 1_000);
        assert!(validate_block(&child, &store).is_ok());
    }

    #[test]
    fn rejects_unknown_parent() {
        let store = InMemoryChainStore::new();
        let mut parent = [0u8; 32];
        parent[0] = 1;
        let block = empty_block(parent, 1, now_ms());
        assert_eq!(validate_block(&block, &store).unwrap_err(), ConsensusError::UnknownParent);
    }

    #[test]
    fn rejects_wrong_height() {
        let now = now_ms();
        let (store, genesis) = store_with_genesis(now);
        let skipped = empty_block(genesis.hash(), 2, now + 1_000);
        assert_eq!(
            validate_block(&skipped, &store).unwrap_err(),
            ConsensusError::BadHeight { expected: 1, got: 2 }
        );
        // A zero parent claims genesis, so only height 0 passes the rule.
        let fake_genesis = empty_block([0u8; 32], 3, now + 1_000);
        assert_eq!(
            validate_block(&fake_genesis, &store).unwrap_err(),
            ConsensusError::BadHeight { expected: 0, got: 3 }
        );
    }

    #[test]
    fn rejects_merkle_mismatch() {
        let now = now_ms();
        let (store, genesis) = store_with_genesis(now);
        let tx = Transaction::builder()
            .from("a11ce000")
            .to("b0b00000")
            .amount_minor(5)
            .fee_minor(1)
            .signature(vec![7u8; 64])
            .build()
            .unwrap();
        let mut block = empty_block(genesis.hash(), 1, now + 1_000);
        block.transactions.push(tx);
        // merkle_root left at zeros while the tx list is non-empty
        assert_eq!(
            validate_block(&block, &store).unwrap_err(),
            ConsensusError::MerkleMismatch
        );
    }

    #[test]
    fn rejects_unmet_pow_target() {
        let now = now_ms();
        let (store, genesis) = store_with_genesis(now);
        let mut block = empty_block(genesis.hash(), 1, now + 1_000);
        block.header.difficulty_bits = 256;
        assert_eq!(
            validate_block(&block, &store).unwrap_err(),
            ConsensusError::BadProofOfWork
        );
    }

    #[test]
    fn rejects_timestamp_too_far_in_future() {
        let now = now_ms();
        let (store, genesis) = store_with_genesis(now);
        let block = empty_block(genesis.hash(), 1, now + MAX_FUTURE_DRIFT_MS + 5_000);
        assert_eq!(
            validate_block(&block, &store).unwrap_err(),
            ConsensusError::TimestampOutOfRange
        );
    }

    #[test]
    fn rejects_timestamp_not_after_parent() {
        let now = now_ms();
        let (store, genesis) = store_with_genesis(now);
        let before = empty_block(genesis.hash(), 1, now - 1_000);
        assert_eq!(
            validate_block(&before, &store).unwrap_err(),
            ConsensusError::TimestampOutOfRange
        );
        // Equality is rejected as well.
        let equal = empty_block(genesis.hash(), 1, now);
        assert_eq!(
            validate_block(&equal, &store).unwrap_err(),
            ConsensusError::TimestampOutOfRange
        );
    }
}
