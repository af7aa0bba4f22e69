// src/store/mod.rs

pub mod memory;
pub mod sled_store;

pub use memory::InMemoryChainStore;
pub use sled_store::SledChainStore;

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigUint;

use crate::types::{Block, Hash};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    BackendFailure(String),
    UnknownHash,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::BackendFailure(msg) => write!(f, "storage backend failure: {}", msg),
            StorageError::UnknownHash => write!(f, "unknown block hash"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Persistent map of blocks keyed by header hash, with the derived indices
/// needed for fork choice: height, parent->children, cumulative work, and
/// the current head under the heaviest-chain rule.
///
/// `put_block` is atomic: block bytes, height, child link, work and any head
/// update become visible together or not at all.
pub trait ChainStore: Send + Sync {
    /// Persist a block (idempotent) and re-evaluate the head. Returns the
    /// block's hash.
    fn put_block(&self, block: &Block) -> Result<Hash, StorageError>;

    fn get_block(&self, hash: &Hash) -> Result<Option<Block>, StorageError>;

    fn get_head(&self) -> Result<Option<Hash>, StorageError>;

    /// Force the head. Fails with `UnknownHash` if the block is not stored.
    fn set_head(&self, hash: &Hash) -> Result<(), StorageError>;

    fn get_height(&self, hash: &Hash) -> Result<Option<u64>, StorageError>;

    fn get_total_work(&self, hash: &Hash) -> Result<Option<BigUint>, StorageError>;

    fn get_children(&self, parent: &Hash) -> Result<Vec<Hash>, StorageError>;

    fn size(&self) -> Result<u64, StorageError>;

    fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Walk from the head back to genesis via parent links, then reverse.
    fn blocks_in_order(&self) -> Result<Vec<Block>, StorageError> {
        let mut blocks = Vec::new();
        let Some(mut cursor) = self.get_head()? else {
            return Ok(blocks);
        };
        loop {
            let Some(block) = self.get_block(&cursor)? else {
                break;
            };
            cursor = block.header.parent_hash;
            blocks.push(block);
            if cursor == [0u8; 32] {
                break;
            }
        }
        blocks.reverse();
        Ok(blocks)
    }
}

/// Heaviest-chain rule: more cumulative work wins; on equal work the greater
/// height wins; remaining ties keep the incumbent. `head_height` is -1 when
/// the incumbent's height is unknown.
pub(crate) fn prefer_as_head(
    new_work: &BigUint,
    new_height: u64,
    head_work: &BigUint,
    head_height: i64,
) -> bool {
    match new_work.cmp(head_work) {
        Ordering::Greater => true,
        Ordering::Equal => new_height as i64 > head_height,
        Ordering::Less => false,
    }
}

/// Cumulative work is persisted as its low 256 bits, big-endian.
pub(crate) fn work_to_bytes(value: &BigUint) -> [u8; 32] {
    let raw = value.to_bytes_be();
    let mut out = [0u8; 32];
    if raw.len() >= 32 {
        out.copy_from_slice(&raw[raw.len() - 32..]);
    } else {
        out[32 - raw.len()..].copy_from_slice(&raw);
    }
    out
}

pub(crate) fn work_from_bytes(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_round_trips_through_32_bytes() {
        for v in [0u64, 1, 256, u64::MAX] {
            let w = BigUint::from(v);
            assert_eq!(work_from_bytes(&work_to_bytes(&w)), w);
        }
        let big = BigUint::from(1u8) << 200;
        assert_eq!(work_from_bytes(&work_to_bytes(&big)), big);
    }

    #[test]
    fn head_preference_orders_by_work_then_height() {
        let one = BigUint::from(1u8);
        let two = BigUint::from(2u8);
        assert!(prefer_as_head(&two, 1, &one, 5));
        assert!(!prefer_as_head(&one, 5, &two, 1));
        assert!(prefer_as_head(&one, 2, &one, 1));
        // Equal work and height keeps the incumbent.
        assert!(!prefer_as_head(&one, 1, &one, 1));
    }
}
