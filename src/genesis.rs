// src/genesis.rs
//
// Genesis creation and the operator-facing allocation file.
// The genesis block sits at height 0 with an all-zero parent, the empty
// merkle root (32 zero bytes) and no PoW requirement.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::crypto::merkle_root;
use crate::state::{StateError, StateStore};
use crate::store::{ChainStore, StorageError};
use crate::types::{now_ms, Block, BlockHeader};

/// Address -> initial balance in minor units.
pub type Allocations = BTreeMap<String, i64>;

/// Failures on the boot path (genesis creation or state replay). Fatal: the
/// node must not start producing on top of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootError {
    State(StateError),
    Storage(StorageError),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::State(e) => write!(f, "state seeding failed: {}", e),
            BootError::Storage(e) => write!(f, "chain store failed: {}", e),
        }
    }
}

impl std::error::Error for BootError {}

impl From<StateError> for BootError {
    fn from(e: StateError) -> Self {
        BootError::State(e)
    }
}

impl From<StorageError> for BootError {
    fn from(e: StorageError) -> Self {
        BootError::Storage(e)
    }
}

pub fn build_genesis() -> Block {
    Block {
        header: BlockHeader {
            parent_hash: [0u8; 32],
            merkle_root: merkle_root(&[]),
            height: 0,
            timestamp_ms: now_ms(),
            difficulty_bits: 0,
            nonce: 0,
        },
        transactions: Vec::new(),
    }
}

/// Credit initial balances into state.
pub fn seed_allocations(state: &StateStore, allocations: &Allocations) -> Result<(), StateError> {
    for (address, amount) in allocations {
        if address.is_empty() {
            continue;
        }
        state.credit(address, *amount)?;
    }
    Ok(())
}

/// If the chain is empty, seed balances and persist the genesis block.
/// Idempotent: does nothing when a head already exists.
pub fn init_if_needed(
    chain: &dyn ChainStore,
    state: &StateStore,
    allocations: &Allocations,
) -> Result<(), BootError> {
    if chain.get_head()?.is_some() {
        return Ok(());
    }
    seed_allocations(state, allocations)?;
    let genesis = build_genesis();
    let hash = chain.put_block(&genesis)?;
    tracing::info!(hash = %hex::encode(hash), "created genesis block");
    Ok(())
}

/// Read the allocation file if present. Unknown shapes fail loudly; values
/// must be non-negative.
pub fn load_allocations(path: &Path) -> anyhow::Result<Option<Allocations>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let allocations: Allocations = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    for (address, amount) in &allocations {
        if *amount < 0 {
            anyhow::bail!("negative allocation for {}: {}", address, amount);
        }
    }
    Ok(Some(allocations))
}

/// Write the allocation file, pretty-printed.
pub fn save_allocations(path: &Path, allocations: &Allocations) -> anyhow::Result<()> {
    let mut body = serde_json::to_string_pretty(allocations)?;
    body.push('\n');
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryChainStore;

    #[test]
    fn genesis_block_shape() {
        let genesis = build_genesis();
        assert_eq!(genesis.header.height, 0);
        assert_eq!(genesis.header.parent_hash, [0u8; 32]);
        assert_eq!(genesis.header.merkle_root, [0u8; 32]);
        assert_eq!(genesis.header.difficulty_bits, 0);
        assert!(genesis.transactions.is_empty());
    }

    #[test]
    fn init_is_idempotent() {
        let chain = InMemoryChainStore::new();
        let state = StateStore::new();
        let allocations = Allocations::from([("a11ce000".to_string(), 1_000i64)]);

        init_if_needed(&chain, &state, &allocations).unwrap();
        assert_eq!(chain.size().unwrap(), 1);
        assert_eq!(state.get_balance("a11ce000"), 1_000);

        // Second call must not mint another genesis or double-credit.
        init_if_needed(&chain, &state, &allocations).unwrap();
        assert_eq!(chain.size().unwrap(), 1);
        assert_eq!(state.get_balance("a11ce000"), 1_000);
    }

    #[test]
    fn allocation_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis-alloc.json");
        assert!(load_allocations(&path).unwrap().is_none());

        let allocations =
            Allocations::from([("a11ce000".to_string(), 5i64), ("b0b00000".to_string(), 7i64)]);
        save_allocations(&path, &allocations).unwrap();
        assert_eq!(load_allocations(&path).unwrap(), Some(allocations));
    }

    #[test]
    fn allocation_file_rejects_negative_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis-alloc.json");
        std::fs::write(&path, "{\"a11ce000\": -5}").unwrap();
        assert!(load_allocations(&path).is_err());
    }
}
