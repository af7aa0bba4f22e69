// src/node.rs
//
// Wires state, storage, mempool and the block producer. Start once, then
// call tick() periodically (the bootstrap drives it from a worker thread).

use std::path::Path;
use std::sync::Arc;

use crate::genesis::{self, Allocations, BootError};
use crate::mempool::Mempool;
use crate::producer::{BlockProducer, ProduceError};
use crate::replay;
use crate::state::StateStore;
use crate::store::{ChainStore, InMemoryChainStore, SledChainStore, StorageError};
use crate::types::Hash;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Required leading zero bits for PoW; <= 0 disables mining.
    pub difficulty_bits: i64,
    pub max_tx_per_block: usize,
    /// Nonce attempts per tick before giving up.
    pub max_pow_tries: u64,
    pub genesis_allocations: Allocations,
    pub miner_address: Option<String>,
    pub block_reward_minor: i64,
    pub min_fee_minor: i64,
}

impl NodeConfig {
    pub fn default_local() -> Self {
        let genesis_allocations = Allocations::from([
            ("a11ce000".to_string(), 1_000_000i64),
            ("b0b00000".to_string(), 500_000i64),
        ]);
        Self {
            difficulty_bits: 12,
            max_tx_per_block: 1_000,
            max_pow_tries: 2_000_000,
            genesis_allocations,
            miner_address: None,
            block_reward_minor: 50,
            min_fee_minor: 1,
        }
    }

    pub fn with_miner(mut self, miner_address: impl Into<String>, block_reward_minor: i64) -> Self {
        self.miner_address = Some(miner_address.into());
        self.block_reward_minor = block_reward_minor;
        self
    }
}

pub struct Node {
    chain: Arc<dyn ChainStore>,
    state: Arc<StateStore>,
    mempool: Arc<Mempool>,
    producer: BlockProducer,
    config: NodeConfig,
}

impl Node {
    pub fn new(chain: Arc<dyn ChainStore>, config: NodeConfig) -> Self {
        let state = Arc::new(StateStore::new());
        let mempool = Arc::new(Mempool::new(state.clone(), config.min_fee_minor));
        let producer = BlockProducer::new(
            chain.clone(),
            state.clone(),
            mempool.clone(),
            config.difficulty_bits,
            config.max_tx_per_block,
            config.max_pow_tries,
            config.miner_address.clone(),
            config.block_reward_minor,
        );
        Self {
            chain,
            state,
            mempool,
            producer,
            config,
        }
    }

    /// Local node backed by the in-memory store.
    pub fn in_memory(config: NodeConfig) -> Self {
        Self::new(Arc::new(InMemoryChainStore::new()), config)
    }

    /// Node backed by the durable store under `data_dir`.
    pub fn durable(config: NodeConfig, data_dir: &Path) -> Result<Self, StorageError> {
        let chain = SledChainStore::open(data_dir.join("chain"))?;
        Ok(Self::new(Arc::new(chain), config))
    }

    /// Ensure genesis exists and state matches the persisted chain. Safe to
    /// call multiple times; failures here are fatal for the node.
    pub fn start(&self) -> Result<(), BootError> {
        if self.chain.get_head()?.is_some() {
            replay::replay(self.chain.as_ref(), &self.state, &self.config.genesis_allocations)
        } else {
            genesis::init_if_needed(
                self.chain.as_ref(),
                &self.state,
                &self.config.genesis_allocations,
            )
        }
    }

    /// Try to produce one block; returns the new head hash if produced.
    pub fn tick(&self) -> Result<Option<Hash>, ProduceError> {
        self.producer.tick()
    }

    /// Flush underlying resources (durable store).
    pub fn close(&self) -> Result<(), StorageError> {
        self.chain.close()
    }

    pub fn chain(&self) -> &Arc<dyn ChainStore> {
        &self.chain
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn mempool(&self) -> &Arc<Mempool> {
        &self.mempool
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}
