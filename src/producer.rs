// src/producer.rs

use std::fmt;
use std::sync::Arc;

use crate::consensus::{self, pow, ConsensusError};
use crate::crypto::merkle_root;
use crate::mempool::Mempool;
use crate::state::{StateError, StateStore};
use crate::store::{ChainStore, StorageError};
use crate::types::{now_ms, Block, BlockHeader, Hash, Transaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProduceError {
    Consensus(ConsensusError),
    State(StateError),
    Storage(StorageError),
    FeeOverflow,
}

impl fmt::Display for ProduceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProduceError::Consensus(e) => write!(f, "block rejected: {}", e),
            ProduceError::State(e) => write!(f, "state apply failed: {}", e),
            ProduceError::Storage(e) => write!(f, "persist failed: {}", e),
            ProduceError::FeeOverflow => write!(f, "fee or reward total overflow"),
        }
    }
}

impl std::error::Error for ProduceError {}

impl From<ConsensusError> for ProduceError {
    fn from(e: ConsensusError) -> Self {
        ProduceError::Consensus(e)
    }
}

impl From<StateError> for ProduceError {
    fn from(e: StateError) -> Self {
        ProduceError::State(e)
    }
}

impl From<StorageError> for ProduceError {
    fn from(e: StorageError) -> Self {
        ProduceError::Storage(e)
    }
}

/// Builds a block from the mempool, runs PoW when configured, validates,
/// applies state and persists it. One `tick` is transactional end-to-end:
/// any failure after state was touched rolls everything back and re-queues
/// the drained txs, leaving the node as if the tick never happened.
pub struct BlockProducer {
    chain: Arc<dyn ChainStore>,
    state: Arc<StateStore>,
    mempool: Arc<Mempool>,
    difficulty_bits: i64,
    max_tx_per_block: usize,
    max_pow_tries: u64,
    miner_address: Option<String>,
    block_reward_minor: i64,
}

impl BlockProducer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<dyn ChainStore>,
        state: Arc<StateStore>,
        mempool: Arc<Mempool>,
        difficulty_bits: i64,
        max_tx_per_block: usize,
        max_pow_tries: u64,
        miner_address: Option<String>,
        block_reward_minor: i64,
    ) -> Self {
        Self {
            chain,
            state,
            mempool,
            difficulty_bits,
            max_tx_per_block,
            max_pow_tries,
            miner_address: miner_address.filter(|m| !m.is_empty()),
            block_reward_minor: block_reward_minor.max(0),
        }
    }

    /// One production attempt. Returns the new head hash if a block was
    /// produced, `None` when there was nothing to do or mining ran out of
    /// tries.
    pub fn tick(&self) -> Result<Option<Hash>, ProduceError> {
        let head = self.chain.get_head()?;
        let (parent_hash, parent_height, parent_ts): (Hash, i64, i64) = match head {
            Some(h) => match self.chain.get_block(&h)? {
                Some(parent) => (h, parent.header.height as i64, parent.header.timestamp_ms),
                None => (h, self.chain.get_height(&h)?.unwrap_or(0) as i64, 0),
            },
            None => ([0u8; 32], -1, 0),
        };
        let height = (parent_height + 1) as u64;
        // Wall clock, frozen for the whole tick; nudged past the parent so
        // consecutive ticks within one millisecond still chain.
        let timestamp_ms = now_ms().max(parent_ts + 1);

        let txs = self.mempool.get_batch(self.max_tx_per_block);
        if txs.is_empty() && height > 0 {
            // No empty blocks after genesis.
            return Ok(None);
        }

        let total_fees = sum_fees(&txs)?;
        let reward = self.compute_reward(total_fees)?;

        let ids: Vec<Hash> = txs.iter().map(|tx| tx.id()).collect();
        let header = BlockHeader {
            parent_hash,
            merkle_root: merkle_root(&ids),
            height,
            timestamp_ms,
            difficulty_bits: self.difficulty_bits,
            nonce: 0,
        };
        let template = Block {
            header,
            transactions: txs,
        };

        let final_block = if self.difficulty_bits <= 0 {
            template
        } else {
            match pow::mine(&template, self.max_pow_tries) {
                Some(mined) => mined,
                None => {
                    self.requeue(template.transactions);
                    return Ok(None);
                }
            }
        };

        let mut state_applied = false;
        let mut reward_credited = false;
        match self.commit(&final_block, reward, &mut state_applied, &mut reward_credited) {
            Ok(new_head) => {
                self.mempool.remove_all(&final_block.transactions);
                tracing::info!(
                    height = final_block.header.height,
                    txs = final_block.transactions.len(),
                    head = %hex::encode(new_head),
                    "produced block"
                );
                Ok(Some(new_head))
            }
            Err(e) => {
                if state_applied {
                    let _ = self.state.revert_block(&final_block);
                }
                if reward_credited {
                    if let Some(miner) = &self.miner_address {
                        let _ = self.state.credit(miner, -reward);
                    }
                }
                self.requeue(final_block.transactions);
                Err(e)
            }
        }
    }

    fn commit(
        &self,
        block: &Block,
        reward: i64,
        state_applied: &mut bool,
        reward_credited: &mut bool,
    ) -> Result<Hash, ProduceError> {
        consensus::validate_block(block, self.chain.as_ref())?;

        self.state.apply_block(block)?;
        *state_applied = true;
        if reward > 0 {
            if let Some(miner) = &self.miner_address {
                self.state.credit(miner, reward)?;
                *reward_credited = true;
            }
        }

        let hash = self.chain.put_block(block)?;
        Ok(self.chain.get_head()?.unwrap_or(hash))
    }

    fn compute_reward(&self, total_fees: i64) -> Result<i64, ProduceError> {
        if self.miner_address.is_none() {
            return Ok(0);
        }
        self.block_reward_minor
            .checked_add(total_fees)
            .ok_or(ProduceError::FeeOverflow)
    }

    /// Put drained txs back after a failed attempt. Individual admission
    /// failures are ignored: state was rolled back, so anything that no
    /// longer fits is dropped the same way the original admission would.
    fn requeue(&self, txs: Vec<Transaction>) {
        for tx in txs {
            let _ = self.mempool.add(tx);
        }
    }
}

fn sum_fees(txs: &[Transaction]) -> Result<i64, ProduceError> {
    let mut total: i64 = 0;
    for tx in txs {
        total = total
            .checked_add(tx.fee_minor.max(0))
            .ok_or(ProduceError::FeeOverflow)?;
    }
    Ok(total)
}
