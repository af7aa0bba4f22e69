// src/state.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crate::types::{Block, Transaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    Overflow,
    /// Invariant violation: applying a tx would drive the sender negative.
    NegativeBalance {
        address: String,
        have: i64,
        need: i64,
    },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::Overflow => write!(f, "balance arithmetic overflow"),
            StateError::NegativeBalance { address, have, need } => {
                write!(f, "insufficient balance for {}: have {}, need {}", address, have, need)
            }
        }
    }
}

impl std::error::Error for StateError {}

#[derive(Default)]
struct StateInner {
    balances: HashMap<String, i64>,
    nonces: HashMap<String, u64>,
}

impl StateInner {
    fn balance(&self, address: &str) -> i64 {
        *self.balances.get(address).unwrap_or(&0)
    }

    fn nonce(&self, address: &str) -> u64 {
        *self.nonces.get(address).unwrap_or(&0)
    }

    fn apply_tx(&mut self, tx: &Transaction) -> Result<(), StateError> {
        let need = tx
            .amount_minor
            .checked_add(tx.fee_minor)
            .ok_or(StateError::Overflow)?;
        let have = self.balance(&tx.from);
        if have < need {
            return Err(StateError::NegativeBalance {
                address: tx.from.clone(),
                have,
                need,
            });
        }
        let new_to = self
            .balance(&tx.to)
            .checked_add(tx.amount_minor)
            .ok_or(StateError::Overflow)?;
        let new_nonce = self.nonce(&tx.from).checked_add(1).ok_or(StateError::Overflow)?;

        self.balances.insert(tx.from.clone(), have - need);
        self.nonces.insert(tx.from.clone(), new_nonce);
        self.balances.insert(tx.to.clone(), new_to);
        Ok(())
    }

    fn revert_tx(&mut self, tx: &Transaction) -> Result<(), StateError> {
        let need = tx
            .amount_minor
            .checked_add(tx.fee_minor)
            .ok_or(StateError::Overflow)?;
        let new_to = self
            .balance(&tx.to)
            .checked_sub(tx.amount_minor)
            .ok_or(StateError::Overflow)?;
        let new_from = self.balance(&tx.from).checked_add(need).ok_or(StateError::Overflow)?;
        let new_nonce = self.nonce(&tx.from).checked_sub(1).ok_or(StateError::Overflow)?;

        self.balances.insert(tx.to.clone(), new_to);
        self.balances.insert(tx.from.clone(), new_from);
        self.nonces.insert(tx.from.clone(), new_nonce);
        Ok(())
    }
}

/// In-memory balances and nonces. Missing entries read as (0, 0).
/// All operations are serialized under one lock; block-granularity apply is
/// all-or-nothing so a failed block leaves state untouched.
pub struct StateStore {
    inner: Mutex<StateInner>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StateInner::default()),
        }
    }

    pub fn get_balance(&self, address: &str) -> i64 {
        self.inner.lock().unwrap().balance(address)
    }

    pub fn get_nonce(&self, address: &str) -> u64 {
        self.inner.lock().unwrap().nonce(address)
    }

    pub fn set_balance(&self, address: &str, balance: i64) {
        self.inner
            .lock()
            .unwrap()
            .balances
            .insert(address.to_string(), balance);
    }

    pub fn set_nonce(&self, address: &str, nonce: u64) {
        self.inner
            .lock()
            .unwrap()
            .nonces
            .insert(address.to_string(), nonce);
    }

    /// Amount may be negative; the producer uses that to undo a reward credit.
    pub fn credit(&self, address: &str, amount: i64) -> Result<(), StateError> {
        let mut inner = self.inner.lock().unwrap();
        let new = inner
            .balance(address)
            .checked_add(amount)
            .ok_or(StateError::Overflow)?;
        inner.balances.insert(address.to_string(), new);
        Ok(())
    }

    /// balance[from] -= amount + fee; nonce[from] += 1; balance[to] += amount.
    /// Fees are burned unless the producer credits them back to a miner.
    pub fn apply_tx(&self, tx: &Transaction) -> Result<(), StateError> {
        self.inner.lock().unwrap().apply_tx(tx)
    }

    /// Exact arithmetic inverse of `apply_tx`.
    pub fn revert_tx(&self, tx: &Transaction) -> Result<(), StateError> {
        self.inner.lock().unwrap().revert_tx(tx)
    }

    pub fn apply_block(&self, block: &Block) -> Result<(), StateError> {
        let mut inner = self.inner.lock().unwrap();
        for (applied, tx) in block.transactions.iter().enumerate() {
            if let Err(e) = inner.apply_tx(tx) {
                for done in block.transactions[..applied].iter().rev() {
                    let _ = inner.revert_tx(done);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn revert_block(&self, block: &Block) -> Result<(), StateError> {
        let mut inner = self.inner.lock().unwrap();
        for tx in block.transactions.iter().rev() {
            inner.revert_tx(tx)?;
        }
        Ok(())
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
