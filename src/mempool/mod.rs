// src/mempool/mod.rs

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::state::StateStore;
use crate::types::{Transaction, ValidationError};


/// Errors that can happen when adding a tx to the mempool (admission).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    Invalid(ValidationError),
    FeeBelowMinimum { min: i64, got: i64 },
    BadNonce { expected: u64, got: u64 },
    InsufficientBalance { need: i64, have: i64 },
    MissingSignature,
    /// Reserved: replacement of a pending (from, nonce) entry is currently allowed.
    DuplicateReplacementRejected,
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::Invalid(e) => write!(f, "invalid transaction: {}", e),
            AdmissionError::FeeBelowMinimum { min, got } => {
                write!(f, "fee below minimum: min {}, got {}", min, got)
            }
            AdmissionError::BadNonce { expected, got } => {
                write!(f, "bad nonce: expected {}, got {}", expected, got)
            }
            AdmissionError::InsufficientBalance { need, have } => {
                write!(f, "insufficient balance: need {}, have {}", need, have)
            }
            AdmissionError::MissingSignature => write!(f, "missing signature"),
            AdmissionError::DuplicateReplacementRejected => {
                write!(f, "duplicate replacement rejected")
            }
        }
    }
}

impl std::error::Error for AdmissionError {}

impl From<ValidationError> for AdmissionError {
    fn from(e: ValidationError) -> Self {
        AdmissionError::Invalid(e)
    }
}

#[derive(Default)]
struct PoolInner {
    /// Per-sender pending txs ordered by nonce.
    by_sender: HashMap<String, BTreeMap<u64, Transaction>>,
    /// Insertion order over (from, nonce) keys; a replacement re-enters at the back.
    fifo: VecDeque<(String, u64)>,
}

/// Stateful admission queue. Admission checks run against the shared state
/// store: fee floor, exact next nonce, spendable funds, and a present
/// signature (cryptographic verification belongs to the wallet adapter that
/// submits the tx).
pub struct Mempool {
    state: Arc<StateStore>,
    min_fee_minor: i64,
    inner: RwLock<PoolInner>,
}

impl Mempool {
    pub fn new(state: Arc<StateStore>, min_fee_minor: i64) -> Self {
        Self {
            state,
            min_fee_minor,
            inner: RwLock::new(PoolInner::default()),
        }
    }

    /// Validate and enqueue. A pending tx with the same (from, nonce) is
    /// replaced and loses its FIFO position.
    pub fn add(&self, tx: Transaction) -> Result<(), AdmissionError> {
        tx.validate()?;
        if tx.fee_minor < self.min_fee_minor {
            return Err(AdmissionError::FeeBelowMinimum {
                min: self.min_fee_minor,
                got: tx.fee_minor,
            });
        }
        let expected = self.state.get_nonce(&tx.from);
        if tx.nonce != expected {
            return Err(AdmissionError::BadNonce {
                expected,
                got: tx.nonce,
            });
        }
        let have = self.state.get_balance(&tx.from);
        let need = tx
            .amount_minor
            .checked_add(tx.fee_minor)
            .ok_or(AdmissionError::InsufficientBalance { need: i64::MAX, have })?;
        if have < need {
            return Err(AdmissionError::InsufficientBalance { need, have });
        }
        if tx.signature.is_empty() {
            return Err(AdmissionError::MissingSignature);
        }

        let key = (tx.from.clone(), tx.nonce);
        let mut inner = self.inner.write().unwrap();
        let seq = inner.by_sender.entry(tx.from.clone()).or_default();
        let replaced = seq.insert(tx.nonce, tx).is_some();
        if replaced {
            inner.fifo.retain(|k| k != &key);
        }
        inner.fifo.push_back(key);
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.inner.read().unwrap().fifo.len()
    }

    /// Pop up to `max` txs in FIFO order, removing them from the pool.
    pub fn get_batch(&self, max: usize) -> Vec<Transaction> {
        let mut inner = self.inner.write().unwrap();
        let mut out = Vec::with_capacity(max.min(inner.fifo.len()));
        for _ in 0..max {
            let Some((from, nonce)) = inner.fifo.pop_front() else {
                break;
            };
            let mut emptied = false;
            if let Some(seq) = inner.by_sender.get_mut(&from) {
                if let Some(tx) = seq.remove(&nonce) {
                    out.push(tx);
                }
                emptied = seq.is_empty();
            }
            if emptied {
                inner.by_sender.remove(&from);
            }
        }
        out
    }

    /// Remove by (from, nonce) identity. Absent entries are ignored.
    pub fn remove_all(&self, txs: &[Transaction]) {
        let mut inner = self.inner.write().unwrap();
        for tx in txs {
            let key = (tx.from.clone(), tx.nonce);
            let mut removed = false;
            let mut emptied = false;
            if let Some(seq) = inner.by_sender.get_mut(&tx.from) {
                removed = seq.remove(&tx.nonce).is_some();
                emptied = seq.is_empty();
            }
            if emptied {
                inner.by_sender.remove(&tx.from);
            }
            if removed {
                inner.fifo.retain(|k| k != &key);
            }
        }
    }
}
