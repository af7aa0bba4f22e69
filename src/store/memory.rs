// src/store/memory.rs

use std::collections::HashMap;
use std::sync::Mutex;

use num_bigint::BigUint;

use super::{prefer_as_head, ChainStore, StorageError};
use crate::consensus::pow;
use crate::types::{Block, Hash};

#[derive(Default)]
struct MemInner {
    blocks: HashMap<Hash, Block>,
    heights: HashMap<Hash, u64>,
    children: HashMap<Hash, Vec<Hash>>,
    work: HashMap<Hash, BigUint>,
    head: Option<Hash>,
}

/// Thread-safe in-memory chain store. Good for tests and local nodes before
/// wiring the durable backend.
pub struct InMemoryChainStore {
    inner: Mutex<MemInner>,
}

impl InMemoryChainStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemInner::default()),
        }
    }
}

impl Default for InMemoryChainStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainStore for InMemoryChainStore {
    fn put_block(&self, block: &Block) -> Result<Hash, StorageError> {
        let hash = block.hash();
        let mut inner = self.inner.lock().unwrap();

        let existing = inner.blocks.contains_key(&hash);
        inner.blocks.insert(hash, block.clone());
        inner.heights.insert(hash, block.header.height);

        if !existing {
            let siblings = inner.children.entry(block.header.parent_hash).or_default();
            if !siblings.contains(&hash) {
                siblings.push(hash);
            }
        }

        let parent_work = inner
            .work
            .get(&block.header.parent_hash)
            .cloned()
            .unwrap_or_default();
        let total = parent_work + pow::block_work(&block.header);
        inner.work.insert(hash, total.clone());

        let update = match inner.head {
            None => true,
            Some(head) => {
                let head_work = inner.work.get(&head).cloned().unwrap_or_default();
                let head_height = inner.heights.get(&head).map(|&h| h as i64).unwrap_or(-1);
                prefer_as_head(&total, block.header.height, &head_work, head_height)
            }
        };
        if update {
            inner.head = Some(hash);
        }
        Ok(hash)
    }

    fn get_block(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        Ok(self.inner.lock().unwrap().blocks.get(hash).cloned())
    }

    fn get_head(&self) -> Result<Option<Hash>, StorageError> {
        Ok(self.inner.lock().unwrap().head)
    }

    fn set_head(&self, hash: &Hash) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.blocks.contains_key(hash) {
            return Err(StorageError::UnknownHash);
        }
        inner.head = Some(*hash);
        Ok(())
    }

    fn get_height(&self, hash: &Hash) -> Result<Option<u64>, StorageError> {
        Ok(self.inner.lock().unwrap().heights.get(hash).copied())
    }

    fn get_total_work(&self, hash: &Hash) -> Result<Option<BigUint>, StorageError> {
        Ok(self.inner.lock().unwrap().work.get(hash).cloned())
    }

    fn get_children(&self, parent: &Hash) -> Result<Vec<Hash>, StorageError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .children
            .get(parent)
            .cloned()
            .unwrap_or_default())
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.inner.lock().unwrap().blocks.len() as u64)
    }
}
