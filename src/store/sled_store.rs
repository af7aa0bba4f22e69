// src/store/sled_store.rs
//
// Durable chain store on sled. The five key families of the chain layout
// each get their own tree so iteration stays cheap per family:
//
//  - "blocks"   : block hash (32) -> serialized block
//  - "heights"  : block hash (32) -> height (8, big-endian)
//  - "meta"     : "head"          -> block hash (32)
//  - "children" : parent hash(32) -> child hashes (32 * n, deduplicated)
//  - "work"     : block hash (32) -> cumulative work (32, big-endian)
//
// `put_block` commits all five families in a single cross-tree transaction.

use std::fmt::Display;
use std::path::Path;

use num_bigint::BigUint;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};

use super::{prefer_as_head, work_from_bytes, work_to_bytes, ChainStore, StorageError};
use crate::codec;
use crate::consensus::pow;
use crate::types::{Block, Hash};

const TREE_BLOCKS: &str = "blocks";
const TREE_HEIGHTS: &str = "heights";
const TREE_META: &str = "meta";
const TREE_CHILDREN: &str = "children";
const TREE_WORK: &str = "work";
const HEAD_KEY: &[u8] = b"head";

pub struct SledChainStore {
    db: Db,
    blocks: Tree,
    heights: Tree,
    meta: Tree,
    children: Tree,
    work: Tree,
}

fn backend(e: impl Display) -> StorageError {
    StorageError::BackendFailure(e.to_string())
}

/// Append a 32-byte child hash to a concatenated child list, skipping
/// duplicates.
fn append_child(existing: &[u8], child: &Hash) -> Vec<u8> {
    if existing.chunks(32).any(|c| c == child) {
        return existing.to_vec();
    }
    let mut updated = Vec::with_capacity(existing.len() + 32);
    updated.extend_from_slice(existing);
    updated.extend_from_slice(child);
    updated
}

fn hash_from(bytes: &[u8]) -> Result<Hash, StorageError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| backend(format!("expected 32-byte hash, got {} bytes", bytes.len())))?;
    Ok(arr)
}

fn height_from(bytes: &[u8]) -> Result<u64, StorageError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| backend(format!("expected 8-byte height, got {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

impl SledChainStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(backend)?;
        let blocks = db.open_tree(TREE_BLOCKS).map_err(backend)?;
        let heights = db.open_tree(TREE_HEIGHTS).map_err(backend)?;
        let meta = db.open_tree(TREE_META).map_err(backend)?;
        let children = db.open_tree(TREE_CHILDREN).map_err(backend)?;
        let work = db.open_tree(TREE_WORK).map_err(backend)?;
        Ok(Self {
            db,
            blocks,
            heights,
            meta,
            children,
            work,
        })
    }
}

impl ChainStore for SledChainStore {
    fn put_block(&self, block: &Block) -> Result<Hash, StorageError> {
        let hash = block.hash();
        let body = codec::block_bytes(block);
        let height_bytes = block.header.height.to_be_bytes();
        let own_work = pow::block_work(&block.header);
        let parent = block.header.parent_hash;

        (&self.blocks, &self.heights, &self.meta, &self.children, &self.work)
            .transaction(|(blocks, heights, meta, children, work)| {
                blocks.insert(&hash[..], body.as_slice())?;
                heights.insert(&hash[..], &height_bytes[..])?;

                let existing = children
                    .get(&parent[..])?
                    .map(|v| v.to_vec())
                    .unwrap_or_default();
                children.insert(&parent[..], append_child(&existing, &hash))?;

                let parent_work = work
                    .get(&parent[..])?
                    .map(|v| work_from_bytes(&v))
                    .unwrap_or_default();
                let total = parent_work + &own_work;
                work.insert(&hash[..], &work_to_bytes(&total)[..])?;

                let update = match meta.get(HEAD_KEY)? {
                    None => true,
                    Some(head) => {
                        let head_work = work
                            .get(&head)?
                            .map(|v| work_from_bytes(&v))
                            .unwrap_or_default();
                        let head_height = heights
                            .get(&head)?
                            .and_then(|v| v.as_ref().try_into().ok().map(u64::from_be_bytes))
                            .map(|h: u64| h as i64)
                            .unwrap_or(-1);
                        prefer_as_head(&total, block.header.height, &head_work, head_height)
                    }
                };
                if update {
                    meta.insert(HEAD_KEY, &hash[..])?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e: TransactionError<()>| match e {
                TransactionError::Storage(err) => backend(err),
                TransactionError::Abort(()) => backend("transaction aborted"),
            })?;

        Ok(hash)
    }

    fn get_block(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        match self.blocks.get(&hash[..]).map_err(backend)? {
            Some(body) => {
                let block = codec::decode_block(&body)
                    .map_err(|e| backend(format!("corrupt block body: {}", e)))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    fn get_head(&self) -> Result<Option<Hash>, StorageError> {
        match self.meta.get(HEAD_KEY).map_err(backend)? {
            Some(v) => Ok(Some(hash_from(&v)?)),
            None => Ok(None),
        }
    }

    fn set_head(&self, hash: &Hash) -> Result<(), StorageError> {
        if self.blocks.get(&hash[..]).map_err(backend)?.is_none() {
            return Err(StorageError::UnknownHash);
        }
        self.meta.insert(HEAD_KEY, &hash[..]).map_err(backend)?;
        Ok(())
    }

    fn get_height(&self, hash: &Hash) -> Result<Option<u64>, StorageError> {
        match self.heights.get(&hash[..]).map_err(backend)? {
            Some(v) => Ok(Some(height_from(&v)?)),
            None => Ok(None),
        }
    }

    fn get_total_work(&self, hash: &Hash) -> Result<Option<BigUint>, StorageError> {
        Ok(self
            .work
            .get(&hash[..])
            .map_err(backend)?
            .map(|v| work_from_bytes(&v)))
    }

    fn get_children(&self, parent: &Hash) -> Result<Vec<Hash>, StorageError> {
        let Some(data) = self.children.get(&parent[..]).map_err(backend)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(data.len() / 32);
        for chunk in data.chunks(32) {
            out.push(hash_from(chunk)?);
        }
        Ok(out)
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.blocks.len() as u64)
    }

    fn close(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(backend)?;
        Ok(())
    }
}
