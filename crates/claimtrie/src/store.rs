//! Persistent storage interface of the claim trie.
//!
//! Records are kept in one key space, the first byte of a key selects the kind
//! of record (see [`prefix`]).

use crate::{Error, Result};
use claimtrie_primitives::Uint256;
use codec::{Decode, Encode};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Key prefixes.
pub mod prefix {
    /// Key: name bytes.
    /// Value: `NodeData` of a name holding claims.
    pub const NODE: u8 = b'n';

    /// Key: name bytes.
    /// Value: `Vec<Support>` active supports of the name.
    pub const SUPPORTS: u8 = b's';

    /// Key: height (u32, big-endian).
    /// Value: `Vec<QueueEntry>` records becoming valid at the height.
    pub const QUEUE: u8 = b'q';

    /// Key: height (u32, big-endian).
    /// Value: `Vec<ExpirationEntry>` records expiring at the height.
    pub const EXPIRATION: u8 = b'x';

    /// Key: height (u32, big-endian).
    /// Value: `BlockUndo` (bincode).
    pub const UNDO: u8 = b'u';

    /// Key: `META_KEY`.
    /// Value: `StoreMeta`.
    pub const META: u8 = b'm';
}

const META_KEY: &[u8] = b"mtrie";

pub fn name_key(prefix: u8, name: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 1);
    key.push(prefix);
    key.extend_from_slice(name);
    key
}

pub fn height_key(prefix: u8, height: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(prefix);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Parses the height of a key built by [`height_key`].
pub fn key_height(key: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = key
        .get(1..)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| Error::Store(format!("invalid height key: {}", hex::encode(key))))?;
    Ok(u32::from_be_bytes(bytes))
}

pub fn meta_key() -> Vec<u8> {
    META_KEY.to_vec()
}

/// State committed by the last flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct StoreMeta {
    /// Height of the next block to be applied.
    pub height: u32,
    /// Root hash of the trie.
    pub root: Uint256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Writes applied atomically by [`TrieStore::write`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Key-value backend of the claim trie.
pub trait TrieStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Returns every entry whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    fn write(&self, batch: WriteBatch) -> Result<()>;

    /// Removes everything.
    fn clear(&self) -> Result<()>;
}

/// In-memory [`TrieStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl TrieStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .data
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut data = self.data.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => {
                    data.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.data.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::default();
        batch.put(name_key(prefix::NODE, b"a"), vec![1]);
        batch.put(name_key(prefix::NODE, b"ab"), vec![2]);
        batch.put(name_key(prefix::SUPPORTS, b"a"), vec![3]);
        batch.put(height_key(prefix::QUEUE, 7), vec![4]);
        assert_eq!(batch.len(), 4);
        store.write(batch).unwrap();

        let nodes = store.scan_prefix(&[prefix::NODE]).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].0, b"na".to_vec());

        let rows = store.scan_prefix(&[prefix::QUEUE]).unwrap();
        assert_eq!(key_height(&rows[0].0).unwrap(), 7);
        assert!(key_height(&[prefix::QUEUE, 1]).is_err());

        let mut batch = WriteBatch::default();
        batch.delete(name_key(prefix::NODE, b"a"));
        store.write(batch).unwrap();
        assert_eq!(store.get(b"na").unwrap(), None);
        assert_eq!(store.len(), 3);

        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
