use crate::cache::ClaimTrieCache;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Claim trie shared between the block processor and readers.
///
/// Block processing holds the write guard for the duration of a block, queries
/// run concurrently under read guards.
#[derive(Debug, Clone)]
pub struct SharedClaimTrie(Arc<RwLock<ClaimTrieCache>>);

impl SharedClaimTrie {
    pub fn new(cache: ClaimTrieCache) -> Self {
        Self(Arc::new(RwLock::new(cache)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ClaimTrieCache> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ClaimTrieCache> {
        self.0.write()
    }
}
