use crate::params::{ClaimTrieParams, Network};
use std::path::PathBuf;

/// Default cache size handed to the storage backend, 32 MiB.
pub const DEFAULT_CACHE_BYTES: usize = 32 * 1024 * 1024;

/// Construction parameters of [`ClaimTrieCache`](crate::ClaimTrieCache).
///
/// `cache_bytes` and `data_dir` are passed through to the storage backend and
/// play no part in the trie algorithms.
#[derive(Debug, Clone)]
pub struct ClaimTrieConfig {
    /// Cache capacity of the storage backend in bytes.
    pub cache_bytes: usize,
    /// Discard existing persisted state on open.
    pub wipe: bool,
    /// Height of the next block to be applied.
    pub height: u32,
    /// Storage location.
    pub data_dir: PathBuf,
    pub params: ClaimTrieParams,
}

impl ClaimTrieConfig {
    pub fn new(network: Network, data_dir: PathBuf) -> Self {
        Self {
            cache_bytes: DEFAULT_CACHE_BYTES,
            wipe: false,
            height: 0,
            data_dir,
            params: ClaimTrieParams::new(network),
        }
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    pub fn with_wipe(mut self, wipe: bool) -> Self {
        self.wipe = wipe;
        self
    }

    pub fn with_params(mut self, params: ClaimTrieParams) -> Self {
        self.params = params;
        self
    }

    /// Directory of the claim trie database inside `data_dir`.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("claimtrie")
    }
}

impl Default for ClaimTrieConfig {
    fn default() -> Self {
        Self::new(Network::Regtest, PathBuf::from("."))
    }
}
