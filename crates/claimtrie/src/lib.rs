//! Name claim trie.
//!
//! Tracks ownership of names through staked claims, resolves competing claims
//! with supports and an incumbency based takeover delay, and commits to the
//! controlling claim of every name with a Merkle root.
//!
//! ## Architecture
//!
//! - [`ClaimTrie`]: arena prefix tree, one node per name byte, with memoized
//!   node hashes.
//! - [`ClaimTrieCache`]: overlay applying claim operations of a block,
//!   activation and expiration queues, takeovers, proofs and reorgs.
//! - [`TrieStore`]: persistence backend, [`MemoryStore`] keeps everything in
//!   memory.
//! - [`SharedClaimTrie`]: single writer, multiple readers handle.

mod cache;
mod config;
mod error;
pub mod hash;
mod params;
mod proof;
mod queue;
mod shared;
pub mod store;
mod trie;
mod undo;

pub use self::cache::{ClaimEntry, ClaimTrieCache, ClaimsForName, FlatNode};
pub use self::config::{ClaimTrieConfig, DEFAULT_CACHE_BYTES};
pub use self::error::Error;
pub use self::params::{
    ClaimTrieParams, DEFAULT_REORG_DEPTH, MAX_TAKEOVER_DELAY, Network, PROPORTIONAL_DELAY_FACTOR,
    ProportionalDelay, TakeoverDelay,
};
pub use self::proof::{Proof, ProofNode};
pub use self::queue::{ExpirationEntry, QueueEntry, Record, RecordKind};
pub use self::shared::SharedClaimTrie;
pub use self::store::{MemoryStore, TrieStore, WriteBatch};
pub use self::trie::{ClaimTrie, NodeData, TakeoverState, effective_amount};
pub use self::undo::{BlockUndo, UndoOp};
pub use claimtrie_primitives::{Claim, ClaimId, OutPoint, Support, Txid, Uint160, Uint256};

pub type Result<T> = std::result::Result<T, Error>;
