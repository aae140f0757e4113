//! Block undo data for chain reorganizations.
//!
//! When a block is applied, every activation, expiration and takeover is recorded
//! so that [`ClaimTrieCache::decrement_block`](crate::ClaimTrieCache::decrement_block)
//! can restore the exact state the trie had before the block.

use crate::queue::Record;
use crate::trie::TakeoverState;
use serde::{Deserialize, Serialize};

/// A single reversible step of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndoOp {
    /// A pending record entered the trie. `record` carries its original valid height.
    Activated { name: Vec<u8>, record: Record },
    /// A record expired, either from the trie or from the pending queue.
    Expired {
        name: Vec<u8>,
        record: Record,
        pending: bool,
    },
}

/// Undo data for a single block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUndo {
    /// Height of the block.
    pub height: u32,

    /// Activations and expirations in the order they were applied.
    pub ops: Vec<UndoOp>,

    /// Takeover state of every checked name before the block was applied,
    /// `None` when the name had no node.
    pub takeovers: Vec<(Vec<u8>, Option<TakeoverState>)>,

    /// Takeover state of the names touched by claim operations of the block,
    /// as of the start of the block.
    pub block_start: Vec<(Vec<u8>, Option<TakeoverState>)>,
}

impl BlockUndo {
    /// Create a new empty BlockUndo.
    pub fn new(height: u32) -> Self {
        Self {
            height,
            ..Default::default()
        }
    }

    pub fn record_activation(&mut self, name: &[u8], record: Record) {
        self.ops.push(UndoOp::Activated {
            name: name.to_vec(),
            record,
        });
    }

    pub fn record_expiration(&mut self, name: &[u8], record: Record, pending: bool) {
        self.ops.push(UndoOp::Expired {
            name: name.to_vec(),
            record,
            pending,
        });
    }

    pub fn record_takeover(&mut self, name: &[u8], before: Option<TakeoverState>) {
        self.takeovers.push((name.to_vec(), before));
    }

    /// Serialize to bytes for storage.
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("BlockUndo serialization should not fail")
    }

    /// Deserialize from bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Returns the number of records activated by this block.
    pub fn activated_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, UndoOp::Activated { .. }))
            .count()
    }

    /// Returns the number of records expired by this block.
    pub fn expired_count(&self) -> usize {
        self.ops.len() - self.activated_count()
    }

    /// Returns true if the block changed nothing.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.takeovers.is_empty() && self.block_start.is_empty()
    }
}
