use super::ClaimTrieCache;
use crate::queue::ExpirationEntry;
use crate::store::{self, prefix};
use crate::trie::TakeoverState;
use crate::undo::{BlockUndo, UndoOp};
use crate::{Error, Result};
use std::collections::BTreeMap;

impl ClaimTrieCache {
    /// Applies the end of block `height` and opens `height + 1`.
    ///
    /// Activates the pending records due at `height`, expires the records
    /// scheduled for `height` and checks every touched name for a takeover. A
    /// name whose controlling claim changes activates all of its pending
    /// records at once and records `height` as its takeover height.
    ///
    /// Opening the expiration fork height extends every scheduled expiration.
    pub fn increment_block(&mut self, height: u32) -> Result<()> {
        if height != self.next_height {
            return Err(Error::InvalidHeight(format!(
                "cannot apply block {height}, open height is {}",
                self.next_height
            )));
        }
        let next_height = height.checked_add(1).ok_or_else(|| {
            Error::InvalidHeight(format!("cannot apply block {height}, no height follows it"))
        })?;

        let mut undo = BlockUndo::new(height);
        undo.block_start = self
            .block_start
            .iter()
            .map(|(name, state)| (name.clone(), *state))
            .collect();

        // Takeover state of every name this block checks, before any change.
        let mut before: BTreeMap<Vec<u8>, Option<TakeoverState>> = self
            .block_start
            .keys()
            .map(|name| (name.clone(), self.node_takeover(name)))
            .collect();

        for entry in self.pending.take_row(height) {
            if !before.contains_key(&entry.name) {
                before.insert(entry.name.clone(), self.node_takeover(&entry.name));
            }
            tracing::trace!(
                "Activating {:?} {} on {} at {height}",
                entry.record.kind(),
                entry.record.outpoint(),
                hex::encode(&entry.name)
            );
            self.insert_active(&entry.name, entry.record.clone());
            undo.record_activation(&entry.name, entry.record);
        }

        for ExpirationEntry {
            name,
            kind,
            outpoint,
        } in self.expirations.take(height)
        {
            if !before.contains_key(&name) {
                before.insert(name.clone(), self.node_takeover(&name));
            }
            let (record, pending) = match self.remove_active(&name, kind, &outpoint) {
                Some(record) => (record, false),
                None => match self.pending.remove(&name, kind, &outpoint) {
                    Some(record) => (record, true),
                    None => {
                        tracing::warn!(
                            "Expiring {kind:?} {outpoint} on {} at {height}: record not found",
                            hex::encode(&name)
                        );
                        continue;
                    }
                },
            };
            tracing::trace!(
                "Expired {kind:?} {outpoint} on {} at {height}",
                hex::encode(&name)
            );
            self.unindex_claim(&name, &record);
            undo.record_expiration(&name, record, pending);
        }

        let mut takeovers = 0usize;
        for (name, pre_block) in &before {
            let start = match self.block_start.get(name) {
                Some(state) => *state,
                None => *pre_block,
            };
            if self.check_takeover(name, start, height, &mut undo) {
                takeovers += 1;
            }
            undo.record_takeover(name, *pre_block);
        }

        self.block_start.clear();
        self.next_height = next_height;
        if next_height == self.params.extended_expiration_fork_height {
            self.shift_expirations(true);
        }

        tracing::debug!(
            "Applied claim trie block {height}: {} activated, {} expired, {takeovers} takeovers, {} names, {} claims",
            undo.activated_count(),
            undo.expired_count(),
            self.trie.name_count(),
            self.trie.claim_count(),
        );

        self.undo_log.insert(height, undo);
        self.undo_log = self.undo_log.split_off(&self.undo_floor());

        Ok(())
    }

    /// Resolves the controlling claim of `name` at the end of block `height`.
    ///
    /// Returns whether a takeover happened.
    fn check_takeover(
        &mut self,
        name: &[u8],
        start: Option<TakeoverState>,
        height: u32,
        undo: &mut BlockUndo,
    ) -> bool {
        let previous = start.and_then(|state| state.claim_id);
        let candidate = self
            .trie
            .get(name)
            .and_then(|data| data.best_claim())
            .map(|claim| claim.claim_id);

        let takeover = candidate.is_none() || previous.is_none() || candidate != previous;
        if !takeover {
            if let Some(start) = start {
                self.set_takeover(name, start);
            }
            return false;
        }

        for record in self.pending.take_name(name) {
            tracing::trace!(
                "Activating {:?} {} on {} early at {height}",
                record.kind(),
                record.outpoint(),
                hex::encode(name)
            );
            self.insert_active(name, record.with_valid_height(height));
            undo.record_activation(name, record);
        }

        let winner = self
            .trie
            .get(name)
            .and_then(|data| data.best_claim())
            .map(|claim| claim.claim_id);

        if let Some(winner) = winner {
            tracing::trace!(
                "Takeover of {} by {winner} at {height}",
                hex::encode(name)
            );
            self.set_takeover(
                name,
                TakeoverState {
                    height,
                    claim_id: Some(winner),
                },
            );
        }

        winner.is_some()
    }

    /// Disconnects block `height`, the last applied block.
    ///
    /// The undo record comes from memory, or from the store if the block was
    /// flushed.
    pub fn decrement_block(&mut self, height: u32) -> Result<()> {
        self.ensure_last_block(height)?;
        let undo = match self.undo_log.remove(&height) {
            Some(undo) => undo,
            None => self
                .store
                .get(&store::height_key(prefix::UNDO, height))?
                .map(|bytes| BlockUndo::decode(&bytes))
                .transpose()?
                .ok_or(Error::UndoNotFound(height))?,
        };
        self.revert_block(undo)
    }

    /// Disconnects the last applied block using an externally kept undo record.
    pub fn decrement_block_with(&mut self, undo: BlockUndo) -> Result<()> {
        self.ensure_last_block(undo.height)?;
        self.undo_log.remove(&undo.height);
        self.revert_block(undo)
    }

    fn ensure_last_block(&self, height: u32) -> Result<()> {
        if height.checked_add(1) != Some(self.next_height) {
            return Err(Error::InvalidHeight(format!(
                "cannot disconnect block {height}, open height is {}",
                self.next_height
            )));
        }
        Ok(())
    }

    fn revert_block(&mut self, undo: BlockUndo) -> Result<()> {
        let height = undo.height;

        let inconsistency = |reason: String| Error::ReorgInconsistency { height, reason };

        if self.next_height == self.params.extended_expiration_fork_height {
            self.shift_expirations(false);
        }
        self.next_height = height;
        self.block_start = undo.block_start.iter().cloned().collect();

        for op in undo.ops.iter().rev() {
            match op {
                UndoOp::Activated { name, record } => {
                    let removed = self
                        .remove_active(name, record.kind(), record.outpoint())
                        .ok_or_else(|| {
                            inconsistency(format!(
                                "activated {:?} {} missing from {}",
                                record.kind(),
                                record.outpoint(),
                                hex::encode(name)
                            ))
                        })?;
                    if removed != record.with_valid_height(height) {
                        return Err(inconsistency(format!(
                            "activated {:?} {} of {} does not match the undo record",
                            record.kind(),
                            record.outpoint(),
                            hex::encode(name)
                        )));
                    }
                    self.pending.push(name, record.clone());
                }
                UndoOp::Expired {
                    name,
                    record,
                    pending,
                } => {
                    if *pending {
                        self.pending.push(name, record.clone());
                    } else {
                        self.insert_active(name, record.clone());
                    }
                    self.index_claim(name, record);
                    self.expirations
                        .insert(height, Self::expiration_entry(name, record));
                }
            }
        }

        for (name, state) in &undo.takeovers {
            match state {
                Some(state) => {
                    if !self.set_takeover(name, *state) {
                        return Err(inconsistency(format!(
                            "no claims left on {} to restore takeover height {}",
                            hex::encode(name),
                            state.height
                        )));
                    }
                }
                None => {
                    if self.node_takeover(name).is_some() {
                        return Err(inconsistency(format!(
                            "claims left on {} which had none before the block",
                            hex::encode(name)
                        )));
                    }
                }
            }
        }

        self.reverted_undo.insert(height);

        tracing::debug!(
            "Reverted claim trie block {height}: {} activations, {} expirations undone, {} names, {} claims",
            undo.activated_count(),
            undo.expired_count(),
            self.trie.name_count(),
            self.trie.claim_count(),
        );

        Ok(())
    }
}
