//! Transactional overlay over the claim trie.
//!
//! ## Block lifecycle
//!
//! Claim operations of a block (add, spend, undo) are applied at the open height
//! [`ClaimTrieCache::height`]. Records that are valid at once enter the trie
//! directly, the others wait in the pending queue. [`ClaimTrieCache::increment_block`]
//! then activates the queue row of the block, expires old records, resolves
//! takeovers of every touched name and opens the next height.
//!
//! Each applied block leaves a [`BlockUndo`] in memory, which
//! [`ClaimTrieCache::decrement_block`] replays in reverse. [`ClaimTrieCache::flush`]
//! hands dirty records and undo data to the store.

mod block;
mod claims;
mod query;


pub use self::query::{ClaimEntry, ClaimsForName, FlatNode};

use crate::config::ClaimTrieConfig;
use crate::params::ClaimTrieParams;
use crate::queue::{ExpirationEntry, ExpirationQueue, PendingQueue, QueueEntry, Record, RecordKind};
use crate::store::{self, StoreMeta, TrieStore, WriteBatch, prefix};
use crate::trie::{ClaimTrie, NodeData, TakeoverState, rank_claims};
use crate::undo::BlockUndo;
use crate::{Error, Result};
use claimtrie_primitives::{ClaimId, OutPoint, Support, Uint256};
use codec::{Decode, Encode};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// In-memory overlay implementing claim operations, takeovers and reorgs.
pub struct ClaimTrieCache {
    params: ClaimTrieParams,
    store: Arc<dyn TrieStore>,
    trie: ClaimTrie,
    /// Active supports per name, ordered by outpoint.
    supports: BTreeMap<Vec<u8>, Vec<Support>>,
    pending: PendingQueue,
    expirations: ExpirationQueue,
    /// Name of every active or pending claim.
    claim_index: BTreeMap<ClaimId, Vec<u8>>,
    /// Height of the block being applied.
    next_height: u32,
    /// Takeover state as of the start of the open block, for names touched by
    /// claim operations of the block.
    block_start: BTreeMap<Vec<u8>, Option<TakeoverState>>,
    undo_log: BTreeMap<u32, BlockUndo>,
    /// Persisted undo records of disconnected blocks.
    reverted_undo: BTreeSet<u32>,
    dirty_names: BTreeSet<Vec<u8>>,
}

impl std::fmt::Debug for ClaimTrieCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimTrieCache")
            .field("next_height", &self.next_height)
            .field("names", &self.trie.name_count())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl ClaimTrieCache {
    /// Creates an empty overlay at `height` without reading the store.
    pub fn new(params: ClaimTrieParams, store: Arc<dyn TrieStore>, height: u32) -> Self {
        Self {
            params,
            store,
            trie: ClaimTrie::empty(),
            supports: BTreeMap::new(),
            pending: PendingQueue::default(),
            expirations: ExpirationQueue::default(),
            claim_index: BTreeMap::new(),
            next_height: height,
            block_start: BTreeMap::new(),
            undo_log: BTreeMap::new(),
            reverted_undo: BTreeSet::new(),
            dirty_names: BTreeSet::new(),
        }
    }

    /// Opens the overlay over `store`, loading and verifying its content.
    pub fn open(config: ClaimTrieConfig, store: Arc<dyn TrieStore>) -> Result<Self> {
        if config.wipe {
            tracing::warn!("Wiping claim trie store at {}", config.db_path().display());
            store.clear()?;
        }

        let mut cache = Self::new(config.params, store, config.height);
        let meta = cache.load()?;

        if let Some(meta) = meta {
            if meta.height != config.height {
                tracing::warn!(
                    "Claim trie was flushed at height {}, opening at height {}",
                    meta.height,
                    config.height
                );
            }
        }

        tracing::info!(
            "Opened claim trie at height {}: {} names, {} claims, {} pending, root {}, cache {} bytes",
            cache.next_height,
            cache.trie.name_count(),
            cache.trie.claim_count(),
            cache.pending.len(),
            cache.trie.root_hash(),
            config.cache_bytes,
        );

        Ok(cache)
    }

    fn load(&mut self) -> Result<Option<StoreMeta>> {
        let meta = self
            .store
            .get(&store::meta_key())?
            .map(|bytes| StoreMeta::decode(&mut bytes.as_slice()))
            .transpose()?;

        for (key, value) in self.store.scan_prefix(&[prefix::NODE])? {
            let data = NodeData::decode(&mut value.as_slice())?;
            self.trie.set(&key[1..], data);
        }

        for (key, value) in self.store.scan_prefix(&[prefix::SUPPORTS])? {
            let supports = Vec::<Support>::decode(&mut value.as_slice())?;
            if !supports.is_empty() {
                self.supports.insert(key[1..].to_vec(), supports);
            }
        }

        for (key, value) in self.store.scan_prefix(&[prefix::QUEUE])? {
            let row = Vec::<QueueEntry>::decode(&mut value.as_slice())?;
            self.pending.load_row(store::key_height(&key)?, row);
        }

        for (key, value) in self.store.scan_prefix(&[prefix::EXPIRATION])? {
            let row = Vec::<ExpirationEntry>::decode(&mut value.as_slice())?;
            self.expirations.load_row(store::key_height(&key)?, row);
        }

        self.rebuild_claim_index();

        let root = self.trie.update_hashes();
        if let Some(meta) = meta {
            if meta.root != root {
                return Err(Error::Inconsistent(format!(
                    "stored root {} does not match computed root {root}",
                    meta.root
                )));
            }
        }

        self.check_consistency()?;

        Ok(meta)
    }

    fn rebuild_claim_index(&mut self) {
        let mut index = BTreeMap::new();
        self.trie.for_each(|name, data| {
            for claim in &data.claims {
                index.insert(claim.claim_id, name.to_vec());
            }
        });
        for (_, entry) in self.pending.iter() {
            if let Record::Claim(claim) = &entry.record {
                index.insert(claim.claim_id, entry.name.clone());
            }
        }
        self.claim_index = index;
    }

    /// Verifies the structural invariants of the overlay.
    pub fn check_consistency(&self) -> Result<()> {
        let mut failure = None;
        self.trie.for_each(|name, data| {
            if failure.is_some() {
                return;
            }
            let mut ranked = data.claims.clone();
            rank_claims(&mut ranked, self.supports_of(name));
            if ranked != data.claims {
                failure = Some(format!("claims of {} are not ranked", hex::encode(name)));
            } else if let Some(claim) = data
                .claims
                .iter()
                .find(|claim| !self.claim_index.contains_key(&claim.claim_id))
            {
                failure = Some(format!(
                    "claim {} of {} is not indexed",
                    claim.claim_id,
                    hex::encode(name)
                ));
            }
        });
        if let Some(reason) = failure {
            return Err(Error::Inconsistent(reason));
        }

        if let Some((height, entry)) = self
            .pending
            .iter()
            .find(|(height, entry)| entry.record.valid_height() != *height)
        {
            return Err(Error::Inconsistent(format!(
                "pending {:?} {} of {} queued at {height}, valid at {}",
                entry.record.kind(),
                entry.record.outpoint(),
                hex::encode(&entry.name),
                entry.record.valid_height()
            )));
        }

        Ok(())
    }

    /// Writes every change since the last flush to the store in one batch.
    ///
    /// Undo data of the applied blocks moves from memory to the store, returns
    /// the root hash.
    pub fn flush(&mut self) -> Result<Uint256> {
        let root = self.trie.update_hashes();
        let mut batch = WriteBatch::default();

        for name in std::mem::take(&mut self.dirty_names) {
            let node_key = store::name_key(prefix::NODE, &name);
            match self.trie.get(&name).filter(|data| !data.claims.is_empty()) {
                Some(data) => batch.put(node_key, data.encode()),
                None => batch.delete(node_key),
            }
            let supports_key = store::name_key(prefix::SUPPORTS, &name);
            match self.supports.get(&name) {
                Some(supports) => batch.put(supports_key, supports.encode()),
                None => batch.delete(supports_key),
            }
        }

        for height in self.pending.take_dirty() {
            let key = store::height_key(prefix::QUEUE, height);
            match self.pending.row(height) {
                [] => batch.delete(key),
                row => batch.put(key, row.encode()),
            }
        }

        for height in self.expirations.take_dirty() {
            let key = store::height_key(prefix::EXPIRATION, height);
            match self.expirations.row(height) {
                [] => batch.delete(key),
                row => batch.put(key, row.encode()),
            }
        }

        for height in std::mem::take(&mut self.reverted_undo) {
            batch.delete(store::height_key(prefix::UNDO, height));
        }
        let undo_floor = self.undo_floor();
        let mut pruned = 0usize;
        for (key, _) in self.store.scan_prefix(&[prefix::UNDO])? {
            if store::key_height(&key)? < undo_floor {
                batch.delete(key);
                pruned += 1;
            }
        }
        for (height, undo) in std::mem::take(&mut self.undo_log) {
            if height >= undo_floor {
                batch.put(store::height_key(prefix::UNDO, height), undo.encode());
            }
        }

        batch.put(
            store::meta_key(),
            StoreMeta {
                height: self.next_height,
                root,
            }
            .encode(),
        );

        let writes = batch.len();
        self.store.write(batch)?;

        tracing::info!(
            "Flushed claim trie at height {}: {writes} writes, {pruned} undo records pruned, root {root}",
            self.next_height
        );

        Ok(root)
    }

    /// Height of the block being applied.
    pub fn height(&self) -> u32 {
        self.next_height
    }

    pub fn params(&self) -> &ClaimTrieParams {
        &self.params
    }

    /// Lowest block height whose undo record is kept.
    fn undo_floor(&self) -> u32 {
        self.next_height.saturating_sub(self.params.reorg_depth)
    }

    /// Undo record of an applied block still held in memory.
    pub fn block_undo(&self, height: u32) -> Option<&BlockUndo> {
        self.undo_log.get(&height)
    }

    fn supports_of(&self, name: &[u8]) -> &[Support] {
        self.supports.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Takeover state of a name holding claims.
    fn node_takeover(&self, name: &[u8]) -> Option<TakeoverState> {
        self.trie
            .get(name)
            .filter(|data| !data.claims.is_empty())
            .map(|data| data.takeover)
    }

    /// Takeover state of a name as of the start of the open block.
    fn start_takeover(&self, name: &[u8]) -> Option<TakeoverState> {
        match self.block_start.get(name) {
            Some(state) => *state,
            None => self.node_takeover(name),
        }
    }

    /// Remembers the block start state of `name` before its active records change.
    fn touch(&mut self, name: &[u8]) {
        if !self.block_start.contains_key(name) {
            let state = self.node_takeover(name);
            self.block_start.insert(name.to_vec(), state);
        }
    }

    /// Whether a record targeting `claim_id` may enter the trie at the open
    /// height, i.e. the name has no active claim or `claim_id` leads it.
    fn is_uncontested(&self, name: &[u8], claim_id: &ClaimId) -> bool {
        self.trie
            .get(name)
            .and_then(|data| data.best_claim())
            .is_none_or(|best| best.claim_id == *claim_id)
    }

    /// Takeover delay of a record targeting `claim_id` submitted at `height`.
    fn delay_for(&self, name: &[u8], claim_id: &ClaimId, height: u32) -> u32 {
        match self.start_takeover(name) {
            Some(TakeoverState {
                height: takeover_height,
                claim_id: Some(controlling),
            }) if controlling != *claim_id => {
                self.params.takeover_delay.delay(takeover_height, height)
            }
            _ => 0,
        }
    }

    fn expiration_entry(name: &[u8], record: &Record) -> ExpirationEntry {
        ExpirationEntry {
            name: name.to_vec(),
            kind: record.kind(),
            outpoint: *record.outpoint(),
        }
    }

    fn schedule_expiration(&mut self, name: &[u8], record: &Record) {
        let height = self
            .params
            .expiration_height(record.height(), self.next_height);
        self.expirations
            .insert(height, Self::expiration_entry(name, record));
    }

    fn unschedule_expiration(&mut self, name: &[u8], record: &Record) {
        let height = self
            .params
            .expiration_height(record.height(), self.next_height);
        let entry = Self::expiration_entry(name, record);
        self.expirations.remove_where(height, |item| *item == entry);
    }

    /// Extends every scheduled expiration when the open height reaches the
    /// expiration fork, or takes the extension back when it leaves it.
    fn shift_expirations(&mut self, forward: bool) {
        let fork_height = self.params.extended_expiration_fork_height;
        let extension = self.params.expiration_extension();
        let from = if forward {
            fork_height
        } else {
            fork_height.saturating_add(extension)
        };
        let moved = self.expirations.shift_rows(from, extension, forward);
        tracing::info!(
            "Expiration fork at height {fork_height} {}: {moved} expirations moved by {extension} blocks",
            if forward { "activated" } else { "reverted" },
        );
    }

    fn index_claim(&mut self, name: &[u8], record: &Record) {
        if let Record::Claim(claim) = record {
            self.claim_index.insert(claim.claim_id, name.to_vec());
        }
    }

    /// Drops the index entry of a removed claim unless another record of the
    /// same claim remains under `name`.
    fn unindex_claim(&mut self, name: &[u8], record: &Record) {
        let Record::Claim(claim) = record else {
            return;
        };
        let still_present = self
            .trie
            .get(name)
            .is_some_and(|data| data.claims.iter().any(|c| c.claim_id == claim.claim_id))
            || self.pending.entries_for(name).any(|pending| {
                matches!(pending, Record::Claim(c) if c.claim_id == claim.claim_id)
            });
        if !still_present
            && self
                .claim_index
                .get(&claim.claim_id)
                .is_some_and(|indexed| indexed == name)
        {
            self.claim_index.remove(&claim.claim_id);
        }
    }

    /// Adds a record to the trie or to the supports of a name, re-ranking the
    /// claims of the name.
    fn insert_active(&mut self, name: &[u8], record: Record) {
        match record {
            Record::Claim(claim) => {
                let mut data = match self.trie.get(name) {
                    Some(data) if !data.claims.is_empty() => data.clone(),
                    _ => NodeData {
                        claims: Vec::new(),
                        takeover: self.start_takeover(name).unwrap_or(TakeoverState {
                            height: self.next_height,
                            claim_id: None,
                        }),
                    },
                };
                data.claims.push(claim);
                rank_claims(&mut data.claims, self.supports_of(name));
                self.trie.set(name, data);
            }
            Record::Support(support) => {
                let supports = self.supports.entry(name.to_vec()).or_default();
                let pos = supports.partition_point(|existing| existing <= &support);
                supports.insert(pos, support);
                self.rerank(name);
            }
        }
        self.dirty_names.insert(name.to_vec());
    }

    /// Removes an active record matching `kind` and `outpoint`.
    fn remove_active(&mut self, name: &[u8], kind: RecordKind, outpoint: &OutPoint) -> Option<Record> {
        let removed = match kind {
            RecordKind::Claim => {
                let mut data = self.trie.get(name)?.clone();
                let pos = data.claims.iter().position(|c| c.outpoint == *outpoint)?;
                let claim = data.claims.remove(pos);
                self.trie.set(name, data);
                Record::Claim(claim)
            }
            RecordKind::Support => {
                let supports = self.supports.get_mut(name)?;
                let pos = supports.iter().position(|s| s.outpoint == *outpoint)?;
                let support = supports.remove(pos);
                if supports.is_empty() {
                    self.supports.remove(name);
                }
                self.rerank(name);
                Record::Support(support)
            }
        };
        self.dirty_names.insert(name.to_vec());
        Some(removed)
    }

    fn rerank(&mut self, name: &[u8]) {
        let Some(data) = self.trie.get(name).filter(|data| data.claims.len() > 1) else {
            return;
        };
        let mut ranked = data.clone();
        rank_claims(&mut ranked.claims, self.supports_of(name));
        if ranked.claims != data.claims {
            self.trie.set(name, ranked);
        }
    }

    fn set_takeover(&mut self, name: &[u8], state: TakeoverState) -> bool {
        let Some(data) = self.trie.get(name).filter(|data| !data.claims.is_empty()) else {
            return false;
        };
        if data.takeover != state {
            let mut data = data.clone();
            data.takeover = state;
            self.trie.set(name, data);
            self.dirty_names.insert(name.to_vec());
        }
        true
    }
}
