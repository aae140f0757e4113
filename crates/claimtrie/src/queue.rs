//! Height keyed queues of records waiting for activation or expiration.

use claimtrie_primitives::{Claim, OutPoint, Support};
use codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Kind of a staked record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Deserialize,
)]
pub enum RecordKind {
    Claim,
    Support,
}

/// A claim or a support.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Deserialize,
)]
pub enum Record {
    Claim(Claim),
    Support(Support),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Claim(_) => RecordKind::Claim,
            Self::Support(_) => RecordKind::Support,
        }
    }

    pub fn outpoint(&self) -> &OutPoint {
        match self {
            Self::Claim(claim) => &claim.outpoint,
            Self::Support(support) => &support.outpoint,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Claim(claim) => claim.height,
            Self::Support(support) => support.height,
        }
    }

    pub fn valid_height(&self) -> u32 {
        match self {
            Self::Claim(claim) => claim.valid_height,
            Self::Support(support) => support.valid_height,
        }
    }

    pub fn with_valid_height(&self, valid_height: u32) -> Self {
        match self {
            Self::Claim(claim) => Self::Claim(claim.with_valid_height(valid_height)),
            Self::Support(support) => Self::Support(support.with_valid_height(valid_height)),
        }
    }

    pub fn matches(&self, kind: RecordKind, outpoint: &OutPoint) -> bool {
        self.kind() == kind && self.outpoint() == outpoint
    }
}

/// A record waiting in the activation queue.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Deserialize,
)]
pub struct QueueEntry {
    pub name: Vec<u8>,
    pub record: Record,
}

/// A scheduled expiration.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Deserialize,
)]
pub struct ExpirationEntry {
    pub name: Vec<u8>,
    pub kind: RecordKind,
    pub outpoint: OutPoint,
}

/// Rows of items keyed by height.
///
/// Every row is kept sorted so that the content of a row does not depend on the
/// order of insertions. Heights of modified rows are collected until taken with
/// [`HeightQueue::take_dirty`].
#[derive(Debug, Clone)]
pub struct HeightQueue<T> {
    rows: BTreeMap<u32, Vec<T>>,
    dirty: BTreeSet<u32>,
}

impl<T> Default for HeightQueue<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Clone> HeightQueue<T> {
    pub fn insert(&mut self, height: u32, item: T) {
        let row = self.rows.entry(height).or_default();
        let pos = row.partition_point(|existing| existing <= &item);
        row.insert(pos, item);
        self.dirty.insert(height);
    }

    /// Removes the first item of the row at `height` satisfying `predicate`.
    pub fn remove_where(&mut self, height: u32, predicate: impl Fn(&T) -> bool) -> Option<T> {
        let row = self.rows.get_mut(&height)?;
        let pos = row.iter().position(predicate)?;
        let item = row.remove(pos);
        if row.is_empty() {
            self.rows.remove(&height);
        }
        self.dirty.insert(height);
        Some(item)
    }

    /// Removes and returns the whole row at `height`.
    pub fn take(&mut self, height: u32) -> Vec<T> {
        match self.rows.remove(&height) {
            Some(row) => {
                self.dirty.insert(height);
                row
            }
            None => Vec::new(),
        }
    }

    pub fn row(&self, height: u32) -> &[T] {
        self.rows.get(&height).map(Vec::as_slice).unwrap_or_default()
    }

    /// Installs a row read from the store without marking it dirty.
    pub fn load_row(&mut self, height: u32, mut row: Vec<T>) {
        if row.is_empty() {
            return;
        }
        row.sort();
        self.rows.insert(height, row);
    }

    /// Moves every row at or above `from` by `delta` heights, up when `forward`
    /// is set and down otherwise. Returns the number of moved items.
    pub fn shift_rows(&mut self, from: u32, delta: u32, forward: bool) -> usize {
        if delta == 0 {
            return 0;
        }
        let mut moved = 0;
        for (height, row) in self.rows.split_off(&from) {
            let target = if forward {
                height.saturating_add(delta)
            } else {
                height.saturating_sub(delta)
            };
            moved += row.len();
            let merged = self.rows.entry(target).or_default();
            merged.extend(row);
            merged.sort();
            self.dirty.insert(height);
            self.dirty.insert(target);
        }
        moved
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.rows
            .iter()
            .flat_map(|(height, row)| row.iter().map(move |item| (*height, item)))
    }

    #[cfg(test)]
    pub fn rows(&self) -> &BTreeMap<u32, Vec<T>> {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn take_dirty(&mut self) -> BTreeSet<u32> {
        std::mem::take(&mut self.dirty)
    }
}

/// Records waiting for activation, indexed by height and by name.
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    queue: HeightQueue<QueueEntry>,
    /// Number of entries per name and height.
    by_name: BTreeMap<Vec<u8>, BTreeMap<u32, usize>>,
}

impl PendingQueue {
    pub fn push(&mut self, name: &[u8], record: Record) {
        let height = record.valid_height();
        *self
            .by_name
            .entry(name.to_vec())
            .or_default()
            .entry(height)
            .or_default() += 1;
        self.queue.insert(
            height,
            QueueEntry {
                name: name.to_vec(),
                record,
            },
        );
    }

    fn unindex(&mut self, name: &[u8], height: u32) {
        let Some(heights) = self.by_name.get_mut(name) else {
            return;
        };
        if let Some(count) = heights.get_mut(&height) {
            *count -= 1;
            if *count == 0 {
                heights.remove(&height);
            }
        }
        if heights.is_empty() {
            self.by_name.remove(name);
        }
    }

    /// Heights at which `name` has pending entries.
    fn heights_of(&self, name: &[u8]) -> Vec<u32> {
        self.by_name
            .get(name)
            .map(|heights| heights.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Cancels the earliest pending entry of `name` matching `kind` and `outpoint`.
    pub fn remove(&mut self, name: &[u8], kind: RecordKind, outpoint: &OutPoint) -> Option<Record> {
        for height in self.heights_of(name) {
            let removed = self.queue.remove_where(height, |entry| {
                entry.name == name && entry.record.matches(kind, outpoint)
            });
            if let Some(entry) = removed {
                self.unindex(name, height);
                return Some(entry.record);
            }
        }
        None
    }

    /// Valid heights of every pending entry of `name` matching `kind` and `outpoint`.
    pub fn valid_heights(&self, name: &[u8], kind: RecordKind, outpoint: &OutPoint) -> Vec<u32> {
        self.entries_for(name)
            .filter(|record| record.matches(kind, outpoint))
            .map(Record::valid_height)
            .collect()
    }

    /// Pending records of `name`, earliest first.
    pub fn entries_for<'a>(&'a self, name: &'a [u8]) -> impl Iterator<Item = &'a Record> + 'a {
        self.heights_of(name).into_iter().flat_map(move |height| {
            self.queue
                .row(height)
                .iter()
                .filter(move |entry| entry.name == name)
                .map(|entry| &entry.record)
        })
    }

    /// Removes the row due at `height`.
    pub fn take_row(&mut self, height: u32) -> Vec<QueueEntry> {
        let row = self.queue.take(height);
        for entry in &row {
            self.unindex(&entry.name, height);
        }
        row
    }

    /// Removes every pending record of `name`, earliest first.
    pub fn take_name(&mut self, name: &[u8]) -> Vec<Record> {
        let mut records = Vec::new();
        for height in self.heights_of(name) {
            while let Some(entry) = self.queue.remove_where(height, |entry| entry.name == name) {
                self.unindex(name, height);
                records.push(entry.record);
            }
        }
        records
    }

    pub fn load_row(&mut self, height: u32, row: Vec<QueueEntry>) {
        for entry in &row {
            *self
                .by_name
                .entry(entry.name.clone())
                .or_default()
                .entry(height)
                .or_default() += 1;
        }
        self.queue.load_row(height, row);
    }

    pub fn row(&self, height: u32) -> &[QueueEntry] {
        self.queue.row(height)
    }

    #[cfg(test)]
    pub fn rows(&self) -> &BTreeMap<u32, Vec<QueueEntry>> {
        self.queue.rows()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &QueueEntry)> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn take_dirty(&mut self) -> BTreeSet<u32> {
        self.queue.take_dirty()
    }
}

/// Scheduled expirations keyed by expiration height.
pub type ExpirationQueue = HeightQueue<ExpirationEntry>;

#[cfg(test)]
mod tests {
    use super::*;
    use claimtrie_primitives::{ClaimId, Txid};

    fn outpoint(seed: u8) -> OutPoint {
        OutPoint::new(Txid::from_bytes([seed; 32]), 0)
    }

    fn claim(seed: u8, valid_height: u32) -> Record {
        Record::Claim(Claim::new(
            outpoint(seed),
            ClaimId::from_bytes([seed; 20]),
            10,
            1,
            valid_height,
        ))
    }

    #[test]
    fn test_rows_are_order_independent() {
        let mut a = PendingQueue::default();
        a.push(b"b", claim(2, 5));
        a.push(b"a", claim(1, 5));
        let mut b = PendingQueue::default();
        b.push(b"a", claim(1, 5));
        b.push(b"b", claim(2, 5));
        assert_eq!(a.rows(), b.rows());
    }

    #[test]
    fn test_remove_and_lookup() {
        let mut queue = PendingQueue::default();
        queue.push(b"test", claim(1, 5));
        queue.push(b"test", claim(1, 7));
        queue.push(b"test", claim(2, 7));
        queue.push(b"other", claim(1, 5));

        assert_eq!(queue.valid_heights(b"test", RecordKind::Claim, &outpoint(1)), vec![5, 7]);
        assert!(queue
            .valid_heights(b"test", RecordKind::Support, &outpoint(1))
            .is_empty());

        let removed = queue.remove(b"test", RecordKind::Claim, &outpoint(1)).unwrap();
        assert_eq!(removed.valid_height(), 5);
        assert_eq!(queue.valid_heights(b"test", RecordKind::Claim, &outpoint(1)), vec![7]);
        assert_eq!(queue.len(), 3);

        let row = queue.take_row(5);
        assert_eq!(row.len(), 1);
        assert_eq!(row[0].name, b"other".to_vec());

        let records = queue.take_name(b"test");
        assert_eq!(records.len(), 2);
        assert!(queue.is_empty());
        assert!(queue.entries_for(b"test").next().is_none());
        assert_eq!(queue.take_dirty().into_iter().collect::<Vec<_>>(), vec![5, 7]);
    }

    #[test]
    fn test_expiration_queue() {
        let mut queue = ExpirationQueue::default();
        let entry = ExpirationEntry {
            name: b"test".to_vec(),
            kind: RecordKind::Support,
            outpoint: outpoint(3),
        };
        queue.insert(100, entry.clone());
        queue.insert(100, entry.clone());
        assert_eq!(queue.row(100).len(), 2);
        assert_eq!(queue.remove_where(100, |e| e == &entry), Some(entry.clone()));
        assert_eq!(queue.take(100), vec![entry]);
        assert!(queue.row(100).is_empty());
        assert!(queue.remove_where(100, |_| true).is_none());
    }

    #[test]
    fn test_shift_rows() {
        let entry = |seed: u8| ExpirationEntry {
            name: vec![seed],
            kind: RecordKind::Claim,
            outpoint: outpoint(seed),
        };
        let mut queue = ExpirationQueue::default();
        queue.insert(5, entry(1));
        queue.insert(10, entry(2));
        queue.insert(12, entry(3));
        queue.insert(15, entry(4));
        queue.take_dirty();

        assert_eq!(queue.shift_rows(10, 5, true), 3);
        assert_eq!(queue.row(5), &[entry(1)]);
        assert!(queue.row(10).is_empty());
        assert_eq!(queue.row(15), &[entry(2)]);
        assert_eq!(queue.row(20), &[entry(4)]);
        assert_eq!(
            queue.take_dirty().into_iter().collect::<Vec<_>>(),
            vec![10, 12, 15, 17, 20]
        );

        assert_eq!(queue.shift_rows(15, 5, false), 3);
        assert_eq!(queue.row(10), &[entry(2)]);
        assert_eq!(queue.row(12), &[entry(3)]);
        assert_eq!(queue.row(15), &[entry(4)]);
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.shift_rows(0, 0, true), 0);
    }
}
