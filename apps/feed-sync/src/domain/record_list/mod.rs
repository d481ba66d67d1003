//! Keyed Record List
//!
//! Ordered sequence of records plus a hash index from map key to position.
//!
//! # Invariant
//!
//! After every completed mutation, each entry's stored index equals its
//! offset in the sequence and the map index points every key at that
//! offset. [`KeyedRecordList::is_consistent`] checks this.
//!
//! Records can be locked (opened) by consumers. Removing a locked record
//! through `remove_at`, `remove_where` or `clear` is a programming fault.
//! The server owns the data, so the reconciliation path uses the `evict_*`
//! variants instead: they remove locked records too and report which keys
//! were still locked.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use serde::Serialize;

// =============================================================================
// Keyed Record
// =============================================================================

/// A record identified by a stable composite key.
pub trait KeyedRecord {
    /// Map key type.
    type Key: Clone + Eq + Hash + fmt::Debug + fmt::Display;

    /// Key of this record. Must not change for the life of the record.
    fn key(&self) -> Self::Key;
}

// =============================================================================
// List Change Notifications
// =============================================================================

/// Kind of change applied to a record list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ListChangeKind {
    /// Records inserted at `index..index + count`.
    Insert,
    /// Records removed from `index..index + count`.
    Remove,
    /// All records removed.
    Clear,
    /// Records at `index..index + count` replaced in place.
    Replace,
    /// Records added while the list is not yet usable.
    PreUsableAdd,
    /// List cleared while not yet usable.
    PreUsableClear,
    /// List became usable.
    Usable,
    /// List stopped being usable.
    Unusable,
}

/// A single list change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ListChange {
    /// Kind of change.
    pub kind: ListChangeKind,
    /// First affected index.
    pub index: usize,
    /// Number of affected records.
    pub count: usize,
}

impl ListChange {
    /// Insert notification.
    #[must_use]
    pub const fn insert(index: usize, count: usize) -> Self {
        Self {
            kind: ListChangeKind::Insert,
            index,
            count,
        }
    }

    /// Remove notification.
    #[must_use]
    pub const fn remove(index: usize, count: usize) -> Self {
        Self {
            kind: ListChangeKind::Remove,
            index,
            count,
        }
    }

    /// Clear notification.
    #[must_use]
    pub const fn clear(count: usize) -> Self {
        Self {
            kind: ListChangeKind::Clear,
            index: 0,
            count,
        }
    }

    /// Replace notification.
    #[must_use]
    pub const fn replace(index: usize, count: usize) -> Self {
        Self {
            kind: ListChangeKind::Replace,
            index,
            count,
        }
    }

    /// Usability notification (`Usable`, `Unusable`) carrying the current length.
    #[must_use]
    pub const fn usability(usable: bool, count: usize) -> Self {
        Self {
            kind: if usable {
                ListChangeKind::Usable
            } else {
                ListChangeKind::Unusable
            },
            index: 0,
            count,
        }
    }

    /// Translate into the pre-usable variant when the list is not yet usable.
    #[must_use]
    pub const fn for_usability(self, usable: bool) -> Self {
        if usable {
            return self;
        }
        let kind = match self.kind {
            ListChangeKind::Insert => ListChangeKind::PreUsableAdd,
            ListChangeKind::Clear => ListChangeKind::PreUsableClear,
            other => other,
        };
        Self { kind, ..self }
    }
}

// =============================================================================
// Keyed Record List
// =============================================================================

#[derive(Debug)]
struct Entry<R> {
    record: R,
    index: usize,
    lock_count: u32,
}

/// Indexed, map-keyed collection of records.
#[derive(Debug)]
pub struct KeyedRecordList<R: KeyedRecord> {
    entries: Vec<Entry<R>>,
    map: HashMap<R::Key, usize>,
}

impl<R: KeyedRecord> Default for KeyedRecordList<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: KeyedRecord> KeyedRecordList<R> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            map: HashMap::new(),
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&R> {
        self.entries.get(index).map(|e| &e.record)
    }

    /// Record with `key`.
    #[must_use]
    pub fn get_by_key(&self, key: &R::Key) -> Option<&R> {
        self.map.get(key).map(|&i| &self.entries[i].record)
    }

    /// Position of the record with `key`.
    #[must_use]
    pub fn index_of(&self, key: &R::Key) -> Option<usize> {
        self.map.get(key).copied()
    }

    /// Index stored on the record with `key`.
    #[must_use]
    pub fn stored_index(&self, key: &R::Key) -> Option<usize> {
        self.map.get(key).map(|&i| self.entries[i].index)
    }

    /// Whether a record with `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &R::Key) -> bool {
        self.map.contains_key(key)
    }

    /// Iterate records in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.entries.iter().map(|e| &e.record)
    }

    /// Mutable access to the record with `key`, along with its index.
    ///
    /// The caller must not change the record's key.
    pub fn get_mut_by_key(&mut self, key: &R::Key) -> Option<(usize, &mut R)> {
        let index = *self.map.get(key)?;
        Some((index, &mut self.entries[index].record))
    }

    /// Append records, returning the index of the first one.
    ///
    /// # Panics
    ///
    /// Panics if any key is already present; callers check before inserting.
    pub fn insert_range(&mut self, records: Vec<R>) -> usize {
        let start = self.entries.len();
        self.entries.reserve(records.len());

        for record in records {
            let index = self.entries.len();
            let key = record.key();
            let previous = self.map.insert(key.clone(), index);
            assert!(previous.is_none(), "record list insert of existing key {key}");
            self.entries.push(Entry {
                record,
                index,
                lock_count: 0,
            });
        }

        start
    }

    /// Replace the record at `index` in place.
    ///
    /// # Panics
    ///
    /// Panics if the replacement has a different key.
    pub fn replace_at(&mut self, index: usize, record: R) -> R {
        let entry = &mut self.entries[index];
        assert!(
            entry.record.key() == record.key(),
            "record list replace changed key {} to {}",
            entry.record.key(),
            record.key()
        );
        std::mem::replace(&mut entry.record, record)
    }

    /// Remove and return the record at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the record is locked.
    pub fn remove_at(&mut self, index: usize) -> R {
        let entry = &self.entries[index];
        assert!(
            entry.lock_count == 0,
            "record list remove of locked record {}",
            entry.record.key()
        );
        self.take_at(index).record
    }

    /// Remove and return the record at `index` whether or not it is locked.
    /// The flag tells whether it was.
    pub fn evict_at(&mut self, index: usize) -> (R, bool) {
        let entry = self.take_at(index);
        (entry.record, entry.lock_count > 0)
    }

    /// Remove every record matching `predicate`.
    ///
    /// Returns the removed contiguous runs as `(index, count)` pairs in
    /// descending index order, so that applying them one after another to
    /// the original list reproduces the removal.
    ///
    /// # Panics
    ///
    /// Panics if a matching record is locked.
    pub fn remove_where(&mut self, predicate: impl FnMut(&R) -> bool) -> Vec<(usize, usize)> {
        let runs = self.runs_where(predicate);
        if let Some(key) = self.locked_in(&runs).first() {
            panic!("record list remove of locked record {key}");
        }
        self.drain_runs(&runs);
        runs
    }

    /// Remove every record matching `predicate`, locked or not.
    ///
    /// Returns the removed runs (as [`Self::remove_where`]) and the keys
    /// that were still locked.
    pub fn evict_where(
        &mut self,
        predicate: impl FnMut(&R) -> bool,
    ) -> (Vec<(usize, usize)>, Vec<R::Key>) {
        let runs = self.runs_where(predicate);
        let locked = self.locked_in(&runs);
        self.drain_runs(&runs);
        (runs, locked)
    }

    /// Remove every record, returning how many were removed.
    ///
    /// # Panics
    ///
    /// Panics if any record is locked.
    pub fn clear(&mut self) -> usize {
        if let Some(locked) = self.entries.iter().find(|e| e.lock_count > 0) {
            panic!("record list clear with locked record {}", locked.record.key());
        }
        self.evict_all().0
    }

    /// Remove every record, locked or not. Returns how many were removed
    /// and the keys that were still locked.
    pub fn evict_all(&mut self) -> (usize, Vec<R::Key>) {
        let locked = self
            .entries
            .iter()
            .filter(|e| e.lock_count > 0)
            .map(|e| e.record.key())
            .collect();
        let count = self.entries.len();
        self.entries.clear();
        self.map.clear();
        (count, locked)
    }

    /// Lock the record with `key`. Returns `false` if not present.
    pub fn lock(&mut self, key: &R::Key) -> bool {
        match self.map.get(key) {
            Some(&index) => {
                self.entries[index].lock_count += 1;
                true
            }
            None => false,
        }
    }

    /// Release one lock on the record with `key`.
    ///
    /// # Panics
    ///
    /// Panics if the record is not locked.
    pub fn unlock(&mut self, key: &R::Key) {
        let Some(&index) = self.map.get(key) else {
            return;
        };
        let entry = &mut self.entries[index];
        assert!(entry.lock_count > 0, "record list unlock of unlocked record {key}");
        entry.lock_count -= 1;
    }

    /// Whether the record with `key` is locked.
    #[must_use]
    pub fn is_locked(&self, key: &R::Key) -> bool {
        self.map
            .get(key)
            .is_some_and(|&index| self.entries[index].lock_count > 0)
    }

    /// Check the index invariant.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.map.len() == self.entries.len()
            && self.entries.iter().enumerate().all(|(offset, entry)| {
                entry.index == offset && self.map.get(&entry.record.key()) == Some(&offset)
            })
    }

    fn take_at(&mut self, index: usize) -> Entry<R> {
        let entry = self.entries.remove(index);
        self.map.remove(&entry.record.key());
        self.reindex_from(index);
        entry
    }

    /// Contiguous runs matching `predicate`, in descending index order.
    fn runs_where(&self, mut predicate: impl FnMut(&R) -> bool) -> Vec<(usize, usize)> {
        let mut runs: Vec<(usize, usize)> = Vec::new();
        for (index, entry) in self.entries.iter().enumerate() {
            if !predicate(&entry.record) {
                continue;
            }
            match runs.last_mut() {
                Some((start, count)) if *start + *count == index => *count += 1,
                _ => runs.push((index, 1)),
            }
        }
        runs.reverse();
        runs
    }

    fn locked_in(&self, runs: &[(usize, usize)]) -> Vec<R::Key> {
        runs.iter()
            .rev()
            .flat_map(|&(start, count)| &self.entries[start..start + count])
            .filter(|e| e.lock_count > 0)
            .map(|e| e.record.key())
            .collect()
    }

    fn drain_runs(&mut self, runs: &[(usize, usize)]) {
        let Some(&(first, _)) = runs.last() else {
            return;
        };
        for &(start, count) in runs {
            for entry in self.entries.drain(start..start + count) {
                self.map.remove(&entry.record.key());
            }
        }
        self.reindex_from(first);
    }

    fn reindex_from(&mut self, start: usize) {
        for (offset, entry) in self.entries.iter_mut().enumerate().skip(start) {
            entry.index = offset;
            if let Some(slot) = self.map.get_mut(&entry.record.key()) {
                *slot = offset;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
