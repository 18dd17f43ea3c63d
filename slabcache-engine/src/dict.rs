//! Incrementally-resizing hash index (component D, spec §5.2).
//!
//! Wraps two [`HashTable`]s — primary and, while expanding, secondary —
//! so that growing the index never pays for rehashing everything in one
//! stall. Once the primary crosses its load-factor threshold, it
//! becomes the secondary, a fresh double-capacity primary is allocated,
//! and every subsequent mutating call migrates a bounded batch of
//! entries from secondary to primary until the secondary is empty and
//! dropped.

use crate::bits::{log2u, pow2, roundup_pow2};
use crate::hash_table::HashTable;

/// Number of entries migrated from the secondary table per call while
/// expanding (spec §5.2: "fixed batch (e.g., 512)").
const REHASH_BATCH_SIZE: usize = 512;

/// Result of a lookup: which table the entry was found in (or would be
/// inserted into) and its position there, so the caller can do a
/// matching `insert`/`remove` without searching twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Primary(usize),
    Secondary(usize),
}

pub struct Dict {
    primary: HashTable,
    secondary: Option<HashTable>,
    hashpower: u32,
    expand_pos: usize,
}

impl Dict {
    pub fn new(initial_size: usize) -> Self {
        let capacity = roundup_pow2(initial_size.max(1) as u64) as usize;
        Dict {
            primary: HashTable::new(capacity),
            secondary: None,
            hashpower: log2u(capacity as u64),
            expand_pos: 0,
        }
    }

    pub fn is_expanding(&self) -> bool {
        self.secondary.is_some()
    }

    /// Combined capacity across both tables (spec's `hash_capacity`
    /// stat covers both while mid-expansion).
    pub fn capacity(&self) -> usize {
        self.primary.capacity() + self.secondary.as_ref().map_or(0, |s| s.capacity())
    }

    pub fn size(&self) -> usize {
        self.primary.size() + self.secondary.as_ref().map_or(0, |s| s.size())
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Looks up `hash` (disambiguated by `key_eq`), checking the
    /// secondary table first while expanding since more-recently-touched
    /// entries tend to live there.
    pub fn find(&self, hash: u32, mut key_eq: impl FnMut(u32) -> bool) -> Option<Location> {
        if let Some(secondary) = &self.secondary {
            let (found, pos) = secondary.entry_for(hash, &mut key_eq);
            if found {
                return Some(Location::Secondary(pos));
            }
        }
        let (found, pos) = self.primary.entry_for(hash, &mut key_eq);
        found.then_some(Location::Primary(pos))
    }

    pub fn get(&self, loc: Location) -> u32 {
        match loc {
            Location::Primary(pos) => self.primary.value_at(pos),
            Location::Secondary(pos) => self.secondary.as_ref().unwrap().value_at(pos),
        }
    }

    /// In-place slot overwrite for a store operation that replaces an
    /// existing item without changing its key (and so its hash and
    /// table position).
    pub fn set_value(&mut self, loc: Location, value: u32) {
        match loc {
            Location::Primary(pos) => self.primary.set_value(pos, value),
            Location::Secondary(pos) => self.secondary.as_mut().unwrap().set_value(pos, value),
        }
    }

    pub fn contains(&self, hash: u32, key_eq: impl FnMut(u32) -> bool) -> bool {
        self.find(hash, key_eq).is_some()
    }

    /// Inserts a brand-new `(hash, value)` pair, expanding the primary
    /// table first if it has reached its load-factor threshold and no
    /// expansion is already underway. Always inserts into the primary
    /// table — the secondary only ever shrinks.
    pub fn insert(&mut self, hash: u32, value: u32) {
        debug_assert!(self.find(hash, |v| v == value).is_none());
        if !self.is_expanding() && self.primary.threshold_reached() {
            self.begin_expand();
        }
        let (found, pos) = self.primary.entry_for(hash, |_| false);
        debug_assert!(!found);
        self.primary.insert(pos, hash, value);
        if self.is_expanding() {
            self.rehash_some();
        }
    }

    /// Removes the entry at `loc` (as returned by [`Self::find`]) and
    /// advances any in-progress expansion by one batch.
    pub fn remove(&mut self, loc: Location) {
        match loc {
            Location::Primary(pos) => self.primary.remove(pos),
            Location::Secondary(pos) => self.secondary.as_mut().unwrap().remove(pos),
        }
        if self.is_expanding() {
            self.rehash_some();
        }
    }

    /// Removes every entry (in either table) for which `predicate`
    /// holds, used by `flush_all`.
    pub fn remove_if(&mut self, mut predicate: impl FnMut(u32) -> bool) {
        if let Some(secondary) = &mut self.secondary {
            secondary.remove_if(&mut predicate);
        }
        self.primary.remove_if(&mut predicate);
    }

    pub fn clear(&mut self) {
        self.secondary = None;
        self.expand_pos = 0;
        self.primary.clear();
    }

    fn begin_expand(&mut self) {
        debug_assert!(!self.is_expanding());
        self.expand_pos = 0;
        let new_primary = HashTable::new(pow2(self.hashpower + 1) as usize);
        let old_primary = std::mem::replace(&mut self.primary, new_primary);
        self.secondary = Some(old_primary);
        self.hashpower += 1;
        self.rehash_some();
    }

    fn end_expand(&mut self) {
        debug_assert!(self.secondary.as_ref().is_some_and(|s| s.is_empty()));
        self.secondary = None;
        self.expand_pos = 0;
    }

    /// Moves up to [`REHASH_BATCH_SIZE`] entries from the secondary
    /// table into the primary. Entries move by hash alone — no key
    /// comparison needed, since every secondary entry is by definition
    /// not yet present in the primary.
    fn rehash_some(&mut self) {
        let Some(secondary) = &mut self.secondary else { return };
        let batch = REHASH_BATCH_SIZE.min(secondary.size());
        let mut moved = 0;
        while moved < batch {
            while secondary.empty_at(self.expand_pos) {
                self.expand_pos += 1;
            }
            let hash = secondary.hash_at(self.expand_pos);
            let value = secondary.value_at(self.expand_pos);
            let (found, pos) = self.primary.entry_for(hash, |_| false);
            debug_assert!(!found);
            self.primary.insert(pos, hash, value);
            secondary.remove(self.expand_pos);
            moved += 1;
        }
        if secondary.is_empty() {
            self.end_expand();
        }
    }
}
