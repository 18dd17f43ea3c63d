//! Cache engine (component E, spec §4.1).
//!
//! Composes the arena allocator, page LRU, and hash index into the
//! command semantics a memcached-compatible front end expects: lookup
//! in the index, allocate through the arena (wiring eviction straight
//! back into an index removal), keep the LRU honest on every touch.
//! This module owns all three subcomponents — nothing outside it ever
//! talks to the arena or the index directly.

use std::time::Instant;

use slabcache_common::{CacheError, CacheResult, EngineConfig};

use crate::arena::Arena;
use crate::dict::{Dict, Location};
use crate::item;
use crate::stats::{AllocatorStats, CacheStats};

/// Outcome of `add`/`replace`/`append`/`prepend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    NotStored,
}

/// Outcome of `cas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Stored,
    Exists,
    NotFound,
}

/// Outcome of `delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Outcome of `touch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    Touched,
    NotFound,
}

/// Outcome of `incr`/`decr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrOutcome {
    Found(u64),
    NotFound,
}

/// A `get` hit, copied out of the arena. Per §5's memory-ownership rule
/// ("returned pointers are valid only until the next mutating call"),
/// the engine hands back owned bytes rather than a borrow tied to
/// `&self` — the caller would otherwise be unable to issue a second
/// command without fighting the borrow checker over a connection that,
/// in practice, always copies the reply out to a socket buffer anyway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetItem {
    pub flags: u16,
    pub value: Vec<u8>,
    pub cas_unique: u64,
}

/// The single-threaded cache engine: arena + page LRU + hash index +
/// the command semantics that keep them consistent.
pub struct Cache {
    arena: Arena,
    dict: Dict,
    config: EngineConfig,
    next_timestamp: u64,
    start: Instant,
    stats: CacheStats,
}

impl Cache {
    pub fn new(config: EngineConfig) -> Result<Self, slabcache_common::config::ConfigError> {
        config.validate()?;
        Ok(Cache {
            arena: Arena::new(config.memory_limit, config.page_size),
            dict: Dict::new(config.initial_dict_size),
            config,
            next_timestamp: 1,
            start: Instant::now(),
            stats: CacheStats::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn allocator_stats(&self) -> &AllocatorStats {
        self.arena.stats()
    }

    /// Seconds elapsed since engine construction — the monotonic clock
    /// expiration ticks are measured against. Never tied to wall-clock
    /// time, so it can't be confused by a system clock adjustment.
    fn now_ticks(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    fn validate_key(&self, key: &[u8]) -> CacheResult<()> {
        if key.is_empty() {
            return Err(CacheError::KeyEmpty);
        }
        if key.len() > item::MAX_KEY_LENGTH {
            return Err(CacheError::KeyTooLong {
                max: item::MAX_KEY_LENGTH,
            });
        }
        Ok(())
    }

    /// Finds the index slot for `key`/`hash`, if any, without regard to
    /// expiration.
    fn find_slot(&self, key: &[u8], hash: u32) -> Option<(Location, u32)> {
        let arena = &self.arena;
        let loc = self.dict.find(hash, |offset| item::key(arena.payload(offset)) == key)?;
        let offset = self.dict.get(loc);
        Some((loc, offset))
    }

    /// Looks up `key`/`hash`, lazily removing and destroying the entry
    /// if it has expired. `Some` means a live entry; `None` covers both
    /// "never existed" and "existed but just expired".
    fn find_live(&mut self, key: &[u8], hash: u32) -> Option<(Location, u32)> {
        let (loc, offset) = self.find_slot(key, hash)?;
        let now = self.now_ticks();
        if item::is_expired(self.arena.payload(offset), now) {
            self.stats.get_expired += 1;
            self.remove_and_destroy(loc, offset);
            None
        } else {
            Some((loc, offset))
        }
    }

    fn remove_and_destroy(&mut self, loc: Location, offset: u32) {
        self.dict.remove(loc);
        self.arena.free(offset);
    }

    /// Allocates and writes a fresh item record, evicting pages if
    /// `may_evict` allows it. This is the single place `item_too_big`
    /// and `out_of_memory` are surfaced, shared by every store path.
    fn create_item(
        &mut self,
        key: &[u8],
        value: &[u8],
        flags: u16,
        hash: u32,
        expiration: u64,
        may_evict: bool,
    ) -> CacheResult<u32> {
        let required = item::size_required(key.len(), value.len());
        if required > self.arena.max_payload() as usize {
            return Err(CacheError::ItemTooBig {
                page_size: self.config.page_size,
                required,
            });
        }
        let timestamp = self.next_timestamp;
        self.next_timestamp += 1;

        let arena = &mut self.arena;
        let dict = &mut self.dict;
        let offset = arena.alloc_or_evict(required as u32, may_evict, &mut |_key, evicted_hash, evicted_offset| {
            if let Some(loc) = dict.find(evicted_hash, |v| v == evicted_offset) {
                dict.remove(loc);
            }
        });

        match offset {
            Some(off) => {
                let buf = arena.payload_mut(off);
                item::write_new(buf, key, value, hash, flags, timestamp, expiration);
                Ok(off)
            }
            None => Err(CacheError::OutOfMemory),
        }
    }

    // --- Public command API -------------------------------------------

    pub fn get(&mut self, key: &[u8], hash: u32) -> Option<GetItem> {
        self.stats.cmd_get += 1;
        match self.find_live(key, hash) {
            Some((_, offset)) => {
                self.arena.touch(offset);
                let buf = self.arena.payload(offset);
                self.stats.get_hits += 1;
                Some(GetItem {
                    flags: item::opaque_flags(buf),
                    value: item::value(buf).to_vec(),
                    cas_unique: item::timestamp(buf),
                })
            }
            None => {
                self.stats.get_misses += 1;
                None
            }
        }
    }

    /// Always stores, replacing any existing entry (spec §4.1 "set").
    pub fn set(&mut self, key: &[u8], hash: u32, value: &[u8], flags: u16, exptime: u32) -> CacheResult<()> {
        self.validate_key(key)?;
        self.stats.cmd_set += 1;
        let expiration = item::ttl_to_expiration(exptime, self.now_ticks());
        let may_evict = self.config.enable_evictions;

        match self.find_live(key, hash) {
            Some((loc, old_offset)) => {
                let new_offset = self.create_item(key, value, flags, hash, expiration, may_evict)?;
                self.arena.free(old_offset);
                self.dict.set_value(loc, new_offset);
            }
            None => {
                let new_offset = self.create_item(key, value, flags, hash, expiration, may_evict)?;
                self.dict.insert(hash, new_offset);
            }
        }
        Ok(())
    }

    /// Stores only if the key is absent (spec §4.1 "add").
    pub fn add(&mut self, key: &[u8], hash: u32, value: &[u8], flags: u16, exptime: u32) -> CacheResult<StoreOutcome> {
        self.validate_key(key)?;
        self.stats.cmd_add += 1;
        if self.find_live(key, hash).is_some() {
            self.stats.add_not_stored += 1;
            return Ok(StoreOutcome::NotStored);
        }
        let expiration = item::ttl_to_expiration(exptime, self.now_ticks());
        let new_offset = self.create_item(key, value, flags, hash, expiration, self.config.enable_evictions)?;
        self.dict.insert(hash, new_offset);
        self.stats.add_stored += 1;
        Ok(StoreOutcome::Stored)
    }

    /// Stores only if the key is present (spec §4.1 "replace").
    pub fn replace(&mut self, key: &[u8], hash: u32, value: &[u8], flags: u16, exptime: u32) -> CacheResult<StoreOutcome> {
        self.validate_key(key)?;
        self.stats.cmd_replace += 1;
        let Some((loc, old_offset)) = self.find_live(key, hash) else {
            self.stats.replace_not_stored += 1;
            return Ok(StoreOutcome::NotStored);
        };
        let expiration = item::ttl_to_expiration(exptime, self.now_ticks());
        let new_offset = self.create_item(key, value, flags, hash, expiration, self.config.enable_evictions)?;
        self.arena.free(old_offset);
        self.dict.set_value(loc, new_offset);
        self.stats.replace_stored += 1;
        Ok(StoreOutcome::Stored)
    }

    /// Stores only if present and the caller's `cas_unique` still
    /// matches the item's creation timestamp (spec §4.1 "cas").
    pub fn cas(
        &mut self,
        key: &[u8],
        hash: u32,
        value: &[u8],
        flags: u16,
        exptime: u32,
        cas_unique: u64,
    ) -> CacheResult<CasOutcome> {
        self.validate_key(key)?;
        self.stats.cmd_cas += 1;
        let Some((loc, old_offset)) = self.find_live(key, hash) else {
            self.stats.cas_misses += 1;
            return Ok(CasOutcome::NotFound);
        };
        if item::timestamp(self.arena.payload(old_offset)) != cas_unique {
            self.stats.cas_badval += 1;
            return Ok(CasOutcome::Exists);
        }
        let expiration = item::ttl_to_expiration(exptime, self.now_ticks());
        let new_offset = self.create_item(key, value, flags, hash, expiration, self.config.enable_evictions)?;
        self.arena.free(old_offset);
        self.dict.set_value(loc, new_offset);
        self.stats.cas_stored += 1;
        Ok(CasOutcome::Stored)
    }

    /// Concatenates `old_value ++ value` into a fresh item (spec §4.1
    /// "append"). Never evicts: evicting could destroy either operand
    /// mid-composition.
    pub fn append(&mut self, key: &[u8], hash: u32, value: &[u8]) -> CacheResult<StoreOutcome> {
        self.validate_key(key)?;
        self.stats.cmd_append += 1;
        self.extend(key, hash, value, false)
    }

    /// Concatenates `value ++ old_value` into a fresh item (spec §4.1
    /// "prepend").
    pub fn prepend(&mut self, key: &[u8], hash: u32, value: &[u8]) -> CacheResult<StoreOutcome> {
        self.validate_key(key)?;
        self.stats.cmd_prepend += 1;
        self.extend(key, hash, value, true)
    }

    fn extend(&mut self, key: &[u8], hash: u32, value: &[u8], prepend: bool) -> CacheResult<StoreOutcome> {
        let Some((loc, old_offset)) = self.find_live(key, hash) else {
            if prepend {
                self.stats.prepend_misses += 1;
            } else {
                self.stats.append_misses += 1;
            }
            return Ok(StoreOutcome::NotStored);
        };

        let buf = self.arena.payload(old_offset);
        let old_value = item::value(buf).to_vec();
        let flags = item::opaque_flags(buf);
        let expiration = item::expiration(buf);

        let mut combined = Vec::with_capacity(old_value.len() + value.len());
        if prepend {
            combined.extend_from_slice(value);
            combined.extend_from_slice(&old_value);
        } else {
            combined.extend_from_slice(&old_value);
            combined.extend_from_slice(value);
        }

        match self.create_item(key, &combined, flags, hash, expiration, false) {
            Ok(new_offset) => {
                self.arena.free(old_offset);
                self.dict.set_value(loc, new_offset);
                if prepend {
                    self.stats.prepend_stored += 1;
                } else {
                    self.stats.append_stored += 1;
                }
                Ok(StoreOutcome::Stored)
            }
            Err(e) => Err(e),
        }
    }

    pub fn delete(&mut self, key: &[u8], hash: u32) -> DeleteOutcome {
        self.stats.cmd_delete += 1;
        match self.find_live(key, hash) {
            Some((loc, offset)) => {
                self.remove_and_destroy(loc, offset);
                self.stats.delete_hits += 1;
                DeleteOutcome::Deleted
            }
            None => {
                self.stats.delete_misses += 1;
                DeleteOutcome::NotFound
            }
        }
    }

    /// Updates TTL and LRU recency without copying the value (spec
    /// §4.1 "touch").
    pub fn touch(&mut self, key: &[u8], hash: u32, exptime: u32) -> TouchOutcome {
        self.stats.cmd_touch += 1;
        let now = self.now_ticks();
        match self.find_live(key, hash) {
            Some((_, offset)) => {
                let new_expiration = item::ttl_to_expiration(exptime, now);
                item::set_expiration(self.arena.payload_mut(offset), new_expiration);
                self.arena.touch(offset);
                self.stats.touch_hits += 1;
                TouchOutcome::Touched
            }
            None => {
                self.stats.touch_misses += 1;
                TouchOutcome::NotFound
            }
        }
    }

    pub fn incr(&mut self, key: &[u8], hash: u32, delta: u64) -> CacheResult<IncrOutcome> {
        self.arithmetic(key, hash, delta, true)
    }

    pub fn decr(&mut self, key: &[u8], hash: u32, delta: u64) -> CacheResult<IncrOutcome> {
        self.arithmetic(key, hash, delta, false)
    }

    fn arithmetic(&mut self, key: &[u8], hash: u32, delta: u64, increment: bool) -> CacheResult<IncrOutcome> {
        if increment {
            self.stats.cmd_incr += 1;
        } else {
            self.stats.cmd_decr += 1;
        }
        let Some((loc, offset)) = self.find_live(key, hash) else {
            if increment {
                self.stats.incr_misses += 1;
            } else {
                self.stats.decr_misses += 1;
            }
            return Ok(IncrOutcome::NotFound);
        };

        let buf = self.arena.payload(offset);
        let text = std::str::from_utf8(item::value(buf)).map_err(|_| CacheError::InvalidArgument)?;
        let current: u64 = text.parse().map_err(|_| CacheError::InvalidArgument)?;
        let new_value = if increment {
            current.saturating_add(delta)
        } else {
            current.saturating_sub(delta)
        };
        let flags = item::opaque_flags(buf);
        let expiration = item::expiration(buf);
        let digits = new_value.to_string();

        let new_offset = self.create_item(key, digits.as_bytes(), flags, hash, expiration, self.config.enable_evictions)?;
        self.arena.free(offset);
        self.dict.set_value(loc, new_offset);
        if increment {
            self.stats.incr_hits += 1;
        } else {
            self.stats.decr_hits += 1;
        }
        Ok(IncrOutcome::Found(new_value))
    }

    /// Removes every entry whose expiration is already in the past
    /// (spec §4.5, §9 "only immediate-purge of expired entries is
    /// required").
    pub fn flush_all(&mut self) {
        self.stats.cmd_flush += 1;
        let now = self.now_ticks();
        let arena = &self.arena;
        let mut expired_offsets = Vec::new();
        self.dict.remove_if(|offset| {
            let expired = item::is_expired(arena.payload(offset), now);
            if expired {
                expired_offsets.push(offset);
            }
            expired
        });
        self.stats.flush_expired_removed += expired_offsets.len() as u64;
        for offset in expired_offsets {
            self.arena.free(offset);
        }
    }

    /// Snapshots engine-wide gauges into the stats counters and returns
    /// them (spec §4.1 "publish_stats").
    pub fn publish_stats(&mut self) -> &CacheStats {
        self.stats.curr_items = self.dict.size() as u64;
        self.stats.hash_capacity = self.dict.capacity() as u64;
        self.stats.hash_is_expanding = self.dict.is_expanding();
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_key;

    fn small_cache() -> Cache {
        Cache::new(EngineConfig {
            memory_limit: 4 * 4096,
            page_size: 4096,
            initial_dict_size: 16,
            enable_evictions: true,
        })
        .unwrap()
    }

    #[test]
    fn basic_round_trip() {
        let mut cache = small_cache();
        cache.set(b"foo", hash_key(b"foo"), b"bar", 0, 0).unwrap();
        let got = cache.get(b"foo", hash_key(b"foo")).unwrap();
        assert_eq!(got.value, b"bar");
    }

    #[test]
    fn add_then_add_is_not_stored() {
        let mut cache = small_cache();
        let h = hash_key(b"k");
        assert_eq!(cache.add(b"k", h, b"A", 0, 0).unwrap(), StoreOutcome::Stored);
        assert_eq!(cache.add(b"k", h, b"B", 0, 0).unwrap(), StoreOutcome::NotStored);
        assert_eq!(cache.get(b"k", h).unwrap().value, b"A");
    }

    #[test]
    fn cas_path() {
        let mut cache = small_cache();
        let h = hash_key(b"k");
        cache.set(b"k", h, b"A", 0, 0).unwrap();
        let ts = cache.get(b"k", h).unwrap().cas_unique;

        assert_eq!(cache.cas(b"k", h, b"B", 0, 0, ts).unwrap(), CasOutcome::Stored);
        assert_eq!(cache.cas(b"k", h, b"C", 0, 0, ts).unwrap(), CasOutcome::Exists);
        assert_eq!(
            cache.cas(b"missing", hash_key(b"missing"), b"X", 0, 0, 999).unwrap(),
            CasOutcome::NotFound
        );
        assert_eq!(cache.get(b"k", h).unwrap().value, b"B");
    }

    #[test]
    fn append_semantics() {
        let mut cache = small_cache();
        let h = hash_key(b"k");
        cache.set(b"k", h, b"abc", 0, 0).unwrap();
        assert_eq!(cache.append(b"k", h, b"de").unwrap(), StoreOutcome::Stored);
        assert_eq!(cache.get(b"k", h).unwrap().value, b"abcde");
    }

    #[test]
    fn prepend_semantics() {
        let mut cache = small_cache();
        let h = hash_key(b"k");
        cache.set(b"k", h, b"cde", 0, 0).unwrap();
        assert_eq!(cache.prepend(b"k", h, b"ab").unwrap(), StoreOutcome::Stored);
        assert_eq!(cache.get(b"k", h).unwrap().value, b"abcde");
    }

    #[test]
    fn ttl_expiry() {
        let mut cache = small_cache();
        let h = hash_key(b"t");
        cache.set(b"t", h, b"X", 0, 0).unwrap();
        // Force expiration in the past without sleeping: exptime=0 means
        // never-expires, so touch the item's expiration directly via a
        // second store with an expiration we then rewind past.
        let offset = cache.find_slot(b"t", h).unwrap().1;
        item::set_expiration(cache.arena.payload_mut(offset), 0);
        assert!(cache.get(b"t", h).is_none());
        assert_eq!(cache.stats.get_expired, 1);
    }

    #[test]
    fn saturating_incr() {
        let mut cache = small_cache();
        let h = hash_key(b"v");
        cache.set(b"v", h, b"18446744073709551610", 0, 0).unwrap();
        assert_eq!(cache.incr(b"v", h, 10).unwrap(), IncrOutcome::Found(u64::MAX));
        assert_eq!(cache.incr(b"v", h, 10).unwrap(), IncrOutcome::Found(u64::MAX));
    }

    #[test]
    fn saturating_decr_floors_at_zero() {
        let mut cache = small_cache();
        let h = hash_key(b"v");
        cache.set(b"v", h, b"5", 0, 0).unwrap();
        assert_eq!(cache.decr(b"v", h, 10).unwrap(), IncrOutcome::Found(0));
    }

    #[test]
    fn delete_and_touch() {
        let mut cache = small_cache();
        let h = hash_key(b"k");
        cache.set(b"k", h, b"v", 0, 0).unwrap();
        assert_eq!(cache.touch(b"k", h, 100), TouchOutcome::Touched);
        assert_eq!(cache.delete(b"k", h), DeleteOutcome::Deleted);
        assert_eq!(cache.delete(b"k", h), DeleteOutcome::NotFound);
        assert_eq!(cache.touch(b"k", h, 100), TouchOutcome::NotFound);
    }

    #[test]
    fn eviction_reclaims_space_under_pressure() {
        // Small arena, deliberately tight: four 256-byte pages, items
        // ~180 bytes so each page holds only a couple before needing to
        // evict.
        let mut cache = Cache::new(EngineConfig {
            memory_limit: 1024,
            page_size: 256,
            initial_dict_size: 16,
            enable_evictions: true,
        })
        .unwrap();
        let value = vec![b'x'; 150];
        for i in 0..100u32 {
            let key = format!("key-{i}");
            let h = hash_key(key.as_bytes());
            cache.set(key.as_bytes(), h, &value, 0, 0).unwrap();
        }
        cache.publish_stats();
        // Far fewer than 100 items should survive in a 1 KiB arena.
        assert!(cache.stats().curr_items < 100);
        assert!(cache.allocator_stats().num_evictions > 0);
    }

    #[test]
    fn out_of_memory_when_evictions_disabled() {
        let mut cache = Cache::new(EngineConfig {
            memory_limit: 1024,
            page_size: 256,
            initial_dict_size: 16,
            enable_evictions: false,
        })
        .unwrap();
        let value = vec![b'x'; 150];
        let mut saw_oom = false;
        for i in 0..20u32 {
            let key = format!("key-{i}");
            let h = hash_key(key.as_bytes());
            if cache.set(key.as_bytes(), h, &value, 0, 0).is_err() {
                saw_oom = true;
                break;
            }
        }
        assert!(saw_oom);
    }

    #[test]
    fn item_too_big_is_rejected() {
        let mut cache = small_cache();
        let value = vec![0u8; 5000];
        let h = hash_key(b"k");
        let err = cache.set(b"k", h, &value, 0, 0).unwrap_err();
        assert!(matches!(err, CacheError::ItemTooBig { .. }));
    }

    #[test]
    fn key_validation() {
        let mut cache = small_cache();
        assert_eq!(cache.set(b"", 1, b"v", 0, 0).unwrap_err(), CacheError::KeyEmpty);
        let long_key = vec![b'k'; 300];
        assert!(matches!(
            cache.set(&long_key, hash_key(&long_key), b"v", 0, 0).unwrap_err(),
            CacheError::KeyTooLong { .. }
        ));
    }
}
