//! Stats counters (component F, spec §6.4).
//!
//! Every counter is a monotonic `u64`, matching the reference
//! allocator's own stats struct field-for-field on the allocator side,
//! and the reference cache engine's per-command bookkeeping on the
//! engine side. Nothing here is ever read back by the engine itself —
//! it's a pure observability side channel, which is why it is plain
//! data with no invariants of its own.

/// Allocator-side counters (spec §6.4: "mallocs, frees, bytes requested
/// vs. served, bytes unserved, per-bucket hit counts, evictions,
/// allocation failures").
#[derive(Debug, Default, Clone, Copy)]
pub struct AllocatorStats {
    pub num_malloc: u64,
    pub num_free: u64,
    pub num_errors: u64,
    pub total_requested_mem: u64,
    pub total_served_mem: u64,
    pub total_unserved_mem: u64,
    pub num_free_table_hits: u64,
    pub num_free_table_weak_hits: u64,
    pub num_used_table_merges: u64,
    pub num_evictions: u64,
}

/// Per-command invocation/outcome counters, plus engine-wide gauges.
/// Field names intentionally mirror memcached's own `stats` output so a
/// wire-level `stats` command can emit them close to verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub cmd_get: u64,
    pub get_hits: u64,
    pub get_misses: u64,
    pub get_expired: u64,

    pub cmd_set: u64,

    pub cmd_add: u64,
    pub add_stored: u64,
    pub add_not_stored: u64,

    pub cmd_replace: u64,
    pub replace_stored: u64,
    pub replace_not_stored: u64,

    pub cmd_cas: u64,
    pub cas_stored: u64,
    pub cas_badval: u64,
    pub cas_misses: u64,

    pub cmd_append: u64,
    pub append_stored: u64,
    pub append_misses: u64,

    pub cmd_prepend: u64,
    pub prepend_stored: u64,
    pub prepend_misses: u64,

    pub cmd_delete: u64,
    pub delete_hits: u64,
    pub delete_misses: u64,

    pub cmd_touch: u64,
    pub touch_hits: u64,
    pub touch_misses: u64,

    pub cmd_incr: u64,
    pub incr_hits: u64,
    pub incr_misses: u64,

    pub cmd_decr: u64,
    pub decr_hits: u64,
    pub decr_misses: u64,

    pub cmd_flush: u64,
    pub flush_expired_removed: u64,

    /// Current number of live items (snapshotted by `publish_stats`).
    pub curr_items: u64,
    /// Current combined capacity of primary (+ secondary, while
    /// expanding) hash tables.
    pub hash_capacity: u64,
    /// Whether the hash index is mid-expansion.
    pub hash_is_expanding: bool,
}

impl CacheStats {
    /// Iterates `(name, value)` pairs in a stable order, for the `stats`
    /// wire command (`STAT <name> <value>\r\n` per entry).
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> {
        let expanding = self.hash_is_expanding as u64;
        [
            ("cmd_get", self.cmd_get),
            ("get_hits", self.get_hits),
            ("get_misses", self.get_misses),
            ("get_expired", self.get_expired),
            ("cmd_set", self.cmd_set),
            ("cmd_add", self.cmd_add),
            ("add_stored", self.add_stored),
            ("add_not_stored", self.add_not_stored),
            ("cmd_replace", self.cmd_replace),
            ("replace_stored", self.replace_stored),
            ("replace_not_stored", self.replace_not_stored),
            ("cmd_cas", self.cmd_cas),
            ("cas_stored", self.cas_stored),
            ("cas_badval", self.cas_badval),
            ("cas_misses", self.cas_misses),
            ("cmd_append", self.cmd_append),
            ("append_stored", self.append_stored),
            ("append_misses", self.append_misses),
            ("cmd_prepend", self.cmd_prepend),
            ("prepend_stored", self.prepend_stored),
            ("prepend_misses", self.prepend_misses),
            ("cmd_delete", self.cmd_delete),
            ("delete_hits", self.delete_hits),
            ("delete_misses", self.delete_misses),
            ("cmd_touch", self.cmd_touch),
            ("touch_hits", self.touch_hits),
            ("touch_misses", self.touch_misses),
            ("cmd_incr", self.cmd_incr),
            ("incr_hits", self.incr_hits),
            ("incr_misses", self.incr_misses),
            ("cmd_decr", self.cmd_decr),
            ("decr_hits", self.decr_hits),
            ("decr_misses", self.decr_misses),
            ("cmd_flush", self.cmd_flush),
            ("flush_expired_removed", self.flush_expired_removed),
            ("curr_items", self.curr_items),
            ("hash_capacity", self.hash_capacity),
            ("hash_is_expanding", expanding),
        ]
        .into_iter()
    }
}

impl AllocatorStats {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> {
        [
            ("num_malloc", self.num_malloc),
            ("num_free", self.num_free),
            ("num_errors", self.num_errors),
            ("total_requested_mem", self.total_requested_mem),
            ("total_served_mem", self.total_served_mem),
            ("total_unserved_mem", self.total_unserved_mem),
            ("num_free_table_hits", self.num_free_table_hits),
            ("num_free_table_weak_hits", self.num_free_table_weak_hits),
            ("num_used_table_merges", self.num_used_table_merges),
            ("num_evictions", self.num_evictions),
        ]
        .into_iter()
    }
}
