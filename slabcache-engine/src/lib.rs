//! The slab-arena cache engine: component A through F of a
//! memcached-semantics key/value core. Single-threaded, synchronous,
//! and self-contained — callers own an event loop and wire protocol on
//! top of [`Cache`].

pub mod arena;
pub mod bits;
pub mod block;
pub mod cache;
pub mod dict;
pub mod freelist;
pub mod hash;
pub mod hash_table;
pub mod item;
pub mod page;
pub mod stats;

pub use cache::{Cache, CasOutcome, DeleteOutcome, GetItem, IncrOutcome, StoreOutcome, TouchOutcome};
pub use slabcache_common::config::ConfigError;
pub use slabcache_common::{CacheError, CacheResult, EngineConfig};
pub use stats::{AllocatorStats, CacheStats};
