//! # slabcache-common
//!
//! Shared error taxonomy and configuration types used by the engine, the
//! wire-protocol server, and the benchmark/client binaries. Nothing in this
//! crate touches the arena or the hash index directly; it exists so those
//! crates agree on one vocabulary for failures and settings.

pub mod config;
pub mod error;

pub use config::EngineConfig;
pub use error::{CacheError, CacheResult, ProtocolError};
