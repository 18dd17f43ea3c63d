//! Error taxonomy for the cache engine.
//!
//! Mirrors the categories a memcached-style core actually needs: input
//! errors the caller gets wrong, resource errors the allocator can't work
//! around, and protocol errors that belong to the wire parser rather than
//! the engine itself. Anything else is a programmer error and panics
//! instead of being represented here.

use thiserror::Error;

/// Errors the cache engine can return from its public API.
///
/// These map onto the wire protocol's `CLIENT_ERROR` / `SERVER_ERROR`
/// distinction: [`CacheError::is_client_fault`] tells a protocol layer
/// which prefix to use without re-deriving the taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key length is zero.
    #[error("key is empty")]
    KeyEmpty,

    /// Key length exceeds `Item::MAX_KEY_LENGTH` (250 bytes).
    #[error("key length exceeds maximum of {max} bytes")]
    KeyTooLong {
        /// The configured maximum key length.
        max: usize,
    },

    /// Value plus header would not fit in a single page.
    #[error("value too large for a single page (page_size={page_size}, required={required})")]
    ItemTooBig {
        /// Configured page size.
        page_size: u32,
        /// Bytes required (header + key + value).
        required: usize,
    },

    /// Allocator could not satisfy a request: either eviction is disabled
    /// and no free bucket fit, or the arena is too fragmented even with
    /// eviction allowed to satisfy a request within a single page.
    #[error("out of memory")]
    OutOfMemory,

    /// `incr`/`decr` found a value that does not parse as ASCII decimal u64.
    #[error("value is not a valid unsigned 64-bit decimal")]
    InvalidArgument,
}

impl CacheError {
    /// True when this is a fault in the caller's request (maps to
    /// `CLIENT_ERROR` at the wire layer) rather than a resource fault
    /// inside the engine (`SERVER_ERROR`).
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            CacheError::KeyEmpty
                | CacheError::KeyTooLong { .. }
                | CacheError::ItemTooBig { .. }
                | CacheError::InvalidArgument
        )
    }
}

/// Result alias used throughout the engine crate.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors produced by the ASCII wire parser, kept separate from
/// [`CacheError`] because they are about the bytes on the wire, not the
/// state of the cache. A protocol error never reaches the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not enough bytes buffered yet to parse a full request. The parser
    /// must rewind to its last savepoint and wait for more input; no
    /// reply is sent.
    #[error("incomplete request")]
    Incomplete,

    /// The command name is not recognized. The caller replies `ERROR`
    /// and keeps the connection open.
    #[error("unknown command")]
    Broken,

    /// A malformed but recognizable request (wrong argument count, stray
    /// `noreply` placement, bad CRLF terminator, non-numeric flags, ...).
    /// The caller replies `CLIENT_ERROR <msg>`.
    #[error("{0}")]
    ClientError(String),
}
