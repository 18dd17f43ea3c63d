//! # Synchronous memcached-ASCII client
//!
//! A compact, blocking client for the wire protocol in spec §6.1, used
//! by the server's integration tests and anyone driving the engine
//! from outside the process. One TCP connection per client; no
//! pooling — tests spin up a fresh server and a fresh client per case,
//! so the extra moving part would buy nothing here.

mod client;

pub use client::{ClientConfig, ClientError, ClientResult, GetResponse, KVClient, StoreResponse};
