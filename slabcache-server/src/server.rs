//! TCP connection handling: read bytes, hand parsed commands to the
//! cache engine, write memcached ASCII replies back. Grounded on the
//! reference server's `handle_received_data` dispatch (one command in,
//! one reply out, `noreply` suppresses the reply) but built against
//! tokio instead of the reference's own reactor.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use slabcache_common::error::ProtocolError;
use slabcache_common::CacheError;
use slabcache_engine::{Cache, CasOutcome, DeleteOutcome, IncrOutcome, StoreOutcome, TouchOutcome};

use crate::metrics::Metrics;
use crate::protocol::{self, Command, StoreKind};

const READ_CHUNK: usize = 8 * 1024;

/// Drives one client connection until it disconnects or sends `quit`.
pub async fn handle_connection(mut stream: TcpStream, cache: Arc<Mutex<Cache>>, metrics: Arc<Metrics>) -> std::io::Result<()> {
    let mut buffer = BytesMut::with_capacity(READ_CHUNK);

    loop {
        loop {
            let start = Instant::now();
            match protocol::parse(&mut buffer) {
                Ok(Command::Quit) => return Ok(()),
                Ok(command) => {
                    metrics.record_request_start();
                    let reply = dispatch(&cache, command);
                    metrics.record_request_end(start.elapsed());
                    if let Some(reply) = reply {
                        stream.write_all(&reply).await?;
                    }
                }
                Err(ProtocolError::Incomplete) => break,
                Err(ProtocolError::Broken) => {
                    metrics.record_error();
                    stream.write_all(b"ERROR\r\n").await?;
                }
                Err(ProtocolError::ClientError(msg)) => {
                    metrics.record_error();
                    stream.write_all(&client_error(&msg)).await?;
                }
            }
        }

        let mut chunk = [0u8; READ_CHUNK];
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}

/// Executes one parsed command against the engine and serializes the
/// reply, or `None` when `noreply` suppresses it.
fn dispatch(cache: &Mutex<Cache>, command: Command) -> Option<Vec<u8>> {
    match command {
        Command::Get { keys, with_cas } => Some(handle_get(cache, &keys, with_cas)),
        Command::Store { kind, key, flags, exptime, value, cas_unique, noreply } => {
            let reply = handle_store(cache, kind, &key, flags, exptime, &value, cas_unique);
            suppress(reply, noreply)
        }
        Command::Delete { key, noreply } => {
            let reply = handle_delete(cache, &key);
            suppress(reply, noreply)
        }
        Command::Arithmetic { increment, key, delta, noreply } => {
            let reply = handle_arithmetic(cache, increment, &key, delta);
            suppress(reply, noreply)
        }
        Command::Touch { key, exptime, noreply } => {
            let reply = handle_touch(cache, &key, exptime);
            suppress(reply, noreply)
        }
        Command::FlushAll { noreply } => {
            cache.lock().unwrap().flush_all();
            suppress(b"OK\r\n".to_vec(), noreply)
        }
        Command::Stats => Some(handle_stats(cache)),
        Command::Version => Some(b"VERSION slabcache-0.1.0\r\n".to_vec()),
        Command::Quit => unreachable!("handled by the caller before dispatch"),
    }
}

fn suppress(reply: Vec<u8>, noreply: bool) -> Option<Vec<u8>> {
    if noreply {
        None
    } else {
        Some(reply)
    }
}

fn handle_get(cache: &Mutex<Cache>, keys: &[Vec<u8>], with_cas: bool) -> Vec<u8> {
    let mut out = Vec::new();
    let mut cache = cache.lock().unwrap();
    for key in keys {
        let hash = slabcache_engine::hash::hash_key(key);
        if let Some(item) = cache.get(key, hash) {
            out.extend_from_slice(b"VALUE ");
            out.extend_from_slice(key);
            out.extend_from_slice(format!(" {} {}", item.flags, item.value.len()).as_bytes());
            if with_cas {
                out.extend_from_slice(format!(" {}", item.cas_unique).as_bytes());
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&item.value);
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(b"END\r\n");
    out
}

fn handle_store(cache: &Mutex<Cache>, kind: StoreKind, key: &[u8], flags: u16, exptime: u32, value: &[u8], cas_unique: Option<u64>) -> Vec<u8> {
    let hash = slabcache_engine::hash::hash_key(key);
    let mut cache = cache.lock().unwrap();
    let outcome = match kind {
        StoreKind::Set => cache.set(key, hash, value, flags, exptime).map(|()| StoreOutcome::Stored),
        StoreKind::Add => cache.add(key, hash, value, flags, exptime),
        StoreKind::Replace => cache.replace(key, hash, value, flags, exptime),
        StoreKind::Append => cache.append(key, hash, value),
        StoreKind::Prepend => cache.prepend(key, hash, value),
        StoreKind::Cas => {
            return match cache.cas(key, hash, value, flags, exptime, cas_unique.unwrap_or(0)) {
                Ok(CasOutcome::Stored) => b"STORED\r\n".to_vec(),
                Ok(CasOutcome::Exists) => b"EXISTS\r\n".to_vec(),
                Ok(CasOutcome::NotFound) => b"NOT_FOUND\r\n".to_vec(),
                Err(err) => cache_error_reply(err),
            };
        }
    };
    match outcome {
        Ok(StoreOutcome::Stored) => b"STORED\r\n".to_vec(),
        Ok(StoreOutcome::NotStored) => b"NOT_STORED\r\n".to_vec(),
        Err(err) => cache_error_reply(err),
    }
}

fn handle_delete(cache: &Mutex<Cache>, key: &[u8]) -> Vec<u8> {
    let hash = slabcache_engine::hash::hash_key(key);
    match cache.lock().unwrap().delete(key, hash) {
        DeleteOutcome::Deleted => b"DELETED\r\n".to_vec(),
        DeleteOutcome::NotFound => b"NOT_FOUND\r\n".to_vec(),
    }
}

fn handle_arithmetic(cache: &Mutex<Cache>, increment: bool, key: &[u8], delta: u64) -> Vec<u8> {
    let hash = slabcache_engine::hash::hash_key(key);
    let mut cache = cache.lock().unwrap();
    let result = if increment { cache.incr(key, hash, delta) } else { cache.decr(key, hash, delta) };
    match result {
        Ok(IncrOutcome::Found(value)) => format!("{value}\r\n").into_bytes(),
        Ok(IncrOutcome::NotFound) => b"NOT_FOUND\r\n".to_vec(),
        Err(err) => cache_error_reply(err),
    }
}

fn handle_touch(cache: &Mutex<Cache>, key: &[u8], exptime: u32) -> Vec<u8> {
    let hash = slabcache_engine::hash::hash_key(key);
    match cache.lock().unwrap().touch(key, hash, exptime) {
        TouchOutcome::Touched => b"TOUCHED\r\n".to_vec(),
        TouchOutcome::NotFound => b"NOT_FOUND\r\n".to_vec(),
    }
}

fn handle_stats(cache: &Mutex<Cache>) -> Vec<u8> {
    let mut cache = cache.lock().unwrap();
    cache.publish_stats();
    let mut out = Vec::new();
    for (name, value) in cache.stats().iter() {
        out.extend_from_slice(format!("STAT {name} {value}\r\n").as_bytes());
    }
    for (name, value) in cache.allocator_stats().iter() {
        out.extend_from_slice(format!("STAT {name} {value}\r\n").as_bytes());
    }
    out.extend_from_slice(b"END\r\n");
    out
}

/// Maps an engine error onto the wire's `CLIENT_ERROR`/`SERVER_ERROR`
/// split (spec §7): [`CacheError::is_client_fault`] already knows
/// which is which, so the protocol layer doesn't re-derive it.
fn cache_error_reply(err: CacheError) -> Vec<u8> {
    if err.is_client_fault() {
        client_error(&err.to_string())
    } else {
        format!("SERVER_ERROR {err}\r\n").into_bytes()
    }
}

fn client_error(msg: &str) -> Vec<u8> {
    format!("CLIENT_ERROR {msg}\r\n").into_bytes()
}
