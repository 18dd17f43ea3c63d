//! End-to-end scenarios (spec §8 S1–S7), driven over a real TCP
//! socket through `slabcache-client` against a `slabcache-server`
//! instance running on a background Tokio runtime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::runtime::Runtime;

use slabcache_client::{ClientConfig, KVClient, StoreResponse};
use slabcache_common::EngineConfig;
use slabcache_engine::Cache;
use slabcache_server::Metrics;

/// Starts a server on an OS-assigned port inside a dedicated Tokio
/// runtime thread and returns the address to connect to. The runtime
/// (and therefore the server) is dropped, stopping it, when the
/// returned guard is dropped.
fn spawn_test_server(config: EngineConfig) -> (String, Runtime) {
    let rt = Runtime::new().expect("build tokio runtime");
    let cache = Arc::new(Mutex::new(Cache::new(config).expect("valid engine config")));
    let metrics = Arc::new(Metrics::new());

    let addr = rt.block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr").to_string();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                let cache = Arc::clone(&cache);
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    let _ = slabcache_server::handle_connection(stream, cache, metrics).await;
                });
            }
        });
        addr
    });

    (addr, rt)
}

fn connect(addr: &str) -> KVClient {
    KVClient::with_config(ClientConfig {
        addr: addr.to_string(),
        read_timeout: Some(Duration::from_secs(2)),
        write_timeout: Some(Duration::from_secs(2)),
    })
    .expect("connect to test server")
}

#[test]
fn s1_basic_round_trip() {
    let (addr, _rt) = spawn_test_server(EngineConfig::default());
    let mut client = connect(&addr);
    assert_eq!(client.set(b"foo", b"bar", 0, 0).unwrap(), StoreResponse::Stored);
    let got = client.get(b"foo").unwrap().unwrap();
    assert_eq!(got.value, b"bar");
}

#[test]
fn s2_add_then_add_is_not_stored() {
    let (addr, _rt) = spawn_test_server(EngineConfig::default());
    let mut client = connect(&addr);
    assert_eq!(client.add(b"k", b"A", 0, 0).unwrap(), StoreResponse::Stored);
    assert_eq!(client.add(b"k", b"B", 0, 0).unwrap(), StoreResponse::NotStored);
    assert_eq!(client.get(b"k").unwrap().unwrap().value, b"A");
}

#[test]
fn s3_cas_path() {
    let (addr, _rt) = spawn_test_server(EngineConfig::default());
    let mut client = connect(&addr);
    client.set(b"k", b"A", 0, 0).unwrap();
    let ts = client.gets(b"k").unwrap().unwrap().cas_unique.unwrap();

    assert_eq!(client.cas(b"k", b"B", 0, 0, ts).unwrap(), StoreResponse::Stored);
    assert_eq!(client.cas(b"k", b"C", 0, 0, ts).unwrap(), StoreResponse::Exists);
    assert_eq!(client.cas(b"missing", b"X", 0, 0, 999).unwrap(), StoreResponse::NotFound);
}

#[test]
fn s4_append_semantics() {
    let (addr, _rt) = spawn_test_server(EngineConfig::default());
    let mut client = connect(&addr);
    client.set(b"k", b"abc", 0, 0).unwrap();
    client.append(b"k", b"de").unwrap();
    assert_eq!(client.get(b"k").unwrap().unwrap().value, b"abcde");
}

#[test]
fn s5_ttl_expiry() {
    let (addr, _rt) = spawn_test_server(EngineConfig::default());
    let mut client = connect(&addr);
    client.set(b"t", b"X", 0, 1).unwrap();
    std::thread::sleep(Duration::from_millis(1100));
    assert!(client.get(b"t").unwrap().is_none());
}

#[test]
fn s6_saturating_incr() {
    let (addr, _rt) = spawn_test_server(EngineConfig::default());
    let mut client = connect(&addr);
    client.set(b"v", b"18446744073709551610", 0, 0).unwrap();
    assert_eq!(client.incr(b"v", 10).unwrap(), Some(u64::MAX));
    assert_eq!(client.incr(b"v", 10).unwrap(), Some(u64::MAX));
}

#[test]
fn s7_eviction_under_pressure() {
    let config = EngineConfig {
        memory_limit: 1024,
        page_size: 256,
        initial_dict_size: 16,
        enable_evictions: true,
    };
    let (addr, _rt) = spawn_test_server(config);
    let mut client = connect(&addr);
    let value = vec![b'x'; 180];
    for i in 0..100u32 {
        let key = format!("key-{i}");
        client.set(key.as_bytes(), &value, 0, 0).unwrap();
    }
    let stats = client.stats().unwrap();
    let num_evictions: u64 = stats.iter().find(|(name, _)| name == "num_evictions").unwrap().1.parse().unwrap();
    assert!(num_evictions > 0);
}

#[test]
fn delete_touch_and_quit() {
    let (addr, _rt) = spawn_test_server(EngineConfig::default());
    let mut client = connect(&addr);
    client.set(b"k", b"v", 0, 0).unwrap();
    assert!(client.touch(b"k", 100).unwrap());
    assert!(client.delete(b"k").unwrap());
    assert!(!client.delete(b"k").unwrap());
}

#[test]
fn version_reports_a_string() {
    let (addr, _rt) = spawn_test_server(EngineConfig::default());
    let mut client = connect(&addr);
    let version = client.version().unwrap();
    assert!(!version.is_empty());
}
