//! Wire-level benchmark: drives a running `slabcache-server` over a
//! real TCP connection through [`KVClient`], timing SET and GET
//! passes the same way `slabcache-engine`'s own `bench_engine` binary
//! times in-process calls — the difference here is everything past
//! the arena is exercised too: parsing, dispatch, and the socket
//! round-trip.

use std::env;
use std::time::Instant;

use slabcache_client::{ClientConfig, KVClient};

const DEFAULT_ADDR: &str = "127.0.0.1:11211";
const DEFAULT_KEY_COUNT: usize = 2_000;
const DEFAULT_VALUE_SIZE: usize = 128;

struct BenchConfig {
    addr: String,
    key_count: usize,
    value_size: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let addr = args.next().unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let key_count = args.next().and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_KEY_COUNT);
        let value_size = args.next().and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_VALUE_SIZE);
        BenchConfig { addr, key_count, value_size }
    }
}

fn report(label: &str, ops: usize, elapsed: std::time::Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = ops as f64 / secs;
    let micros_per_op = (secs * 1e6) / ops as f64;
    println!("{label}: {ops} ops in {secs:.3}s ({ops_per_sec:.0} ops/s, {micros_per_op:.1} us/op)");
}

fn main() {
    let config = BenchConfig::from_args();
    let mut client = KVClient::with_config(ClientConfig { addr: config.addr.clone(), ..ClientConfig::default() })
        .unwrap_or_else(|err| panic!("could not connect to {}: {err}", config.addr));

    let value = vec![b'v'; config.value_size];
    let keys: Vec<String> = (0..config.key_count).map(|i| format!("bench-key-{i}")).collect();

    println!("target={} keys={} value_size={}", config.addr, config.key_count, config.value_size);

    let start = Instant::now();
    for key in &keys {
        client.set(key.as_bytes(), &value, 0, 0).expect("set should succeed against a healthy server");
    }
    report("SET", keys.len(), start.elapsed());

    let start = Instant::now();
    let mut hits = 0usize;
    for key in &keys {
        if client.get(key.as_bytes()).expect("get should succeed against a healthy server").is_some() {
            hits += 1;
        }
    }
    report("GET", keys.len(), start.elapsed());
    println!("hits={hits}/{}", keys.len());

    if let Ok(stats) = client.stats() {
        for (name, value) in &stats {
            if name.starts_with("cmd_") || name == "curr_items" || name == "num_evictions" {
                println!("stat {name}={value}");
            }
        }
    }
}
