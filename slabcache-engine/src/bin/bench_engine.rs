//! Dependency-free benchmark driver for the cache engine: fixed PRNG
//! seed for reproducible runs, keys/values pre-built off the hot path,
//! and direct calls into `Cache` with no dynamic dispatch in the way.

use std::env;
use std::hint::black_box;
use std::time::Instant;

use slabcache_engine::cache::Cache;
use slabcache_engine::hash::hash_key;
use slabcache_common::EngineConfig;

const DEFAULT_KEY_COUNT: usize = 1 << 14;
const DEFAULT_OP_COUNT: usize = 200_000;
const DEFAULT_KEY_SIZE: usize = 16;
const DEFAULT_VALUE_SIZE: usize = 128;

struct BenchConfig {
    requested_keys: usize,
    key_count: usize,
    key_mask: usize,
    op_count: usize,
    key_size: usize,
    value_size: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let requested_keys = parse_usize(args.next(), DEFAULT_KEY_COUNT);
        let op_count = parse_usize(args.next(), DEFAULT_OP_COUNT);
        let key_size = parse_usize(args.next(), DEFAULT_KEY_SIZE);
        let value_size = parse_usize(args.next(), DEFAULT_VALUE_SIZE);

        let key_count = normalize_power_of_two(requested_keys);
        let key_mask = key_count - 1;

        BenchConfig {
            requested_keys,
            key_count,
            key_mask,
            op_count,
            key_size,
            value_size,
        }
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn normalize_power_of_two(value: usize) -> usize {
    let value = value.max(1);
    if value.is_power_of_two() {
        value
    } else {
        value.next_power_of_two()
    }
}

/// Tiny deterministic PRNG, kept dependency-free so the benchmark
/// binary doesn't pull in `rand` just to pick indices.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    #[inline]
    fn next_index(&mut self, mask: usize) -> usize {
        (self.next_u64() as usize) & mask
    }
}

fn write_u64_le(value: u64, buffer: &mut [u8]) {
    let bytes = value.to_le_bytes();
    let copy_len = buffer.len().min(bytes.len());
    buffer[..copy_len].copy_from_slice(&bytes[..copy_len]);
}

fn build_buffers(count: usize, size: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut buffers = Vec::with_capacity(count);
    for i in 0..count {
        let mut buffer = vec![0u8; size];
        write_u64_le(seed ^ (i as u64), &mut buffer);
        buffers.push(buffer);
    }
    buffers
}

fn report(label: &str, ops: usize, elapsed: std::time::Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let nanos_per_op = (secs * 1e9) / (ops as f64);
    println!("{label}: {ops} ops in {secs:.3}s ({ops_per_sec:.0} ops/s, {nanos_per_op:.1} ns/op)");
}

fn main() {
    let config = BenchConfig::from_args();

    let page_size: u32 = 1024 * 1024;
    let min_pages_for_keys = (config.key_count * (config.key_size + config.value_size + 64)) as u64 / page_size as u64 + 4;
    let memory_limit = min_pages_for_keys.next_power_of_two() * page_size as u64;

    let mut cache = Cache::new(EngineConfig {
        memory_limit,
        page_size,
        initial_dict_size: config.key_count.next_power_of_two().max(16),
        enable_evictions: true,
    })
    .expect("bench config should satisfy EngineConfig::validate");

    let keys = build_buffers(config.key_count, config.key_size, 0xA5A5_A5A5_A5A5_A5A5);
    let values = build_buffers(config.key_count, config.value_size, 0x5A5A_5A5A_5A5A_5A5A);
    let hashes: Vec<u32> = keys.iter().map(|k| hash_key(k)).collect();

    for idx in 0..config.key_count {
        cache
            .set(&keys[idx], hashes[idx], &values[idx], 0, 0)
            .expect("initial load should not fail in a sized-to-fit arena");
    }

    println!(
        "keys: requested={}, actual={}, ops={}, key_size={}, value_size={}, memory_limit={}",
        config.requested_keys, config.key_count, config.op_count, config.key_size, config.value_size, memory_limit
    );

    let mut rng = XorShift64::new(0x1234_5678_9ABC_DEF0);
    let start = Instant::now();
    for _ in 0..config.op_count {
        let idx = rng.next_index(config.key_mask);
        let value = cache.get(&keys[idx], hashes[idx]);
        black_box(value);
    }
    report("GET", config.op_count, start.elapsed());

    let mut rng = XorShift64::new(0x0FED_CBA9_8765_4321);
    let start = Instant::now();
    for _ in 0..config.op_count {
        let idx = rng.next_index(config.key_mask);
        let mut value = values[idx].clone();
        if let Some(first) = value.get_mut(0) {
            *first ^= 0xFF;
        }
        cache
            .set(&keys[idx], hashes[idx], &value, 0, 0)
            .expect("steady-state set should not fail once the arena has warmed up");
    }
    report("SET", config.op_count, start.elapsed());

    cache.publish_stats();
    let stats = cache.stats();
    println!("curr_items={} hash_capacity={}", stats.curr_items, stats.hash_capacity);
    let alloc_stats = cache.allocator_stats();
    println!("evictions={} mallocs={}", alloc_stats.num_evictions, alloc_stats.num_malloc);
}
