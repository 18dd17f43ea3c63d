//! # Server Metrics
//!
//! Lightweight counters and a latency histogram to compute QPS, error
//! rate, and tail latency for the connection-handling layer. These sit
//! outside the cache engine entirely — the engine's own [`CacheStats`]
//! and [`AllocatorStats`] cover what happened to a key; this module
//! covers how long a wire round-trip took and how many of them failed.
//!
//! [`CacheStats`]: slabcache_engine::CacheStats
//! [`AllocatorStats`]: slabcache_engine::AllocatorStats
//!
//! ## Design principles
//! 1. **Accumulator pattern**: atomic counters aggregate events cheaply.
//! 2. **Fixed buckets**: histogram buckets live in a contiguous array
//!    for cache locality; a linear scan over ~12 entries is faster than
//!    a tree for this bucket count.
//! 3. **Zero-cost access**: snapshots are plain structs, no heap work
//!    beyond the `Vec`s the snapshot itself needs to own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default latency bucket boundaries in microseconds. Coarse on
/// purpose: an in-process cache op rarely takes more than a few tens
/// of microseconds, so most samples land in the first handful of
/// buckets and the overflow bucket stays near zero in the common case.
pub const DEFAULT_LATENCY_BUCKETS_US: [u64; 12] = [1, 2, 5, 10, 20, 50, 100, 200, 500, 1_000, 2_000, 5_000];

/// Snapshot of all server metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub errors_total: u64,
    pub inflight: u64,
    pub latency: LatencySnapshot,
}

/// Snapshot of the latency histogram.
#[derive(Debug, Clone)]
pub struct LatencySnapshot {
    /// Bucket boundaries in microseconds.
    pub bounds_us: Vec<u64>,
    /// Bucket counts; `buckets.len() == bounds_us.len() + 1`, the last
    /// entry being the overflow bucket for anything past the final
    /// bound.
    pub buckets: Vec<u64>,
    pub samples: u64,
    pub sum_us: u64,
}

impl LatencySnapshot {
    /// Mean latency in microseconds, or `0.0` with no samples yet.
    pub fn mean_us(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.sum_us as f64 / self.samples as f64
        }
    }
}

/// Thread-safe metrics aggregator for the server. `AtomicU64` keeps
/// record calls allocation-free; `Ordering::Relaxed` is enough because
/// counters don't need to be observed consistently with each other,
/// only eventually.
pub struct Metrics {
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    inflight: AtomicU64,
    latency: LatencyHistogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_latency_buckets(DEFAULT_LATENCY_BUCKETS_US.to_vec())
    }

    pub fn with_latency_buckets(bounds_us: Vec<u64>) -> Self {
        Metrics {
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            inflight: AtomicU64::new(0),
            latency: LatencyHistogram::new(bounds_us),
        }
    }

    /// Call when a request is accepted, before dispatch.
    pub fn record_request_start(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    /// Call on completion, with the time spent between start and now.
    pub fn record_request_end(&self, latency: Duration) {
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        self.latency.record(latency);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
            latency: self.latency.snapshot(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-bucket latency histogram. Bucket selection is a linear scan —
/// O(buckets), but the list is short and stays hot in cache; a sorted
/// binary search would only pay off with many more buckets than a
/// server like this needs.
pub struct LatencyHistogram {
    bounds_us: Vec<u64>,
    buckets: Vec<AtomicU64>,
    sum_us: AtomicU64,
    samples: AtomicU64,
}

impl LatencyHistogram {
    pub fn new(bounds_us: Vec<u64>) -> Self {
        let buckets = (0..=bounds_us.len()).map(|_| AtomicU64::new(0)).collect();
        LatencyHistogram {
            bounds_us,
            buckets,
            sum_us: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    pub fn record(&self, latency: Duration) {
        let micros = latency.as_micros().min(u64::MAX as u128) as u64;
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(micros, Ordering::Relaxed);
        let bucket = self.bounds_us.iter().position(|&bound| micros <= bound).unwrap_or(self.bounds_us.len());
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            bounds_us: self.bounds_us.clone(),
            buckets: self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect(),
            samples: self.samples.load(Ordering::Relaxed),
            sum_us: self.sum_us.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_start_and_end_track_inflight_and_totals() {
        let metrics = Metrics::new();
        metrics.record_request_start();
        metrics.record_request_start();
        metrics.record_request_end(Duration::from_micros(3));
        let snap = metrics.snapshot();
        assert_eq!(snap.requests_total, 2);
        assert_eq!(snap.inflight, 1);
        assert_eq!(snap.latency.samples, 1);
    }

    #[test]
    fn errors_are_counted_independently_of_requests() {
        let metrics = Metrics::new();
        metrics.record_error();
        metrics.record_error();
        assert_eq!(metrics.snapshot().errors_total, 2);
    }

    #[test]
    fn latency_falls_into_expected_bucket() {
        let hist = LatencyHistogram::new(vec![10, 100]);
        hist.record(Duration::from_micros(5));
        hist.record(Duration::from_micros(50));
        hist.record(Duration::from_micros(500));
        let snap = hist.snapshot();
        assert_eq!(snap.buckets, vec![1, 1, 1]);
        assert_eq!(snap.samples, 3);
        assert_eq!(snap.sum_us, 555);
    }

    #[test]
    fn mean_us_is_zero_with_no_samples() {
        let hist = LatencyHistogram::new(vec![10]);
        assert_eq!(hist.snapshot().mean_us(), 0.0);
    }
}
