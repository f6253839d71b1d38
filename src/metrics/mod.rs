//! Metrics collection for the refresh pipeline
//!
//! Cache hit/miss accounting and fetch latency percentiles. Counters are kept
//! locally for summaries and also forwarded to the `metrics` facade so an
//! installed recorder can export them.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time view of cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatsSnapshot {
    pub gets: u64,
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
}

impl CacheStatsSnapshot {
    pub fn hit_ratio(&self) -> f64 {
        if self.gets == 0 {
            return 0.0;
        }
        self.hits as f64 / self.gets as f64
    }
}

/// Cache get/put counters
#[derive(Debug, Default)]
pub struct CacheStats {
    gets: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
        ::metrics::increment_counter!("chartfeed_cache_gets");
        ::metrics::increment_counter!("chartfeed_cache_hits");
    }

    pub fn record_miss(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
        ::metrics::increment_counter!("chartfeed_cache_gets");
        ::metrics::increment_counter!("chartfeed_cache_misses");
    }

    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        ::metrics::increment_counter!("chartfeed_cache_puts");
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
        }
    }
}

/// Rolling window of provider fetch latencies
pub struct FetchLatency {
    samples: Mutex<Vec<u64>>,
    max_samples: usize,
}

impl FetchLatency {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Mutex::new(Vec::with_capacity(max_samples)),
            max_samples,
        }
    }

    /// Record one fetch call's duration
    pub fn record(&self, elapsed: Duration) {
        let millis = elapsed.as_millis() as u64;

        let mut samples = self.samples.lock();
        if samples.len() >= self.max_samples && !samples.is_empty() {
            samples.remove(0);
        }
        samples.push(millis);
        drop(samples);

        ::metrics::histogram!("chartfeed_fetch_latency_ms", millis as f64);
    }

    pub fn count(&self) -> usize {
        self.samples.lock().len()
    }

    /// p50, p95 and p99 in milliseconds
    pub fn percentiles(&self) -> (u64, u64, u64) {
        let mut sorted = self.samples.lock().clone();
        if sorted.is_empty() {
            return (0, 0, 0);
        }
        sorted.sort_unstable();

        let len = sorted.len();
        let at = |pct: usize| sorted[((len * pct) / 100).min(len - 1)];
        (at(50), at(95), at(99))
    }
}

impl Default for FetchLatency {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_counts() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        stats.record_miss();
        stats.record_put();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.gets, 3);
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 2);
        assert_eq!(snapshot.puts, 1);
        assert!((snapshot.hit_ratio() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_fetch_latency_percentiles() {
        let latency = FetchLatency::new(100);
        for ms in [10, 20, 15] {
            latency.record(Duration::from_millis(ms));
        }

        let (p50, p95, p99) = latency.percentiles();
        assert_eq!(p50, 15);
        assert!(p95 >= p50);
        assert!(p99 >= p95);
    }

    #[test]
    fn test_fetch_latency_window_is_bounded() {
        let latency = FetchLatency::new(2);
        for ms in [1, 2, 3] {
            latency.record(Duration::from_millis(ms));
        }
        assert_eq!(latency.count(), 2);
        assert_eq!(latency.percentiles().0, 3);
    }

    #[test]
    fn test_empty_stats() {
        assert_eq!(CacheStats::new().snapshot().hit_ratio(), 0.0);
        assert_eq!(FetchLatency::default().percentiles(), (0, 0, 0));
    }
}
