//! # Performance Statistics
//!
//! Process-wide counters for the engine. Everything is an atomic so that
//! concurrent requests never contend on a lock just to bump a counter.
//! Counters only reset when the engine is rebuilt.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

/// Upper bounds (exclusive, ms) of the latency buckets. The last bucket
/// collects everything slower.
pub const LATENCY_BUCKETS_MS: [u64; 5] = [10, 50, 100, 500, 1000];

const BUCKET_LABELS: [&str; 6] = ["<10ms", "<50ms", "<100ms", "<500ms", "<1s", ">=1s"];

/// Upper bounds (exclusive, µs) of the per-lookup cache latency buckets.
pub const CACHE_OP_BUCKETS_US: [u64; 5] = [1, 10, 100, 1000, 10_000];

const CACHE_OP_LABELS: [&str; 6] = ["<1us", "<10us", "<100us", "<1ms", "<10ms", ">=10ms"];

/// Cumulative engine counters.
#[derive(Debug, Default)]
pub struct PerformanceStats {
    total_queries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    slow_queries: AtomicU64,
    total_query_time_ms: AtomicU64,
    fallback_events: AtomicU64,
    cache_writes: AtomicU64,
    latency_buckets: [AtomicU64; 6],
    cache_op_buckets: [AtomicU64; 6],
}

impl PerformanceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one cache `set` and files its latency.
    pub fn record_cache_write(&self, elapsed: Duration) {
        self.cache_writes.fetch_add(1, Ordering::Relaxed);
        self.record_cache_latency(elapsed);
    }

    /// Files the latency of one cache `get` or `set`.
    pub fn record_cache_latency(&self, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        let bucket = CACHE_OP_BUCKETS_US
            .iter()
            .position(|bound| us < *bound)
            .unwrap_or(CACHE_OP_BUCKETS_US.len());
        self.cache_op_buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallback_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one completed request and returns whether it was slow.
    pub fn record_query(&self, elapsed: Duration, slow_threshold: Duration) -> bool {
        let ms = elapsed.as_millis() as u64;
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.total_query_time_ms.fetch_add(ms, Ordering::Relaxed);

        let bucket = LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| ms < *bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        let slow = elapsed >= slow_threshold;
        if slow {
            self.slow_queries.fetch_add(1, Ordering::Relaxed);
        }
        slow
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total_queries = self.total_queries.load(Ordering::Relaxed);
        let total_ms = self.total_query_time_ms.load(Ordering::Relaxed);
        let lookups = hits + misses;

        StatsSnapshot {
            total_queries,
            cache_hits: hits,
            cache_misses: misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            slow_queries: self.slow_queries.load(Ordering::Relaxed),
            total_query_time_ms: total_ms,
            avg_query_time_ms: if total_queries == 0 {
                0.0
            } else {
                total_ms as f64 / total_queries as f64
            },
            fallback_events: self.fallback_events.load(Ordering::Relaxed),
            cache_writes: self.cache_writes.load(Ordering::Relaxed),
            latency_histogram: histogram(&BUCKET_LABELS, &self.latency_buckets),
            cache_latency_histogram: histogram(&CACHE_OP_LABELS, &self.cache_op_buckets),
        }
    }
}

fn histogram(labels: &[&str; 6], buckets: &[AtomicU64; 6]) -> Vec<(String, u64)> {
    labels
        .iter()
        .zip(buckets.iter())
        .map(|(label, count)| (label.to_string(), count.load(Ordering::Relaxed)))
        .collect()
}

// =============================================================================
// Fallback Events
// =============================================================================

/// A planned optimization that could not be used. The request still
/// succeeds on a slower path; this is logged and counted, never returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackEvent {
    /// Every count estimate failed; the configured default was reported.
    CountEstimateUnavailable { table: &'static str, fallback: u64 },

    /// The cursor probe found no row at the offset; plain OFFSET was used.
    CursorProbeMiss { table: &'static str, offset: u64 },
}

impl FallbackEvent {
    /// Logs the event and bumps the fallback counter.
    pub fn report(&self, stats: &PerformanceStats) {
        stats.record_fallback();
        match self {
            FallbackEvent::CountEstimateUnavailable { table, fallback } => {
                warn!(table, fallback, "Count estimation failed, using default estimate");
            }
            FallbackEvent::CursorProbeMiss { table, offset } => {
                warn!(table, offset, "Cursor probe returned no row, falling back to OFFSET");
            }
        }
    }
}

/// Serializable copy of [`PerformanceStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// hits / (hits + misses), 0 when nothing was looked up yet.
    pub hit_rate: f64,
    pub slow_queries: u64,
    pub total_query_time_ms: u64,
    pub avg_query_time_ms: f64,
    pub fallback_events: u64,
    pub cache_writes: u64,
    /// Whole requests, in milliseconds.
    pub latency_histogram: Vec<(String, u64)>,
    /// Individual cache lookups and stores, in microseconds.
    pub cache_latency_histogram: Vec<(String, u64)>,
}

/// What `get_cache_stats` returns: counters plus cache sizes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub result_cache_size: usize,
    pub count_cache_size: usize,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "=== Harvest query engine ===")?;
        writeln!(f, "queries:        {}", s.total_queries)?;
        writeln!(f, "avg latency:    {:.2} ms", s.avg_query_time_ms)?;
        writeln!(f, "slow queries:   {}", s.slow_queries)?;
        writeln!(f, "fallbacks:      {}", s.fallback_events)?;
        writeln!(
            f,
            "cache:          {} hits / {} misses ({:.1}%)",
            s.cache_hits,
            s.cache_misses,
            s.hit_rate * 100.0
        )?;
        writeln!(
            f,
            "cache entries:  {} results, {} counts",
            self.result_cache_size, self.count_cache_size
        )?;
        write!(f, "latency:       ")?;
        for (label, count) in &s.latency_histogram {
            write!(f, " {}={}", label, count)?;
        }
        writeln!(f)?;
        write!(f, "cache ops ({} writes):", s.cache_writes)?;
        for (label, count) in &s.cache_latency_histogram {
            write!(f, " {}={}", label, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_and_slow_flag() {
        let stats = PerformanceStats::new();
        let threshold = Duration::from_millis(1000);

        assert!(!stats.record_query(Duration::from_millis(3), threshold));
        assert!(!stats.record_query(Duration::from_millis(75), threshold));
        assert!(stats.record_query(Duration::from_millis(1500), threshold));

        let snap = stats.snapshot();
        assert_eq!(snap.total_queries, 3);
        assert_eq!(snap.slow_queries, 1);
        assert_eq!(snap.total_query_time_ms, 1578);
        assert_eq!(snap.latency_histogram[0], ("<10ms".to_string(), 1));
        assert_eq!(snap.latency_histogram[2], ("<100ms".to_string(), 1));
        assert_eq!(snap.latency_histogram[5], (">=1s".to_string(), 1));
    }

    #[test]
    fn test_cache_ops_have_their_own_histogram() {
        let stats = PerformanceStats::new();
        stats.record_cache_latency(Duration::from_nanos(300));
        stats.record_cache_write(Duration::from_micros(40));
        stats.record_cache_write(Duration::from_millis(20));

        let snap = stats.snapshot();
        assert_eq!(snap.cache_writes, 2);
        assert_eq!(snap.cache_latency_histogram[0], ("<1us".to_string(), 1));
        assert_eq!(snap.cache_latency_histogram[2], ("<100us".to_string(), 1));
        assert_eq!(snap.cache_latency_histogram[5], (">=10ms".to_string(), 1));
        // Request-level counters are untouched
        assert_eq!(snap.total_queries, 0);
        assert!(snap.latency_histogram.iter().all(|(_, n)| *n == 0));
    }

    #[test]
    fn test_fallback_event_is_counted() {
        let stats = PerformanceStats::new();
        FallbackEvent::CursorProbeMiss {
            table: "u3c3",
            offset: 50_000,
        }
        .report(&stats);
        assert_eq!(stats.snapshot().fallback_events, 1);
    }

    #[test]
    fn test_hit_rate() {
        let stats = PerformanceStats::new();
        assert_eq!(stats.snapshot().hit_rate, 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.snapshot().hit_rate, 0.75);
    }
}
