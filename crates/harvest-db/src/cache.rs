//! # TTL Caches
//!
//! In-memory caches for page results and row counts.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  QueryEngine                                                            │
//! │    ├── result cache  TtlCache<CachedResult>   key: table+query+columns │
//! │    ├── count cache   TtlCache<CountResolution> key: table+filters      │
//! │    └── CacheSweeper  ── every cleanup_interval ──► purge_expired()     │
//! │                                                                         │
//! │  get():  present + fresh  → hit                                         │
//! │          present + stale  → evict, miss                                 │
//! │          absent           → miss                                        │
//! │          lock poisoned    → miss (logged, never an error)               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expiry uses `tokio::time::Instant` so tests can drive it with a paused
//! clock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::stats::PerformanceStats;

/// One cached value with its own expiry.
#[derive(Debug, Clone)]
pub struct CacheItem<V> {
    pub data: V,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheItem<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// A string-keyed map of values that expire individually.
///
/// Safe to share between tasks. Lookups never fail: anything that goes
/// wrong inside the cache is reported as a miss.
#[derive(Debug)]
pub struct TtlCache<V> {
    name: &'static str,
    entries: RwLock<HashMap<String, CacheItem<V>>>,
    max_entries: usize,
    stats: Arc<PerformanceStats>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: &'static str, max_entries: usize, stats: Arc<PerformanceStats>) -> Self {
        TtlCache {
            name,
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            stats,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns a fresh value, evicting it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let started = std::time::Instant::now();
        let value = self.lookup(key);
        self.stats.record_cache_latency(started.elapsed());
        value
    }

    fn lookup(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        let expired = {
            let entries = match self.entries.read() {
                Ok(entries) => entries,
                Err(_) => {
                    warn!(cache = self.name, "Cache lock poisoned, treating as miss");
                    self.stats.record_miss();
                    return None;
                }
            };
            match entries.get(key) {
                Some(item) if !item.is_expired(now) => {
                    self.stats.record_hit();
                    return Some(item.data.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            if let Ok(mut entries) = self.entries.write() {
                // Another writer may have refreshed it in between.
                if entries.get(key).is_some_and(|item| item.is_expired(now)) {
                    entries.remove(key);
                }
            }
        }

        self.stats.record_miss();
        None
    }

    /// Stores `value` for `ttl`. Over capacity, expired entries go first,
    /// then the oldest.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let started = std::time::Instant::now();
        self.store(key.into(), value, ttl);
        self.stats.record_cache_write(started.elapsed());
    }

    fn store(&self, key: String, value: V, ttl: Duration) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(_) => {
                warn!(cache = self.name, "Cache lock poisoned, dropping write");
                return;
            }
        };

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let now = Instant::now();
            entries.retain(|_, item| !item.is_expired(now));

            while entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, item)| item.created_at)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        entries.remove(&k);
                    }
                    None => break,
                }
            }
        }

        entries.insert(
            key,
            CacheItem {
                data: value,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Drops every entry.
    pub fn clear(&self) {
        match self.entries.write() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => {
                let mut entries = poisoned.into_inner();
                entries.clear();
                self.entries.clear_poison();
            }
        }
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        match self.entries.write() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, item| !item.is_expired(now));
                before - entries.len()
            }
            Err(_) => 0,
        }
    }
}

// =============================================================================
// Background Cleanup
// =============================================================================

/// Anything the sweeper can purge.
pub trait Sweep: Send + Sync {
    fn cache_name(&self) -> &'static str;
    fn sweep(&self) -> usize;
}

impl<V: Clone + Send + Sync> Sweep for TtlCache<V> {
    fn cache_name(&self) -> &'static str {
        self.name
    }

    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}

struct SweeperTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodic purge of expired cache entries.
///
/// ```text
/// start() ──► tokio::spawn ──► loop {
///                                 interval.tick()    → sweep every cache
///                                 shutdown_rx.recv() → break
///                              }
/// stop()  ──► send shutdown ──► await JoinHandle
/// ```
pub struct CacheSweeper {
    caches: Vec<Arc<dyn Sweep>>,
    interval: Duration,
    task: Mutex<Option<SweeperTask>>,
}

impl CacheSweeper {
    pub fn new(caches: Vec<Arc<dyn Sweep>>, interval: Duration) -> Self {
        CacheSweeper {
            caches,
            // tokio::time::interval panics on a zero period
            interval: interval.max(Duration::from_millis(1)),
            task: Mutex::new(None),
        }
    }

    /// Spawns the cleanup task. Returns `false` if it was already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let caches = self.caches.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            info!(interval_secs = period.as_secs(), "Cache sweeper starting");

            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        for cache in &caches {
                            let purged = cache.sweep();
                            if purged > 0 {
                                debug!(cache = cache.cache_name(), purged, "Purged expired entries");
                            }
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        info!("Cache sweeper shutting down");
                        break;
                    }
                }
            }
        });

        *task = Some(SweeperTask {
            shutdown_tx,
            handle,
        });
        true
    }

    /// Stops the cleanup task and waits for it to exit. A no-op when it is
    /// not running.
    pub async fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(SweeperTask {
            shutdown_tx,
            handle,
        }) = task
        {
            // A closed channel means the task already exited.
            let _ = shutdown_tx.send(()).await;
            if let Err(e) = handle.await {
                warn!(?e, "Cache sweeper task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|t| t.is_some())
            .unwrap_or(false)
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        let task = match self.task.get_mut() {
            Ok(task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.handle.abort();
        }
    }
}

impl std::fmt::Debug for CacheSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSweeper")
            .field("caches", &self.caches.len())
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max: usize) -> (TtlCache<String>, Arc<PerformanceStats>) {
        let stats = Arc::new(PerformanceStats::new());
        (TtlCache::new("test", max, stats.clone()), stats)
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_set_and_expiry() {
        let (cache, stats) = cache(10);
        cache.set("a", "one".to_string(), Duration::from_secs(5));

        assert_eq!(cache.get("a"), Some("one".to_string()));
        assert_eq!(cache.get("b"), None);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get("a"), None);
        // Expired entries are evicted on read
        assert_eq!(cache.len(), 0);

        let snap = stats.snapshot();
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_expired_then_oldest() {
        let (cache, _) = cache(2);
        cache.set("short", "s".to_string(), Duration::from_secs(1));
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("long", "l".to_string(), Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(2)).await;

        // "short" is expired, so it goes and "long" survives
        cache.set("new", "n".to_string(), Duration::from_secs(60));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("long").is_some());

        tokio::time::advance(Duration::from_millis(10)).await;
        // Nothing expired now: the oldest ("long") is evicted
        cache.set("newer", "x".to_string(), Duration::from_secs(60));
        assert!(cache.get("long").is_none());
        assert!(cache.get("new").is_some());
        assert!(cache.get("newer").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_and_clear() {
        let (cache, _) = cache(10);
        cache.set("a", "1".to_string(), Duration::from_secs(1));
        cache.set("b", "2".to_string(), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_poisoned_lock_degrades_to_miss() {
        let (cache, stats) = cache(10);
        let cache = Arc::new(cache);
        cache.set("a", "1".to_string(), Duration::from_secs(60));

        let poisoner = cache.clone();
        let joined = std::thread::spawn(move || {
            let _guard = poisoner.entries.write().unwrap();
            panic!("writer died holding the cache lock");
        })
        .join();
        assert!(joined.is_err());
        assert!(cache.entries.is_poisoned());

        let misses_before = stats.snapshot().cache_misses;
        assert_eq!(cache.get("a"), None);
        assert_eq!(stats.snapshot().cache_misses, misses_before + 1);

        // Writes are dropped, not propagated
        cache.set("b", "2".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.purge_expired(), 0);

        cache.clear();
        assert!(!cache.entries.is_poisoned());
        cache.set("c", "3".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("c"), Some("3".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access_keeps_counts() {
        let (cache, stats) = cache(10_000);
        let cache = Arc::new(cache);

        let mut handles = Vec::new();
        for task in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    let key = format!("k{}-{}", task, i);
                    cache.set(key.clone(), i.to_string(), Duration::from_secs(60));
                    assert_eq!(cache.get(&key), Some(i.to_string()));
                    assert_eq!(cache.get(&format!("missing{}-{}", task, i)), None);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.cache_hits, 800);
        assert_eq!(snap.cache_misses, 800);
        assert_eq!(snap.cache_writes, 800);
        let lookups: u64 = snap.cache_latency_histogram.iter().map(|(_, n)| n).sum();
        assert_eq!(lookups, 2400);
        assert_eq!(cache.len(), 800);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_start_is_idempotent_and_stops() {
        let (cache, _) = cache(10);
        let cache = Arc::new(cache);
        cache.set("a", "1".to_string(), Duration::from_secs(1));

        let sweepable: Arc<dyn Sweep> = cache.clone();
        let sweeper = CacheSweeper::new(vec![sweepable], Duration::from_secs(5));
        assert!(sweeper.start());
        assert!(!sweeper.start());
        assert!(sweeper.is_running());

        tokio::time::advance(Duration::from_secs(6)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.len(), 0);

        sweeper.stop().await;
        assert!(!sweeper.is_running());
        // Stopping twice is harmless
        sweeper.stop().await;
    }
}
