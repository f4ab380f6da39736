//! TTL Cache Store
//!
//! Process-wide key/value cache with a default or per-entry time-to-live.
//!
//! # Design
//!
//! - DashMap shards for non-blocking concurrent access
//! - Expiration is detected on access; there is no background sweeper
//! - Per-key hit/miss counters, reset only by [`TtlCache::clear_all`]
//!
//! Time is read from [`tokio::time::Instant`], so tests can pause and advance
//! the clock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::{DEFAULT_TTL, MAX_TTL};

// =============================================================================
// Cache Entry
// =============================================================================

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    data: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct KeyCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl KeyCounters {
    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> KeyStats {
        KeyStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Hit/miss counters of a single key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyStats {
    pub hits: u64,
    pub misses: u64,
}

/// Diagnostic view of the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Hits summed over the selected keys
    pub hits: u64,
    /// Misses summed over the selected keys
    pub misses: u64,
    /// Stored entries among the selected keys (expired-but-unread included)
    pub size: usize,
    /// Per-key breakdown
    pub keys: BTreeMap<String, KeyStats>,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// =============================================================================
// TTL Cache
// =============================================================================

/// Generic TTL cache keyed by string.
///
/// Every operation is total: nothing here can fail.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    stats: DashMap<String, KeyCounters>,
    default_ttl: Duration,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache whose entries live for `default_ttl` unless overridden.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            stats: DashMap::new(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the value if present and unexpired.
    ///
    /// An expired entry counts as a miss and is evicted.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        // The shard guard must be released before evicting.
        let lookup = self.entries.get(key).map(|entry| {
            if entry.is_expired_at(now) {
                None
            } else {
                Some(entry.data.clone())
            }
        });

        match lookup {
            Some(Some(data)) => {
                self.record(key, true);
                debug!(key, "cache hit");
                Some(data)
            }
            Some(None) => {
                // Only evict if nobody replaced it in the meantime
                self.entries
                    .remove_if(key, |_, entry| entry.is_expired_at(now));
                self.record(key, false);
                debug!(key, "cache entry expired");
                None
            }
            None => {
                self.record(key, false);
                debug!(key, "cache miss");
                None
            }
        }
    }

    /// Store `value`, replacing any existing entry (last writer wins).
    ///
    /// TTLs longer than [`MAX_TTL`] are clamped to it.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl).min(MAX_TTL);
        let key = key.into();
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "cache set");
        self.entries.insert(
            key,
            CacheEntry {
                data: value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove one entry; returns whether it existed.
    pub fn clear(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry and reset all statistics.
    pub fn clear_all(&self) {
        self.entries.clear();
        self.stats.clear();
    }

    /// Counters for one key, or for every key when `key` is `None`.
    pub fn get_stats(&self, key: Option<&str>) -> CacheStats {
        let mut stats = CacheStats::default();

        match key {
            Some(key) => {
                let key_stats = self
                    .stats
                    .get(key)
                    .map(|c| c.snapshot())
                    .unwrap_or_default();
                stats.hits = key_stats.hits;
                stats.misses = key_stats.misses;
                stats.size = usize::from(self.entries.contains_key(key));
                stats.keys.insert(key.to_string(), key_stats);
            }
            None => {
                for item in self.stats.iter() {
                    let key_stats = item.value().snapshot();
                    stats.hits += key_stats.hits;
                    stats.misses += key_stats.misses;
                    stats.keys.insert(item.key().clone(), key_stats);
                }
                stats.size = self.entries.len();
            }
        }

        stats
    }

    /// Number of stored entries (expired-but-unread included)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&self, key: &str, hit: bool) {
        if let Some(counters) = self.stats.get(key) {
            counters.record(hit);
            return;
        }
        self.stats.entry(key.to_string()).or_default().record(hit);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_default_ttl_is_45_seconds() {
        let cache: TtlCache<String> = TtlCache::default();
        assert_eq!(cache.default_ttl(), Duration::from_secs(45));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_get() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("k", "v".to_string(), None);

        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_miss_on_unknown_key() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        assert!(cache.get("nope").is_none());

        let stats = cache.get_stats(Some("nope"));
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(45));
        cache.set("k", "v", Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(cache.get("k"), Some("v"));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(cache.get("k"), None);

        // Evicted on first access past expiry
        assert_eq!(cache.len(), 0);

        let stats = cache.get_stats(Some("k"));
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_is_a_miss_exactly_at_ttl() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.set("k", 1u8, None);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cache.get("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_expiry() {
        let cache = TtlCache::new(Duration::from_secs(2));
        cache.set("k", 1, None);

        tokio::time::advance(Duration::from_millis(1500)).await;
        cache.set("k", 2, None);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_ttl_is_clamped() {
        let cache = TtlCache::new(Duration::MAX);
        cache.set("default", 1, None);
        cache.set("explicit", 2, Some(Duration::MAX));

        assert_eq!(cache.get("default"), Some(1));
        assert_eq!(cache.get("explicit"), Some(2));

        tokio::time::advance(MAX_TTL).await;
        assert!(cache.get("default").is_none());
        assert!(cache.get("explicit").is_none());
    }

    #[test]
    fn test_stats_count_hits_then_misses() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("k", 7, None);

        for _ in 0..5 {
            assert_eq!(cache.get("k"), Some(7));
        }
        assert!(cache.clear("k"));
        for _ in 0..3 {
            assert!(cache.get("k").is_none());
        }

        let stats = cache.get_stats(Some("k"));
        assert_eq!(stats.hits, 5);
        assert_eq!(stats.misses, 3);
        assert!((stats.hit_ratio() - 0.625).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clear_reports_existence() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("k", 1, None);

        assert!(cache.clear("k"));
        assert!(!cache.clear("k"));
    }

    #[test]
    fn test_clear_all_resets_stats() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.get("a");
        cache.get("missing");

        cache.clear_all();

        let stats = cache.get_stats(None);
        assert_eq!(stats, CacheStats::default());
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_get_stats_has_no_side_effects() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1, None);
        cache.get("a");

        let first = cache.get_stats(None);
        let second = cache.get_stats(None);
        assert_eq!(first, second);
        assert_eq!(first.hits, 1);
        assert_eq!(first.size, 1);
    }

    #[test]
    fn test_get_stats_aggregates_keys() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.get("a");
        cache.get("a");
        cache.get("b");
        cache.get("c");

        let stats = cache.get_stats(None);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 2);
        assert_eq!(stats.keys.len(), 3);
        assert_eq!(stats.keys["a"], KeyStats { hits: 2, misses: 0 });
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        cache.set("shared", 42u64, None);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(cache.get("shared"), Some(42));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.get_stats(Some("shared")).hits, 800);
    }

    #[test]
    fn test_stats_serialize() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("full_cache", 1, None);
        cache.get("full_cache");

        let json = serde_json::to_string(&cache.get_stats(None)).unwrap();
        assert!(json.contains("\"hits\":1"));
        assert!(json.contains("\"size\":1"));
        assert!(json.contains("\"full_cache\""));
    }
}
