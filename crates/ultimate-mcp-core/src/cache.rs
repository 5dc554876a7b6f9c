// crates/ultimate-mcp-core/src/cache.rs
// ============================================================================
// Module: TTL + LRU Cache
// Description: Bounded key→value store with TTL expiry and LRU eviction.
// Purpose: Serve read-path caching with observable hit/miss/eviction counts.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A capacity-bounded cache with per-entry TTLs. Expiry is checked lazily on
//! access and eagerly by a periodic `sweep`. When capacity is reached the
//! least-recently-used entry is evicted; recency is a monotonic tick advanced
//! on every access, so eviction never needs wall-clock time. Counters are
//! monotonic and safe to export directly as metrics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Stats
// ============================================================================

/// Monotonic cache counters plus the current size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Lookups that returned a live entry.
    pub hits: u64,
    /// Lookups that missed or found an expired entry.
    pub misses: u64,
    /// Entries removed by capacity pressure.
    pub evictions: u64,
    /// Entries removed by TTL (lazy or sweep).
    pub expirations: u64,
    /// Live entries right now.
    pub size: usize,
    /// Configured capacity.
    pub capacity: usize,
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// One cached value with its expiry and recency.
struct Entry<V> {
    /// Stored value.
    value: V,
    /// Insertion time.
    inserted: Instant,
    /// Time-to-live from insertion.
    ttl: Duration,
    /// Recency tick of the last access.
    last_access: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted) >= self.ttl
    }
}

/// Interior state guarded by one mutex.
struct Inner<V> {
    /// Key→entry map.
    map: HashMap<String, Entry<V>>,
    /// Monotonic recency counter.
    tick: u64,
}

/// Bounded TTL + LRU cache.
pub struct TtlCache<V> {
    /// Guarded map and recency counter.
    inner: Mutex<Inner<V>>,
    /// Maximum live entries.
    capacity: usize,
    /// Default TTL when `set` is called without one.
    default_ttl: Duration,
    /// Hit counter.
    hits: AtomicU64,
    /// Miss counter.
    misses: AtomicU64,
    /// Eviction counter.
    evictions: AtomicU64,
    /// Expiration counter.
    expirations: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// Creates a cache with the given capacity and default TTL. A zero
    /// capacity is clamped to one.
    #[must_use]
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                tick: 0,
            }),
            capacity: capacity.max(1),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Looks up a key, expiring it lazily when its TTL has passed.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };
        inner.tick += 1;
        let tick = inner.tick;
        let expired = match inner.map.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            inner.map.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let entry = inner.map.get_mut(key)?;
        entry.last_access = tick;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Inserts a value with the default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Inserts a value with an explicit TTL, evicting the LRU entry when the
    /// cache is full.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.tick += 1;
        let tick = inner.tick;
        if !inner.map.contains_key(&key) && inner.map.len() >= self.capacity {
            let victim = inner
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(candidate, _)| candidate.clone());
            if let Some(victim) = victim {
                inner.map.remove(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        inner.map.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
                ttl,
                last_access: tick,
            },
        );
    }

    /// Removes a key. Returns true when it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.lock().map(|mut inner| inner.map.remove(key).is_some()).unwrap_or(false)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.map.clear();
        }
    }

    /// Removes expired entries eagerly. Returns the removed count.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let before = inner.map.len();
        inner.map.retain(|_, entry| !entry.is_expired(now));
        let removed = before - inner.map.len();
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            size: self.inner.lock().map(|inner| inner.map.len()).unwrap_or(0),
            capacity: self.capacity,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use std::time::Duration;

    use super::TtlCache;

    #[test]
    fn get_returns_inserted_value() {
        let cache: TtlCache<String> = TtlCache::new(4, Duration::from_secs(60));
        cache.set("k", "v".to_string());
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.get("absent"), None);
    }

    #[test]
    fn expired_entry_misses_and_is_removed() {
        let cache: TtlCache<u32> = TtlCache::new(4, Duration::from_secs(60));
        cache.set_with_ttl("k", 1, Duration::from_millis(0));
        assert_eq!(cache.get("k"), None);
        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache: TtlCache<u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.set("a", 1);
        cache.set("b", 2);
        // Touch "a" so "b" becomes the LRU victim.
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let cache: TtlCache<u32> = TtlCache::new(8, Duration::from_secs(60));
        cache.set_with_ttl("stale", 1, Duration::from_millis(0));
        cache.set("live", 2);
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.stats().size, 1);
    }

    #[test]
    fn counters_are_monotonic() {
        let cache: TtlCache<u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.set("a", 1);
        let _ = cache.get("a");
        let _ = cache.get("missing");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache: TtlCache<u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.set("a", 1);
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.get("a"), None);
    }
}
