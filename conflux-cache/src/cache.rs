//! Concurrent key/value store with per-entry TTL.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use conflux_core::config::CacheConfig;

use crate::sweeper::Sweep;

/// Deadline used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Cache entry with an absolute expiry instant.
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            expires_at: now.checked_add(ttl).unwrap_or(now + FAR_FUTURE),
        }
    }

    /// An entry is still visible at exactly its expiry instant.
    fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

/// Thread-safe TTL cache.
///
/// Expired entries are evicted lazily by [`get`](Self::get) and in bulk by
/// [`cleanup`](Self::cleanup); until then they still count towards
/// [`size`](Self::size). There is no capacity bound.
///
/// # Thread Safety
///
/// The map is sharded. [`get_or_compute`](Self::get_or_compute) holds the
/// shard lock of its key while the computation runs, so racing callers on the
/// same key wait for the first one and then see its value. Keys in other shards
/// are unaffected.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    default_ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates an empty cache whose entries live for `default_ttl` unless told otherwise.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Creates a cache from configuration.
    pub fn with_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl())
    }

    /// TTL applied when none is given.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Stores `value` with the default TTL, replacing any existing entry.
    pub fn put(&self, key: K, value: V) {
        self.put_with_ttl(key, value, self.default_ttl);
    }

    /// Stores `value` with a custom TTL, replacing any existing entry.
    pub fn put_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.entries.insert(key, CacheEntry::new(value, ttl));
    }

    /// Returns the value if present and not expired.
    ///
    /// An expired entry found here is evicted.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired_at(now) {
                return Some(entry.value.clone());
            }
        }

        // Re-check under the write lock: a concurrent put may have refreshed it.
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        None
    }

    /// Returns true if an unexpired entry exists. Does not evict.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    /// Returns the cached value, or computes, stores, and returns a new one.
    ///
    /// Uses the default TTL. See [`get_or_compute_with_ttl`](Self::get_or_compute_with_ttl).
    pub fn get_or_compute<F>(&self, key: K, compute: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        self.get_or_compute_with_ttl(key, compute, self.default_ttl)
    }

    /// Returns the cached value, or computes, stores, and returns a new one.
    ///
    /// Atomic per key: `compute` runs at most once per entry lifetime even when
    /// many threads race on the same missing or expired key, and every racer
    /// gets the same value. `compute` runs on the calling thread while the key's
    /// shard is locked, so it must not touch this cache.
    pub fn get_or_compute_with_ttl<F>(&self, key: K, compute: F, ttl: Duration) -> V
    where
        F: FnOnce(&K) -> V,
    {
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired() {
                    return occupied.get().value.clone();
                }
                let value = compute(occupied.key());
                occupied.insert(CacheEntry::new(value.clone(), ttl));
                value
            }
            Entry::Vacant(vacant) => {
                let value = compute(vacant.key());
                vacant.insert(CacheEntry::new(value.clone(), ttl));
                value
            }
        }
    }

    /// Like [`get_or_compute`](Self::get_or_compute) for computations that can fail.
    ///
    /// On error nothing is stored and the error is returned to this caller only.
    pub fn try_get_or_compute<F, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        let ttl = self.default_ttl;
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired() {
                    return Ok(occupied.get().value.clone());
                }
                let value = compute(occupied.key())?;
                occupied.insert(CacheEntry::new(value.clone(), ttl));
                Ok(value)
            }
            Entry::Vacant(vacant) => {
                let value = compute(vacant.key())?;
                vacant.insert(CacheEntry::new(value.clone(), ttl));
                Ok(value)
            }
        }
    }

    /// Removes an entry, expired or not. Returns whether one existed.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of physically present entries, including expired ones not yet evicted.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Removed expired cache entries");
        }
        removed
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let total = self.entries.len();
        let expired = self
            .entries
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .count();

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            valid_entries: total.saturating_sub(expired),
        }
    }
}

impl<K, V> Sweep for TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn sweep(&self) -> usize {
        self.cleanup()
    }
}

impl<K: Eq + Hash, V> fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

/// Cache statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStats {
    /// Physically present entries
    pub total_entries: usize,
    /// Present entries whose TTL has passed
    pub expired_entries: usize,
    /// Present, unexpired entries
    pub valid_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    use proptest::prelude::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn cache() -> TtlCache<String, String> {
        TtlCache::new(HOUR)
    }

    #[test]
    fn test_cache_put_get() {
        let cache = cache();
        cache.put("user:123".into(), "John Doe".into());
        assert_eq!(cache.get("user:123").as_deref(), Some("John Doe"));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_cache_miss() {
        let cache = cache();
        assert!(cache.get("nonexistent").is_none());
        assert!(!cache.contains_key("nonexistent"));
    }

    #[test]
    fn test_put_overwrites_unexpired_entry() {
        let cache = cache();
        cache.put("k".into(), "old".into());
        cache.put_with_ttl("k".into(), "new".into(), Duration::from_secs(5));
        assert_eq!(cache.get("k").as_deref(), Some("new"));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_ttl_expiration_evicts_on_read() {
        let cache = cache();
        cache.put_with_ttl("session".into(), "abc".into(), Duration::from_millis(1));
        thread::sleep(Duration::from_millis(10));

        // Still physically present until read or swept
        assert_eq!(cache.size(), 1);
        assert!(!cache.contains_key("session"));
        assert!(cache.get("session").is_none());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_remove() {
        let cache = cache();
        assert!(!cache.remove("missing"));

        cache.put("k".into(), "v".into());
        assert!(cache.remove("k"));
        assert!(cache.get("k").is_none());
        assert!(!cache.remove("k"));
    }

    #[test]
    fn test_remove_reports_expired_entry() {
        let cache = cache();
        cache.put_with_ttl("k".into(), "v".into(), Duration::from_millis(1));
        thread::sleep(Duration::from_millis(10));
        assert!(cache.remove("k"));
    }

    #[test]
    fn test_clear() {
        let cache = cache();
        cache.put("a".into(), "1".into());
        cache.put("b".into(), "2".into());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let cache = cache();
        cache.put_with_ttl("short".into(), "x".into(), Duration::from_millis(1));
        cache.put("long".into(), "y".into());
        thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get("long").as_deref(), Some("y"));
        assert_eq!(cache.cleanup(), 0);
    }

    #[test]
    fn test_stats() {
        let cache = cache();
        cache.put_with_ttl("short".into(), "x".into(), Duration::from_millis(1));
        cache.put("a".into(), "1".into());
        cache.put("b".into(), "2".into());
        thread::sleep(Duration::from_millis(10));

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.valid_entries, 2);
    }

    #[test]
    fn test_get_or_compute_uses_cached_value() {
        let cache = cache();
        cache.put("k".into(), "cached".into());

        let value = cache.get_or_compute("k".into(), |_| panic!("must not compute"));
        assert_eq!(value, "cached");
    }

    #[test]
    fn test_get_or_compute_recomputes_expired() {
        let cache = cache();
        cache.put_with_ttl("k".into(), "stale".into(), Duration::from_millis(1));
        thread::sleep(Duration::from_millis(10));

        let value = cache.get_or_compute("k".into(), |key| format!("fresh:{key}"));
        assert_eq!(value, "fresh:k");
        assert_eq!(cache.get("k").as_deref(), Some("fresh:k"));
    }

    #[test]
    fn test_get_or_compute_applies_ttl() {
        let cache = cache();
        cache.get_or_compute_with_ttl("k".into(), |_| "v".into(), Duration::from_millis(1));
        thread::sleep(Duration::from_millis(10));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_get_or_compute_runs_once_under_contention() {
        const THREADS: usize = 16;
        let cache: Arc<TtlCache<String, usize>> = Arc::new(TtlCache::new(HOUR));
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_compute("shared".to_string(), |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        i
                    })
                })
            })
            .collect();

        let results: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|v| *v == results[0]));
    }

    #[test]
    fn test_get_or_compute_recomputes_expired_once_under_contention() {
        const THREADS: usize = 16;
        let cache: Arc<TtlCache<String, usize>> = Arc::new(TtlCache::new(HOUR));
        cache.put_with_ttl("shared".into(), usize::MAX, Duration::from_millis(1));
        thread::sleep(Duration::from_millis(10));

        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_compute("shared".to_string(), |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        i
                    })
                })
            })
            .collect();

        let results: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_ne!(results[0], usize::MAX);
        assert!(results.iter().all(|v| *v == results[0]));
        assert_eq!(cache.get("shared"), Some(results[0]));
    }

    #[test]
    fn test_try_get_or_compute_error_stores_nothing() {
        let cache = cache();
        let result: Result<String, &str> = cache.try_get_or_compute("k".into(), |_| Err("offline"));
        assert_eq!(result, Err("offline"));
        assert_eq!(cache.size(), 0);

        let result: Result<String, &str> = cache.try_get_or_compute("k".into(), |_| Ok("v".into()));
        assert_eq!(result.as_deref(), Ok("v"));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let cache = cache();
        cache.put_with_ttl("forever".into(), "v".into(), Duration::MAX);
        assert_eq!(cache.get("forever").as_deref(), Some("v"));
    }

    #[test]
    fn test_sweep_trait_delegates_to_cleanup() {
        let cache = cache();
        cache.put_with_ttl("k".into(), "v".into(), Duration::from_millis(1));
        thread::sleep(Duration::from_millis(10));

        let sweepable: &dyn Sweep = &cache;
        assert_eq!(sweepable.sweep(), 1);
        assert!(cache.is_empty());
    }

    proptest! {
        #[test]
        fn prop_put_then_get_returns_value(
            entries in proptest::collection::hash_map("[a-z]{1,8}", any::<u32>(), 0..32)
        ) {
            let cache: TtlCache<String, u32> = TtlCache::new(HOUR);
            for (k, v) in &entries {
                cache.put(k.clone(), *v);
            }

            prop_assert_eq!(cache.size(), entries.len());
            for (k, v) in &entries {
                prop_assert_eq!(cache.get(k.as_str()), Some(*v));
            }
        }

        #[test]
        fn prop_remove_then_get_is_absent(keys in proptest::collection::vec("[a-z]{1,4}", 1..16)) {
            let cache: TtlCache<String, usize> = TtlCache::new(HOUR);
            for (i, k) in keys.iter().enumerate() {
                cache.put(k.clone(), i);
            }
            for k in &keys {
                cache.remove(k.as_str());
                prop_assert!(cache.get(k.as_str()).is_none());
            }
            prop_assert!(cache.is_empty());
        }
    }
}
