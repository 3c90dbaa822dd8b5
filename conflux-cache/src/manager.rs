//! A cache bundled with its sweeper.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use conflux_core::config::CacheConfig;
use conflux_core::error::Result;

use crate::cache::TtlCache;
use crate::sweeper::Sweeper;

/// A [`TtlCache`] with a running [`Sweeper`].
///
/// Dropping the manager stops the sweeper; the cache itself lives on for as
/// long as other `Arc` handles to it exist.
pub struct CacheManager<K, V> {
    cache: Arc<TtlCache<K, V>>,
    sweeper: Sweeper,
}

impl<K, V> CacheManager<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache with the configured default TTL and starts sweeping it.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(TtlCache::with_config(config));
        let sweeper = Sweeper::start(cache.clone(), config.interval())?
            .with_shutdown_timeout(config.stop_timeout());
        Ok(Self { cache, sweeper })
    }

    /// Shared handle to the underlying cache.
    pub fn cache(&self) -> &Arc<TtlCache<K, V>> {
        &self.cache
    }

    /// The background sweeper.
    pub fn sweeper(&self) -> &Sweeper {
        &self.sweeper
    }

    /// Stores `value` with the default TTL.
    pub fn put(&self, key: K, value: V) {
        self.cache.put(key, value);
    }

    /// Stores `value` with a custom TTL.
    pub fn put_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.cache.put_with_ttl(key, value, ttl);
    }

    /// Returns the value if present and not expired.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.get(key)
    }

    /// Returns the cached value or computes and stores it with the default TTL.
    pub fn get_or_compute<F>(&self, key: K, compute: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        self.cache.get_or_compute(key, compute)
    }

    /// Returns the cached value or computes and stores it with `ttl`.
    pub fn get_or_compute_with_ttl<F>(&self, key: K, compute: F, ttl: Duration) -> V
    where
        F: FnOnce(&K) -> V,
    {
        self.cache.get_or_compute_with_ttl(key, compute, ttl)
    }

    /// Removes an entry. Returns whether one existed.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.remove(key)
    }

    /// Stops the sweeper, waiting at most the configured shutdown timeout.
    ///
    /// Returns false if a sweep was still running at the deadline. Safe to call
    /// more than once.
    pub fn shutdown(&self) -> bool {
        let stopped = self.sweeper.shutdown();
        info!(entries = self.cache.size(), stopped, "Cache manager shut down");
        stopped
    }
}

impl<K> CacheManager<K, Value>
where
    K: Eq + Hash + Send + Sync + 'static,
{
    /// Returns the value decoded as `T`.
    ///
    /// `None` when the key is absent, expired, or holds a value of another shape.
    pub fn get_as<T, Q>(&self, key: &Q) -> Option<T>
    where
        T: DeserializeOwned,
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let value = self.cache.get(key)?;
        serde_json::from_value(value).ok()
    }
}
