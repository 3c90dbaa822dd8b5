//! # Conflux Cache
//!
//! Thread-safe in-memory cache with per-entry time-to-live.
//!
//! - [`TtlCache`]: the concurrent map with lazy expiry and atomic get-or-compute
//! - [`Sweeper`]: fixed-rate background cleanup for keys that are never read again
//! - [`CacheManager`]: a cache and its sweeper built from [`CacheConfig`](conflux_core::CacheConfig)
//!
//! This is a pure TTL cache: there is no capacity bound and no LRU/LFU eviction.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use conflux_cache::TtlCache;
//!
//! let cache: TtlCache<String, u64> = TtlCache::new(Duration::from_secs(1800));
//! cache.put("config:timeout".into(), 5000);
//!
//! let value = cache.get_or_compute("computed:key".into(), |_| 42);
//! assert_eq!(value, 42);
//! assert_eq!(cache.get("config:timeout"), Some(5000));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod cache;
mod manager;
mod sweeper;

pub use cache::{CacheStats, TtlCache};
pub use manager::CacheManager;
pub use sweeper::{Sweep, Sweeper};
