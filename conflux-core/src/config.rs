//! Construction-time configuration.
//!
//! Every long-lived component takes its settings at construction. Values can
//! come from code (builder setters), from serialized form, or from `CONFLUX_*`
//! environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{ConfluxError, Result};

/// Cache configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied by `put` and `get_or_compute` when none is given, in milliseconds
    pub default_ttl_ms: u64,
    /// Interval between background expiry sweeps, in milliseconds
    pub sweep_interval_ms: u64,
    /// Upper bound on how long `shutdown` waits for the sweeper thread, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_CACHE_TTL.as_millis() as u64,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default TTL.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Sets the sweep interval.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the sweeper shutdown timeout.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Default TTL as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Sweep interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Sweeper shutdown timeout as a `Duration`.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Rejects a zero TTL or a zero sweep interval.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_ms == 0 {
            return Err(ConfluxError::ConfigError(
                "default TTL must be greater than zero".into(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfluxError::ConfigError(
                "sweep interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads overrides through `lookup`, falling back to defaults for unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(ms) = parse_var(&lookup, ENV_DEFAULT_TTL_MS)? {
            config.default_ttl_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, ENV_SWEEP_INTERVAL_MS)? {
            config.sweep_interval_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, ENV_CACHE_SHUTDOWN_TIMEOUT_MS)? {
            config.shutdown_timeout_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Dispatcher configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Number of worker threads executing handlers (at least 1)
    pub workers: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(FALLBACK_WORKER_COUNT);
        Self { workers }
    }
}

impl DispatcherConfig {
    /// Creates a configuration with a fixed worker count.
    pub fn with_workers(workers: usize) -> Self {
        Self { workers }
    }

    /// Rejects a pool without workers.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ConfluxError::ConfigError(
                "worker pool size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads overrides through `lookup`, falling back to defaults for unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(workers) = parse_var(&lookup, ENV_WORKERS)? {
            config.workers = workers as usize;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Settings shared by the single-consumer background queues: the log sink and
/// the event ingestion queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Upper bound on how long `shutdown` waits for the consumer, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT.as_millis() as u64,
        }
    }
}

impl QueueConfig {
    /// Sets the shutdown timeout.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Shutdown timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads overrides through `lookup`, falling back to defaults for unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(ms) = parse_var(&lookup, ENV_QUEUE_SHUTDOWN_TIMEOUT_MS)? {
            config.shutdown_timeout_ms = ms;
        }
        Ok(config)
    }
}

/// Aggregate configuration for a full deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfluxConfig {
    /// Cache settings
    pub cache: CacheConfig,
    /// Dispatcher settings
    pub dispatcher: DispatcherConfig,
    /// Log sink and ingestion queue settings
    pub queue: QueueConfig,
}

impl ConfluxConfig {
    /// Reads every section from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads every section through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            cache: CacheConfig::from_lookup(&lookup)?,
            dispatcher: DispatcherConfig::from_lookup(&lookup)?,
            queue: QueueConfig::from_lookup(&lookup)?,
        })
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.dispatcher.validate()
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u64>> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
            ConfluxError::ConfigError(format!("{name}={raw:?} is not a valid integer: {e}"))
        }),
    }
}
