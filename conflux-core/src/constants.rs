//! Default values and environment variable names.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default time-to-live for cache entries (30 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Default interval between expiry sweeps (60 seconds).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ═══════════════════════════════════════════════════════════════════════════════
// LIFECYCLE DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// How long `shutdown` waits for a background consumer before abandoning it.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Worker pool size used when available parallelism cannot be determined.
pub const FALLBACK_WORKER_COUNT: usize = 4;

// ═══════════════════════════════════════════════════════════════════════════════
// THREAD NAMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Name of the ingestion queue consumer thread.
pub const EVENT_PROCESSOR_THREAD: &str = "conflux-event-processor";

/// Name of the log sink writer thread.
pub const LOG_SINK_THREAD: &str = "conflux-log-sink";

/// Name of the cache sweeper thread.
pub const SWEEPER_THREAD: &str = "conflux-cache-sweeper";

/// Prefix for dispatcher worker threads; the worker index is appended.
pub const WORKER_THREAD_PREFIX: &str = "conflux-worker";

// ═══════════════════════════════════════════════════════════════════════════════
// ENVIRONMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Overrides the default cache TTL, in milliseconds.
pub const ENV_DEFAULT_TTL_MS: &str = "CONFLUX_DEFAULT_TTL_MS";

/// Overrides the sweep interval, in milliseconds.
pub const ENV_SWEEP_INTERVAL_MS: &str = "CONFLUX_SWEEP_INTERVAL_MS";

/// Overrides the dispatcher worker count.
pub const ENV_WORKERS: &str = "CONFLUX_WORKERS";

/// Overrides how long the cache sweeper may take to stop, in milliseconds.
pub const ENV_CACHE_SHUTDOWN_TIMEOUT_MS: &str = "CONFLUX_CACHE_SHUTDOWN_TIMEOUT_MS";

/// Overrides the shutdown timeout of the log sink and ingestion queue, in milliseconds.
pub const ENV_QUEUE_SHUTDOWN_TIMEOUT_MS: &str = "CONFLUX_QUEUE_SHUTDOWN_TIMEOUT_MS";
