//! Periodic background expiry.
//!
//! Lazy eviction only reclaims keys that are read again. The [`Sweeper`]
//! covers the rest: one dedicated thread calls [`Sweep::sweep`] at a fixed
//! rate. Sweeps never overlap; if one overruns its slot, the ticks it missed
//! are skipped rather than run back to back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, instrument, warn};

use conflux_core::constants::{DEFAULT_SHUTDOWN_TIMEOUT, SWEEPER_THREAD};
use conflux_core::error::{ConfluxError, Result};

/// Something that can drop its expired entries.
pub trait Sweep: Send + Sync {
    /// Removes expired entries and returns how many were removed.
    fn sweep(&self) -> usize;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Running,
    Stopping,
    Stopped,
}

struct Shared {
    phase: Mutex<Phase>,
    wake: Condvar,
    sweeps: AtomicU64,
    removed: AtomicU64,
}

/// Marks the sweeper stopped when its thread exits, including by panic.
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        *self.0.phase.lock() = Phase::Stopped;
        self.0.wake.notify_all();
    }
}

/// Fixed-rate background sweeper.
///
/// The first sweep happens one interval after [`start`](Self::start).
pub struct Sweeper {
    interval: Duration,
    shutdown_timeout: Duration,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
    /// Starts sweeping `target` every `interval` on a dedicated thread.
    #[instrument(skip(target))]
    pub fn start(target: Arc<dyn Sweep>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(ConfluxError::ConfigError(
                "sweep interval must be greater than zero".into(),
            ));
        }

        let shared = Arc::new(Shared {
            phase: Mutex::new(Phase::Running),
            wake: Condvar::new(),
            sweeps: AtomicU64::new(0),
            removed: AtomicU64::new(0),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(SWEEPER_THREAD.into())
            .spawn(move || run(target, interval, thread_shared))?;

        info!(interval_ms = interval.as_millis() as u64, "Cache sweeper started");
        Ok(Self {
            interval,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Bounds how long [`shutdown`](Self::shutdown) waits for an in-progress sweep.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Interval between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Upper bound on how long [`shutdown`](Self::shutdown) waits.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Number of sweeps completed so far.
    pub fn sweep_count(&self) -> u64 {
        self.shared.sweeps.load(Ordering::Acquire)
    }

    /// Total entries removed by all sweeps so far.
    pub fn removed_count(&self) -> u64 {
        self.shared.removed.load(Ordering::Acquire)
    }

    /// Returns true until shutdown has been requested.
    pub fn is_running(&self) -> bool {
        *self.shared.phase.lock() == Phase::Running
    }

    /// Stops the sweeper, waiting at most the configured timeout.
    ///
    /// Returns `true` once the thread has exited. Safe to call more than once.
    pub fn shutdown(&self) -> bool {
        self.shutdown_within(self.shutdown_timeout)
    }

    /// Stops the sweeper and waits at most `timeout` for its thread to exit.
    ///
    /// Wakes the thread immediately if it is waiting. An in-progress sweep is
    /// not interrupted: if it outlasts `timeout` the thread is detached and
    /// exits on its own once the sweep returns.
    #[instrument(skip(self))]
    pub fn shutdown_within(&self, timeout: Duration) -> bool {
        {
            let mut phase = self.shared.phase.lock();
            if *phase == Phase::Running {
                *phase = Phase::Stopping;
            }
            self.shared.wake.notify_all();
        }

        let Some(handle) = self.handle.lock().take() else {
            return *self.shared.phase.lock() == Phase::Stopped;
        };

        let deadline = Instant::now() + timeout;
        let exited = {
            let mut phase = self.shared.phase.lock();
            while *phase != Phase::Stopped {
                if self.shared.wake.wait_until(&mut phase, deadline).timed_out() {
                    break;
                }
            }
            *phase == Phase::Stopped
        };

        if exited {
            if handle.join().is_err() {
                warn!("Cache sweeper thread panicked");
            }
            info!(sweeps = self.sweep_count(), "Cache sweeper stopped");
        } else {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Sweep still running at shutdown deadline; detaching sweeper thread"
            );
        }
        exited
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("interval", &self.interval)
            .field("sweeps", &self.sweep_count())
            .finish()
    }
}

fn run(target: Arc<dyn Sweep>, interval: Duration, shared: Arc<Shared>) {
    let _guard = ExitGuard(Arc::clone(&shared));
    let mut next = Instant::now() + interval;

    loop {
        {
            let mut phase = shared.phase.lock();
            while *phase == Phase::Running {
                if shared.wake.wait_until(&mut phase, next).timed_out() {
                    break;
                }
            }
            if *phase != Phase::Running {
                return;
            }
        }

        let removed = target.sweep();
        shared.sweeps.fetch_add(1, Ordering::AcqRel);
        shared.removed.fetch_add(removed as u64, Ordering::AcqRel);
        debug!(removed, "Sweep completed");

        next += interval;
        let now = Instant::now();
        let mut skipped = 0u64;
        while next <= now {
            next += interval;
            skipped += 1;
        }
        if skipped > 0 {
            debug!(skipped, "Sweep overran its slot; skipping missed ticks");
        }
    }
}
