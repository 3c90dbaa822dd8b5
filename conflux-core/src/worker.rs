//! Single-consumer background queue with cooperative shutdown.
//!
//! [`QueueWorker`] owns an unbounded FIFO and one dedicated thread that drains
//! it. Producers call [`QueueWorker::submit`] from any thread; the consumer
//! closure sees items in exactly the order they were submitted.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start──▶ Running ──stop──▶ StopRequested ──(queue drained)──▶ Stopped
//!    └──────────────────────stop────────────────────────────────────────────▲
//! ```
//!
//! Stopping closes the queue: the consumer wakes, drains whatever was already
//! submitted, then exits. [`QueueWorker::shutdown`] additionally waits for that
//! exit, but never longer than the configured timeout; past the deadline the
//! thread is detached with its abort flag raised and the remaining items are
//! discarded.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument, warn};

use crate::error::{ConfluxError, Result};

/// Lifecycle state of a [`QueueWorker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed; items may be queued but nothing consumes them yet
    Created,
    /// Consumer thread is running
    Running,
    /// Queue closed; consumer is draining what is left
    StopRequested,
    /// Consumer thread has exited
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Created => "created",
            WorkerState::Running => "running",
            WorkerState::StopRequested => "stop-requested",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

struct Shared {
    state: Mutex<WorkerState>,
    finished: Condvar,
    abort: AtomicBool,
    pending: AtomicUsize,
}

/// Marks the worker stopped when the consumer thread exits, including by panic.
struct FinishGuard(Arc<Shared>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        *self.0.state.lock() = WorkerState::Stopped;
        self.0.finished.notify_all();
    }
}

/// Unbounded FIFO drained by one dedicated, named thread.
///
/// There is no admission control: a producer that outpaces the consumer grows
/// the queue without limit.
pub struct QueueWorker<T: Send + 'static> {
    name: String,
    shutdown_timeout: Duration,
    shared: Arc<Shared>,
    sender: Mutex<Option<UnboundedSender<T>>>,
    receiver: Mutex<Option<UnboundedReceiver<T>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> QueueWorker<T> {
    /// Creates a worker in the `Created` state.
    ///
    /// `name` becomes the consumer thread's name; `shutdown_timeout` bounds
    /// [`shutdown`](Self::shutdown).
    pub fn new(name: impl Into<String>, shutdown_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            shutdown_timeout,
            shared: Arc::new(Shared {
                state: Mutex::new(WorkerState::Created),
                finished: Condvar::new(),
                abort: AtomicBool::new(false),
                pending: AtomicUsize::new(0),
            }),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            handle: Mutex::new(None),
        }
    }

    /// Worker (and thread) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        *self.shared.state.lock()
    }

    /// Items submitted but not yet taken by the consumer.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Launches the consumer thread, which calls `consumer` once per item.
    ///
    /// Fails with [`ConfluxError::AlreadyStarted`] unless the worker is still `Created`.
    #[instrument(skip(self, consumer), fields(worker = %self.name))]
    pub fn start<F>(&self, consumer: F) -> Result<()>
    where
        F: FnMut(T) + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if *state != WorkerState::Created {
            return Err(ConfluxError::AlreadyStarted(self.name.clone()));
        }
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| ConfluxError::AlreadyStarted(self.name.clone()))?;

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || consume(receiver, consumer, shared));

        match spawned {
            Ok(handle) => {
                *state = WorkerState::Running;
                *self.handle.lock() = Some(handle);
                debug!("Consumer thread started");
                Ok(())
            }
            Err(e) => {
                *state = WorkerState::Stopped;
                self.sender.lock().take();
                Err(e.into())
            }
        }
    }

    /// Appends `item` to the queue.
    ///
    /// Never blocks on capacity. Fails with [`ConfluxError::WorkerStopped`] once
    /// the worker has been asked to stop.
    pub fn submit(&self, item: T) -> Result<()> {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(ConfluxError::WorkerStopped(self.name.clone()));
        };

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if tx.send(item).is_err() {
            // Consumer is gone (it panicked); the item was handed back and dropped.
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(ConfluxError::WorkerStopped(self.name.clone()));
        }
        Ok(())
    }

    /// Closes the queue and wakes the consumer.
    ///
    /// Already-submitted items are still consumed. Does not wait; see
    /// [`shutdown`](Self::shutdown) for that. Calling it again is a no-op.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        match *state {
            WorkerState::Created => {
                *state = WorkerState::Stopped;
                self.sender.lock().take();
                let discarded = self.pending();
                self.receiver.lock().take();
                self.shared.pending.store(0, Ordering::Release);
                if discarded > 0 {
                    warn!(worker = %self.name, discarded, "Stopped before start; queued items discarded");
                }
            }
            WorkerState::Running => {
                *state = WorkerState::StopRequested;
                // Dropping the last sender lets the consumer drain and then see end-of-queue.
                self.sender.lock().take();
                debug!(worker = %self.name, pending = self.pending(), "Stop requested");
            }
            WorkerState::StopRequested | WorkerState::Stopped => {}
        }
    }

    /// Stops the worker and waits for the consumer using the configured timeout.
    ///
    /// Returns `true` once the consumer thread has exited.
    pub fn shutdown(&self) -> bool {
        self.shutdown_within(self.shutdown_timeout)
    }

    /// Stops the worker and waits at most `timeout` for the consumer to exit.
    ///
    /// On timeout the thread is detached and told to drop the rest of its
    /// queue; the call returns `false` instead of blocking further.
    #[instrument(skip(self), fields(worker = %self.name))]
    pub fn shutdown_within(&self, timeout: Duration) -> bool {
        self.stop();

        let Some(handle) = self.handle.lock().take() else {
            return self.state() == WorkerState::Stopped;
        };

        let deadline = Instant::now() + timeout;
        let finished = {
            let mut state = self.shared.state.lock();
            while *state != WorkerState::Stopped {
                if self
                    .shared
                    .finished
                    .wait_until(&mut state, deadline)
                    .timed_out()
                {
                    break;
                }
            }
            *state == WorkerState::Stopped
        };

        if finished {
            if handle.join().is_err() {
                warn!("Consumer thread panicked");
            }
            info!("Worker shut down");
            true
        } else {
            self.shared.abort.store(true, Ordering::Release);
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                pending = self.pending(),
                "Consumer did not finish in time; abandoning remaining items"
            );
            false
        }
    }
}

impl<T: Send + 'static> Drop for QueueWorker<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Send + 'static> fmt::Debug for QueueWorker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueWorker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

fn consume<T, F>(mut receiver: UnboundedReceiver<T>, mut consumer: F, shared: Arc<Shared>)
where
    F: FnMut(T),
{
    let _guard = FinishGuard(Arc::clone(&shared));

    while let Some(item) = receiver.blocking_recv() {
        shared.pending.fetch_sub(1, Ordering::AcqRel);
        if shared.abort.load(Ordering::Acquire) {
            break;
        }
        consumer(item);
    }
}
