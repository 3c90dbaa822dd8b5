//! Fixed-size thread pool for handler invocations.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use conflux_core::constants::WORKER_THREAD_PREFIX;
use conflux_core::error::{ConfluxError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    live: Mutex<usize>,
    exited: Condvar,
    queued: AtomicUsize,
    active: AtomicUsize,
}

/// Decrements the live-worker count when a worker thread exits.
struct ExitGuard(Arc<PoolState>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut live = self.0.live.lock();
        *live -= 1;
        if *live == 0 {
            self.0.exited.notify_all();
        }
    }
}

/// A fixed number of named threads sharing one unbounded FIFO of jobs.
///
/// Jobs start in submission order; with more than one worker they complete in
/// any order.
///
/// The job queue is unbounded; `execute` never blocks or rejects for capacity.
pub struct WorkerPool {
    size: usize,
    sender: Mutex<Option<UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    state: Arc<PoolState>,
}

impl WorkerPool {
    /// Spawns `size` worker threads.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(ConfluxError::ConfigError(
                "worker pool size must be at least 1".into(),
            ));
        }

        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let state = Arc::new(PoolState {
            live: Mutex::new(0),
            exited: Condvar::new(),
            queued: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = Arc::clone(&receiver);
            let thread_state = Arc::clone(&state);
            *state.live.lock() += 1;
            let spawned = thread::Builder::new()
                .name(format!("{WORKER_THREAD_PREFIX}-{index}"))
                .spawn(move || work(receiver, thread_state));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    *state.live.lock() -= 1;
                    // Dropping the sender lets already-spawned workers exit.
                    drop(sender);
                    return Err(e.into());
                }
            }
        }

        debug!(size, "Worker pool started");
        Ok(Self {
            size,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            state,
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs waiting for a free worker.
    pub fn queued_count(&self) -> usize {
        self.state.queued.load(Ordering::Acquire)
    }

    /// Jobs currently executing.
    pub fn active_count(&self) -> usize {
        self.state.active.load(Ordering::Acquire)
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Queues `job` for execution on some worker.
    ///
    /// A panicking job is logged and does not take its worker down.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(ConfluxError::WorkerStopped("worker pool".into()));
        };

        self.state.queued.fetch_add(1, Ordering::AcqRel);
        if tx.send(Box::new(job)).is_err() {
            self.state.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(ConfluxError::WorkerStopped("worker pool".into()));
        }
        Ok(())
    }

    /// Queues a batch of jobs under one hold of the queue.
    ///
    /// Either every job is queued or, if the pool has been shut down, none is.
    /// Jobs start in iteration order. Returns how many were queued.
    pub fn execute_all<I, F>(&self, jobs: I) -> Result<usize>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() + Send + 'static,
    {
        let batch: Vec<Job> = jobs.into_iter().map(|job| Box::new(job) as Job).collect();

        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(ConfluxError::WorkerStopped("worker pool".into()));
        };

        let count = batch.len();
        self.state.queued.fetch_add(count, Ordering::AcqRel);
        for (sent, job) in batch.into_iter().enumerate() {
            // Workers only exit once every sender is gone, so this cannot fail while we hold one.
            if tx.send(job).is_err() {
                self.state.queued.fetch_sub(count - sent, Ordering::AcqRel);
                return Err(ConfluxError::WorkerStopped("worker pool".into()));
            }
        }
        Ok(count)
    }

    /// Stops accepting jobs. Queued and running jobs still complete.
    ///
    /// Does not wait; see [`await_termination`](Self::await_termination).
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            info!(
                queued = self.queued_count(),
                active = self.active_count(),
                "Worker pool shutting down"
            );
        }
    }

    /// Waits up to `timeout` for every worker to exit after [`shutdown`](Self::shutdown).
    ///
    /// Returns true if all workers exited (and were joined) in time.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        {
            let mut live = self.state.live.lock();
            while *live > 0 {
                if self.state.exited.wait_until(&mut live, deadline).timed_out() {
                    break;
                }
            }
            if *live > 0 {
                warn!(live = *live, "Workers still running after timeout");
                return false;
            }
        }

        for handle in self.workers.lock().drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
        true
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers drain the queue and exit on their own once the sender is gone.
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("queued", &self.queued_count())
            .field("active", &self.active_count())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

fn work(receiver: Arc<Mutex<UnboundedReceiver<Job>>>, state: Arc<PoolState>) {
    let _guard = ExitGuard(Arc::clone(&state));

    loop {
        // Hold the receiver only while waiting; release it before running the job.
        let job = receiver.lock().blocking_recv();
        let Some(job) = job else {
            break;
        };

        state.queued.fetch_sub(1, Ordering::AcqRel);
        state.active.fetch_add(1, Ordering::AcqRel);
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("Job panicked; worker continues");
        }
        state.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc as std_mpsc;

    #[test]
    fn test_zero_workers_rejected() {
        assert!(WorkerPool::new(0).unwrap_err().is_config_error());
    }

    #[test]
    fn test_executes_jobs() {
        let pool = WorkerPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(pool.queued_count(), 0);
    }

    #[test]
    fn test_runs_in_parallel_on_named_threads() {
        let pool = WorkerPool::new(3).unwrap();
        let (tx, rx) = std_mpsc::channel();
        let barrier = Arc::new(std::sync::Barrier::new(3));

        for _ in 0..3 {
            let tx = tx.clone();
            let barrier = Arc::clone(&barrier);
            pool.execute(move || {
                // Only passes if all three jobs run at the same time.
                barrier.wait();
                let name = thread::current().name().unwrap_or_default().to_string();
                tx.send(name).unwrap();
            })
            .unwrap();
        }

        let names: HashSet<String> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| n.starts_with(WORKER_THREAD_PREFIX)));
    }

    #[test]
    fn test_execute_after_shutdown_fails() {
        let pool = WorkerPool::new(1).unwrap();
        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(pool.execute(|| {}).unwrap_err().is_lifecycle_error());
    }

    #[test]
    fn test_execute_all_runs_batch() {
        let pool = WorkerPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let jobs = (0..10).map(|_| {
            let counter = Arc::clone(&counter);
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(pool.execute_all(jobs).unwrap(), 10);
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(pool.queued_count(), 0);
    }

    #[test]
    fn test_execute_all_after_shutdown_queues_nothing() {
        let pool = WorkerPool::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        pool.shutdown();

        let jobs = (0..3).map(|_| {
            let counter = Arc::clone(&counter);
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(pool.execute_all(jobs).unwrap_err().is_lifecycle_error());
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(pool.queued_count(), 0);
    }

    #[test]
    fn test_shutdown_lets_queued_jobs_finish() {
        let pool = WorkerPool::new(1).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let done = Arc::clone(&done);
            pool.execute(move || {
                thread::sleep(Duration::from_millis(10));
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown();
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_await_termination_times_out() {
        let pool = WorkerPool::new(1).unwrap();
        pool.execute(|| thread::sleep(Duration::from_millis(300)))
            .unwrap();
        pool.shutdown();

        assert!(!pool.await_termination(Duration::from_millis(20)));
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = std_mpsc::channel();

        pool.execute(|| panic!("job failure")).unwrap();
        pool.execute(move || tx.send(42).unwrap()).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
    }
}
