//! Ordered ingestion queue in front of the dispatcher.

use std::sync::Arc;

use tracing::{instrument, trace, warn};

use conflux_core::config::QueueConfig;
use conflux_core::constants::EVENT_PROCESSOR_THREAD;
use conflux_core::error::Result;
use conflux_core::traits::EventPublisher;
use conflux_core::types::Event;
use conflux_core::worker::{QueueWorker, WorkerState};

/// Accepts events from any thread and forwards them, one at a time and in
/// submission order, to an [`EventPublisher`].
///
/// Producers never wait for handlers: `submit` only appends to an unbounded
/// queue. Ordering is guaranteed up to the publish call; handler completion
/// order is up to the dispatcher.
pub struct EventProcessor {
    worker: QueueWorker<Arc<Event>>,
    publisher: Arc<dyn EventPublisher>,
}

impl EventProcessor {
    /// Creates a processor with the default shutdown timeout. Call [`start`](Self::start) to begin forwarding.
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_config(publisher, &QueueConfig::default())
    }

    /// Creates a processor whose [`shutdown`](Self::shutdown) waits at most `config.timeout()`.
    pub fn with_config(publisher: Arc<dyn EventPublisher>, config: &QueueConfig) -> Self {
        Self {
            worker: QueueWorker::new(EVENT_PROCESSOR_THREAD, config.timeout()),
            publisher,
        }
    }

    /// Starts the consumer thread.
    ///
    /// Events submitted earlier are forwarded first. Fails if already started
    /// or stopped.
    pub fn start(&self) -> Result<()> {
        let publisher = Arc::clone(&self.publisher);
        self.worker.start(move |event: Arc<Event>| forward(publisher.as_ref(), event))
    }

    /// Queues `event` for publishing.
    pub fn submit(&self, event: impl Into<Arc<Event>>) -> Result<()> {
        let event = event.into();
        trace!(topic = %event.topic(), event_id = %event.id(), "Event submitted");
        self.worker.submit(event)
    }

    /// Stops accepting events; queued events are still forwarded.
    pub fn stop(&self) {
        self.worker.stop();
    }

    /// Stops and waits (bounded) for the queue to drain.
    ///
    /// Returns false if the consumer had to be abandoned.
    #[instrument(skip(self))]
    pub fn shutdown(&self) -> bool {
        self.worker.shutdown()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Events submitted but not yet forwarded.
    pub fn pending(&self) -> usize {
        self.worker.pending()
    }
}

impl std::fmt::Debug for EventProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

fn forward(publisher: &dyn EventPublisher, event: Arc<Event>) {
    let topic = event.topic();
    let id = event.id();
    match publisher.publish(event) {
        Ok(scheduled) => trace!(%topic, event_id = %id, scheduled, "Event forwarded"),
        Err(e) => warn!(%topic, event_id = %id, error = %e, "Failed to publish event"),
    }
}
