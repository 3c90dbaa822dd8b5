//! Topic-based fan-out dispatcher.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, trace};

use conflux_core::config::DispatcherConfig;
use conflux_core::error::{ConfluxError, Result};
use conflux_core::traits::{
    ErrorSink, EventHandler, EventPublisher, Handler, HandlerFailure, TracingErrorSink,
};
use conflux_core::types::{Event, Topic};

use crate::pool::WorkerPool;
use crate::registry::SubscriptionRegistry;

/// Publishes events to their topic's subscribers on a shared worker pool.
///
/// Every publish snapshots the topic's handler list and schedules one job per
/// handler, in subscription order. Handlers run in parallel, so completion
/// order is unspecified. A failing handler (error or panic) is reported to the
/// [`ErrorSink`] and has no effect on its siblings or on the publisher.
pub struct EventBus {
    registry: SubscriptionRegistry,
    pool: WorkerPool,
    error_sink: Arc<dyn ErrorSink>,
}

impl EventBus {
    /// Creates a bus with its own worker pool.
    pub fn new(config: &DispatcherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: SubscriptionRegistry::new(),
            pool: WorkerPool::new(config.workers)?,
            error_sink: Arc::new(TracingErrorSink),
        })
    }

    /// Routes handler failures to `sink` instead of the default tracing sink.
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = sink;
        self
    }

    /// Subscribes `handler` to `topic`.
    pub fn subscribe(&self, topic: Topic, handler: Handler) {
        self.registry.subscribe(topic, handler);
    }

    /// Removes the first subscription of `handler` from `topic`.
    pub fn unsubscribe(&self, topic: Topic, handler: &Handler) -> bool {
        self.registry.unsubscribe(topic, handler)
    }

    /// The subscription registry.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// The worker pool handlers run on.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Schedules every current subscriber of `event.topic()`.
    ///
    /// Returns the number of handler invocations scheduled, which is zero for a
    /// topic without subscribers.
    #[instrument(skip(self, event), fields(topic = %event.topic(), event_id = %event.id()))]
    pub fn publish(&self, event: Arc<Event>) -> Result<usize> {
        if self.pool.is_shutdown() {
            return Err(ConfluxError::DispatcherShutdown);
        }

        let Some(handlers) = self.registry.snapshot(event.topic()) else {
            trace!("No subscribers");
            return Ok(0);
        };

        let jobs = handlers.iter().map(|handler| {
            let handler = Arc::clone(handler);
            let event = Arc::clone(&event);
            let sink = Arc::clone(&self.error_sink);
            move || invoke(handler.as_ref(), &event, sink.as_ref())
        });
        // All handlers or none: a concurrent shutdown cannot split the fan-out.
        let scheduled = self
            .pool
            .execute_all(jobs)
            .map_err(|_| ConfluxError::DispatcherShutdown)?;

        debug!(handlers = scheduled, "Event dispatched");
        Ok(scheduled)
    }

    /// Stops accepting events. Scheduled handler invocations still run.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }

    /// Waits up to `timeout` for in-flight handlers after [`shutdown`](Self::shutdown).
    pub fn await_termination(&self, timeout: Duration) -> bool {
        self.pool.await_termination(timeout)
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: Arc<Event>) -> Result<usize> {
        EventBus::publish(self, event)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("registry", &self.registry)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Runs one handler, turning an error or a panic into a reported failure.
fn invoke(handler: &dyn EventHandler, event: &Event, sink: &dyn ErrorSink) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event)));

    let (error, panicked) = match outcome {
        Ok(Ok(())) => {
            trace!(handler = handler.name(), "Handler completed");
            return;
        }
        Ok(Err(error)) => (error, false),
        Err(payload) => (anyhow::anyhow!(panic_message(payload.as_ref())), true),
    };

    sink.report(HandlerFailure {
        handler: handler.name().to_string(),
        topic: event.topic(),
        event_id: event.id(),
        error,
        panicked,
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
