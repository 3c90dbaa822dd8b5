//! Common traits for Conflux.
//!
//! These traits are the seams between the pipeline stages, so that each stage
//! can be driven and observed on its own in tests.

use std::fmt;
use std::sync::Arc;

use tracing::error;

use crate::error::Result;
use crate::types::{Event, Topic};

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// A subscriber callback.
///
/// Handlers run on dispatcher worker threads, possibly several at once, and
/// only ever see the event by shared reference.
pub trait EventHandler: Send + Sync {
    /// Name used when reporting failures.
    fn name(&self) -> &str;

    /// Processes one event.
    fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Shared handler reference as stored in the subscription registry.
///
/// Identity (for `unsubscribe`) is the allocation this `Arc` points to.
pub type Handler = Arc<dyn EventHandler>;

/// Adapter turning a closure into an [`EventHandler`].
pub struct FnHandler<F> {
    name: String,
    func: F,
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.func)(event)
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

/// Wraps a closure as a shareable [`Handler`].
pub fn handler_fn<F>(name: impl Into<String>, func: F) -> Handler
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        func,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// FAILURE REPORTING
// ═══════════════════════════════════════════════════════════════════════════════

/// A handler invocation that returned an error or panicked.
#[derive(Debug)]
pub struct HandlerFailure {
    /// Name of the failing handler
    pub handler: String,
    /// Topic of the event being handled
    pub topic: Topic,
    /// Id of the event being handled
    pub event_id: uuid::Uuid,
    /// Returned error, or the panic message
    pub error: anyhow::Error,
    /// Whether the handler panicked rather than returning an error
    pub panicked: bool,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.panicked { "panicked" } else { "failed" };
        write!(
            f,
            "handler '{}' {} on {} event {}: {:#}",
            self.handler, kind, self.topic, self.event_id, self.error
        )
    }
}

/// Destination for handler failures.
///
/// The dispatcher hands every failure here and then drops it; nothing is
/// propagated back to the publisher.
pub trait ErrorSink: Send + Sync {
    /// Records one failure.
    fn report(&self, failure: HandlerFailure);
}

/// Reports failures through `tracing` at error level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, failure: HandlerFailure) {
        error!(
            handler = %failure.handler,
            topic = %failure.topic,
            event_id = %failure.event_id,
            panicked = failure.panicked,
            "Error handling event: {:#}",
            failure.error
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLISHER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Something that fans an event out to its subscribers.
///
/// Implemented by the dispatcher; the ingestion queue forwards to it.
pub trait EventPublisher: Send + Sync {
    /// Schedules every current subscriber of `event.topic()`.
    ///
    /// Returns how many handler invocations were scheduled; zero subscribers is
    /// not an error.
    fn publish(&self, event: Arc<Event>) -> Result<usize>;
}

impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    fn publish(&self, event: Arc<Event>) -> Result<usize> {
        (**self).publish(event)
    }
}
