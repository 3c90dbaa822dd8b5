//! Log records as queued for the writer thread.

use std::fmt;
use std::thread;

use chrono::{DateTime, Utc};
use tracing::Level;

/// Timestamp layout used in written entries.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// One log call, formatted at the call site.
///
/// Renders as `[timestamp] [LEVEL] [thread] message`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    level: Level,
    message: String,
    thread: String,
    timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Captures the calling thread and the current time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        let current = thread::current();
        let thread = match current.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", current.id()),
        };

        Self {
            level,
            message: message.into(),
            thread,
            timestamp: Utc::now(),
        }
    }

    /// Severity.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Formatted message text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Name (or id) of the thread that made the log call.
    pub fn thread(&self) -> &str {
        &self.thread
    }

    /// When the log call was made.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{:<5}] [{}] {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.level.as_str(),
            self.thread,
            self.message
        )
    }
}

/// What the writer thread receives.
#[derive(Debug)]
pub(crate) enum SinkRecord {
    /// A structured entry from [`AsyncSink::log`](crate::AsyncSink::log)
    Entry(LogEntry),
    /// Bytes already formatted by a `tracing-subscriber` layer
    Line(Vec<u8>),
}
