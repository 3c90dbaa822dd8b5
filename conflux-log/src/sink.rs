//! The asynchronous sink and its writer thread.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

use conflux_core::config::QueueConfig;
use conflux_core::constants::LOG_SINK_THREAD;
use conflux_core::error::Result;
use conflux_core::traits::{ErrorSink, HandlerFailure};
use conflux_core::worker::{QueueWorker, WorkerState};

use crate::entry::{LogEntry, SinkRecord};

struct Counters {
    written: AtomicU64,
    dropped: AtomicU64,
}

struct Inner {
    worker: QueueWorker<SinkRecord>,
    counters: Arc<Counters>,
}

/// Log sink whose output I/O happens on one dedicated writer thread.
///
/// Callers format their message immediately and only pay for an enqueue; the
/// writer drains records in FIFO order. Cloning is cheap and every clone feeds
/// the same writer, so one sink can be handed to each component that logs.
///
/// Records logged after [`shutdown`](Self::shutdown) are dropped and counted in
/// [`dropped`](Self::dropped).
#[derive(Clone)]
pub struct AsyncSink {
    inner: Arc<Inner>,
}

impl AsyncSink {
    /// Starts a sink writing to stdout.
    pub fn new(config: &QueueConfig) -> Result<Self> {
        Self::with_writer(config, Box::new(io::stdout()))
    }

    /// Starts a stdout sink with default settings.
    pub fn stdout() -> Result<Self> {
        Self::new(&QueueConfig::default())
    }

    /// Starts a sink writing to `output`.
    pub fn with_writer(config: &QueueConfig, mut output: Box<dyn Write + Send>) -> Result<Self> {
        let counters = Arc::new(Counters {
            written: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        let worker: QueueWorker<SinkRecord> = QueueWorker::new(LOG_SINK_THREAD, config.timeout());

        let writer_counters = Arc::clone(&counters);
        worker.start(move |record| match write_record(output.as_mut(), &record) {
            Ok(()) => {
                writer_counters.written.fetch_add(1, Ordering::Relaxed);
            }
            // Reporting through tracing could route straight back into this sink.
            Err(e) => eprintln!("conflux-log: failed to write log record: {e}"),
        })?;

        Ok(Self {
            inner: Arc::new(Inner { worker, counters }),
        })
    }

    /// Queues `message` at `level`.
    pub fn log(&self, level: Level, message: impl Into<String>) {
        self.enqueue(SinkRecord::Entry(LogEntry::new(level, message)));
    }

    /// Queues a message built from format arguments, e.g. `format_args!("{} items", n)`.
    pub fn log_fmt(&self, level: Level, args: fmt::Arguments<'_>) {
        self.log(level, args.to_string());
    }

    /// Queues `message` at debug level.
    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::DEBUG, message);
    }

    /// Queues `message` at info level.
    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::INFO, message);
    }

    /// Queues `message` at warn level.
    pub fn warn(&self, message: impl Into<String>) {
        self.log(Level::WARN, message);
    }

    /// Queues `message` at error level.
    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::ERROR, message);
    }

    /// Records written to the output so far.
    pub fn written(&self) -> u64 {
        self.inner.counters.written.load(Ordering::Relaxed)
    }

    /// Records rejected because the sink was already shut down.
    pub fn dropped(&self) -> u64 {
        self.inner.counters.dropped.load(Ordering::Relaxed)
    }

    /// Records queued but not yet picked up by the writer.
    pub fn pending(&self) -> usize {
        self.inner.worker.pending()
    }

    /// Writer lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.inner.worker.state()
    }

    /// Stops the writer after it drains, waiting at most the configured timeout.
    ///
    /// Returns false if the writer had to be abandoned. Affects every clone.
    pub fn shutdown(&self) -> bool {
        self.inner.worker.shutdown()
    }

    fn enqueue(&self, record: SinkRecord) {
        if self.inner.worker.submit(record).is_err() {
            self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl fmt::Debug for AsyncSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSink")
            .field("worker", &self.inner.worker)
            .field("written", &self.written())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl ErrorSink for AsyncSink {
    fn report(&self, failure: HandlerFailure) {
        self.error(format!("Error handling event: {failure}"));
    }
}

/// Buffers one formatted `tracing` event and queues it when dropped.
pub struct SinkWriter {
    sink: AsyncSink,
    buf: Vec<u8>,
}

impl Write for SinkWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SinkWriter {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            let line = std::mem::take(&mut self.buf);
            self.sink.enqueue(SinkRecord::Line(line));
        }
    }
}

impl<'a> MakeWriter<'a> for AsyncSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            sink: self.clone(),
            buf: Vec::new(),
        }
    }
}

fn write_record(output: &mut dyn Write, record: &SinkRecord) -> io::Result<()> {
    match record {
        SinkRecord::Entry(entry) => writeln!(output, "{entry}")?,
        SinkRecord::Line(bytes) => output.write_all(bytes)?,
    }
    output.flush()
}
