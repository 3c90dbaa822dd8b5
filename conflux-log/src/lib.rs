//! # Conflux Log
//!
//! An explicitly constructed log sink that moves output I/O off the calling
//! thread. Hand an [`AsyncSink`] (or a clone of it) to whatever needs to log:
//!
//! - call [`AsyncSink::info`] and friends directly,
//! - plug it into `tracing-subscriber` as a [`MakeWriter`](tracing_subscriber::fmt::MakeWriter),
//! - or give it to the event bus as its [`ErrorSink`](conflux_core::ErrorSink).
//!
//! ## Example
//!
//! ```rust
//! use conflux_log::AsyncSink;
//!
//! let sink = AsyncSink::stdout().unwrap();
//! sink.info("Cache manager started");
//! sink.warn(format!("{} entries expired", 3));
//! assert!(sink.shutdown());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod entry;
mod sink;

pub use entry::LogEntry;
pub use sink::{AsyncSink, SinkWriter};
