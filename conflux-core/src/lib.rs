//! # Conflux Core
//!
//! Core types, errors, and shared runtime pieces for the Conflux cache and
//! event pipeline.
//!
//! This crate provides the foundational building blocks used by all other Conflux crates:
//!
//! - **Types**: the closed [`Topic`] enumeration and the immutable [`Event`] envelope
//! - **Errors**: a single error hierarchy with classification helpers
//! - **Config**: construction-time settings for the cache, dispatcher, and log sink
//! - **Traits**: the seams between components ([`EventHandler`], [`EventPublisher`], [`ErrorSink`])
//! - **Worker**: [`QueueWorker`], the single-consumer background queue with cooperative shutdown
//!
//! ## Example
//!
//! ```rust
//! use conflux_core::{Event, Topic};
//!
//! let event = Event::new(Topic::UserLogin, "AuthService")
//!     .with("username", "john_doe")
//!     .with("ip", "192.168.1.100");
//!
//! assert_eq!(event.topic(), Topic::UserLogin);
//! assert_eq!(event.get("username").and_then(|v| v.as_str()), Some("john_doe"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
pub mod worker;

// Re-export commonly used items at crate root
pub use config::{CacheConfig, ConfluxConfig, DispatcherConfig, QueueConfig};
pub use error::{ConfluxError, Result};
pub use traits::*;
pub use types::*;
pub use worker::{QueueWorker, WorkerState};
