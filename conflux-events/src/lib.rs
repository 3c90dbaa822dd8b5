//! # Conflux Events
//!
//! In-process publish/subscribe for [`Event`](conflux_core::Event)s.
//!
//! - [`SubscriptionRegistry`]: topic → handler lists, safe to mutate while publishing
//! - [`WorkerPool`]: fixed set of named threads running handler invocations
//! - [`EventBus`]: fan-out of each event to its topic's subscribers, with failure isolation
//! - [`EventProcessor`]: ordered, non-blocking ingestion queue in front of the bus
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use conflux_core::{handler_fn, DispatcherConfig, Event, Topic};
//! use conflux_events::{EventBus, EventProcessor};
//!
//! let bus = Arc::new(EventBus::new(&DispatcherConfig::with_workers(2)).unwrap());
//! bus.subscribe(Topic::UserLogin, handler_fn("audit", |event| {
//!     println!("login from {}", event.source());
//!     Ok(())
//! }));
//!
//! let processor = EventProcessor::new(bus.clone());
//! processor.start().unwrap();
//! processor.submit(Event::new(Topic::UserLogin, "AuthService")).unwrap();
//!
//! assert!(processor.shutdown());
//! bus.shutdown();
//! assert!(bus.await_termination(Duration::from_secs(5)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod bus;
mod pool;
mod processor;
mod registry;

pub use bus::EventBus;
pub use pool::WorkerPool;
pub use processor::EventProcessor;
pub use registry::SubscriptionRegistry;
