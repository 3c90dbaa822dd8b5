//! Domain types for Conflux.
//!
//! - [`Topic`]: closed enumeration of event topics
//! - [`Event`]: immutable envelope shared by every handler invocation

mod event;
mod topic;

pub use event::Event;
pub use topic::Topic;
