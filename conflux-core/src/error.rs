//! Error types for Conflux.
//!
//! Absence is never an error here: a missing cache key or a topic without
//! subscribers is reported through `Option` or a zero count. The variants
//! below cover misconfiguration and lifecycle misuse only.

use thiserror::Error;

/// Result type alias using `ConfluxError`.
pub type Result<T> = std::result::Result<T, ConfluxError>;

/// Main error type for all Conflux operations.
#[derive(Debug, Error)]
pub enum ConfluxError {
    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIGURATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// A configuration value is out of range or unparseable.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A topic name does not belong to the closed topic set.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// `start` was called on a component that is already running or stopped.
    #[error("{0} has already been started")]
    AlreadyStarted(String),

    /// Work was submitted to a background worker after it was asked to stop.
    #[error("{0} is stopped and no longer accepts work")]
    WorkerStopped(String),

    /// An event was published after the dispatcher was shut down.
    #[error("Dispatcher is shut down")]
    DispatcherShutdown,

    // ═══════════════════════════════════════════════════════════════════════════
    // SYSTEM ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// Spawning a background thread or writing output failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ConfluxError {
    /// Returns true if this error comes from calling a component in the wrong lifecycle state.
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            ConfluxError::AlreadyStarted(_)
                | ConfluxError::WorkerStopped(_)
                | ConfluxError::DispatcherShutdown
        )
    }

    /// Returns true if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ConfluxError::ConfigError(_) | ConfluxError::UnknownTopic(_)
        )
    }
}
