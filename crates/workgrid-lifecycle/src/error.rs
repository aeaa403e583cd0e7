//! Lifecycle error types.

use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors raised by workload contexts and the context manager.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("workload already running: {0}")]
    AlreadyRunning(String),

    #[error("no context factory supports workload: {0}")]
    NoFactory(String),

    #[error("failed to create context for {urn}: {reason}")]
    CreateContext { urn: String, reason: String },
}
