//! Core error types.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building or loading core types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
