//! Cluster error types.

use thiserror::Error;

/// Result type alias for dispatch and transport operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Result type alias for executing an instruction on a node.
pub type InstructionResult<T> = Result<T, InstructionError>;

/// Errors raised while a node executes an instruction.
#[derive(Debug, Error)]
pub enum InstructionError {
    #[error("unknown instruction kind: {0}")]
    UnknownKind(String),

    #[error("expected instruction kind {expected}, got {actual}")]
    KindMismatch { expected: String, actual: String },

    #[error("unsupported action for workload {0}")]
    UnsupportedAction(String),

    #[error("instruction codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Errors raised by the dispatch layer and transports.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("unknown cluster member: {0}")]
    UnknownMember(String),

    #[error("instruction failed: {0}")]
    Instruction(#[from] InstructionError),

    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}
