//! Error types for ashdb.

use thiserror::Error;

use crate::node_id::NodeId;

/// Result type alias using AshError.
pub type Result<T> = std::result::Result<T, AshError>;

/// Errors that can occur in ashdb operations.
#[derive(Debug, Error)]
pub enum AshError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Heap errors
    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: NodeId },

    #[error("Node id sequence exhausted")]
    NodeIdExhausted,

    #[error("Flush failed: {reason}")]
    FlushFailed { reason: String },

    // Argument errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AshError {
    /// Shorthand for an `InvalidArgument` error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        AshError::InvalidArgument(msg.into())
    }
}
