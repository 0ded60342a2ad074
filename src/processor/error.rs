//! Processor error types.

use thiserror::Error;

use crate::db::DbError;
use crate::source::SourceError;
use crate::types::range::RangeError;

/// Error returned by a user handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Handler '{handler_name}' failed: {message}")]
    HandlerError {
        handler_name: String,
        message: String,
    },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbError),
}

impl HandlerError {
    /// Create a handler error with context.
    pub fn handler(name: &str, message: impl Into<String>) -> Self {
        Self::HandlerError {
            handler_name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Rejected registration or processor setting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{kind} key must not be empty")]
    EmptyKey { kind: &'static str },

    #[error("Batch size must be greater than zero")]
    ZeroBatchSize,

    #[error(transparent)]
    Range(#[from] RangeError),
}

/// Failure inside a single block's transaction.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Handler '{handler}' failed: {source}")]
    Handler {
        handler: &'static str,
        #[source]
        source: HandlerError,
    },

    #[error("Commit failed: {0}")]
    Commit(#[from] DbError),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(
        "Ordering violation: block {height} delivered after block {last_block} was committed"
    )]
    OrderingViolation { height: u64, last_block: u64 },

    #[error("Block {height} ({hash}) failed: {source}")]
    Block {
        height: u64,
        hash: String,
        #[source]
        source: BlockError,
    },

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Store error: {0}")]
    Store(#[from] DbError),
}

impl ProcessorError {
    /// Height of the block whose transaction failed, if any.
    pub fn block_height(&self) -> Option<u64> {
        match self {
            ProcessorError::Block { height, .. } => Some(*height),
            _ => None,
        }
    }
}
