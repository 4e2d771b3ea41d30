//! Provider error types

use shared::Operation;
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Provider error types
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Operation {operation} is not supported on this platform")]
    Unsupported { operation: Operation },

    #[error("Invalid argument for {operation}: {message}")]
    InvalidArgument { operation: Operation, message: String },

    #[error("Collecting {operation} failed: {message}")]
    Collection { operation: Operation, message: String },

    #[error("Provider surface is missing allow-listed operations: {missing:?}")]
    MissingOperations { missing: Vec<Operation> },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

impl ProviderError {
    pub fn invalid_argument(operation: Operation, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation,
            message: message.into(),
        }
    }

    pub fn collection(operation: Operation, message: impl Into<String>) -> Self {
        Self::Collection {
            operation,
            message: message.into(),
        }
    }
}
