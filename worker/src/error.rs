//! Worker error types

use shared::SharedError;
use thiserror::Error;

/// Result type for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Worker error types
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Control channel error: {message}")]
    ChannelError { message: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}
