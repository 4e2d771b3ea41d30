//! Coordinator-specific error types

use provider::ProviderError;
use shared::{SharedError, WorkerId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Failed to spawn {worker}: {message}")]
    SpawnFailed { worker: WorkerId, message: String },

    #[error("Pending request table is full ({capacity} entries)")]
    PendingFull { capacity: usize },

    #[error("Request id already pending: {id}")]
    DuplicateRequest { id: String },

    #[error("Worker pool is full ({capacity} workers)")]
    PoolFull { capacity: usize },

    #[error("Worker already registered: {worker}")]
    DuplicateWorker { worker: WorkerId },

    #[error("Control channel to {worker} is closed")]
    WorkerUnavailable { worker: WorkerId },

    #[error("Coordinator is not running: {message}")]
    ChannelClosed { message: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("Metrics provider error: {0}")]
    ProviderError(#[from] ProviderError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoordinatorError {
    pub fn spawn(worker: WorkerId, message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            worker,
            message: message.into(),
        }
    }

    pub fn channel(message: impl Into<String>) -> Self {
        Self::ChannelClosed {
            message: message.into(),
        }
    }

    /// Validation rejections are expected traffic, everything else is a fault
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::PendingFull { .. }
                | Self::DuplicateRequest { .. }
                | Self::SharedError(SharedError::UnknownOperation { .. })
                | Self::SharedError(SharedError::InvalidRequestId { .. })
        )
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
