//! Shared error types for the metrics dispatch system

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },

    #[error("Message too large: {size} bytes (limit {limit})")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Unknown operation: {name}")]
    UnknownOperation { name: String },

    #[error("Invalid request id: {reason}")]
    InvalidRequestId { reason: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
