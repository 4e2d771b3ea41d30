//! Shared types for the metrics dispatch system
//!
//! Contains only the types that cross a process boundary (coordinator ↔ worker,
//! coordinator ↔ caller) plus the logging setup every binary uses.

pub mod codec;
pub mod errors;
pub mod logging;
pub mod messages;
pub mod operations;
pub mod types;

pub use errors::*;
pub use operations::{validate_request_id, Operation, MAX_REQUEST_ID_LEN};
pub use types::*;

// Re-export inter-process communication messages
pub use messages::{
    // Coordinator ↔ Worker communication
    WorkerMessage, WorkerRequest,

    // Caller ↔ Coordinator communication
    reply_channel, CallerReply, CallerRequest, ReplyOutcome,
};
