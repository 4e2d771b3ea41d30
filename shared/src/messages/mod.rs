//! Message types for the metrics dispatch system
//!
//! This module organizes all inter-process communication messages by category:
//! - `worker`: Coordinator ↔ Worker control channel records
//! - `caller`: Caller ↔ Coordinator requests and replies

pub mod caller;
pub mod worker;

pub use caller::{reply_channel, CallerReply, CallerRequest, ReplyOutcome};
pub use worker::{WorkerMessage, WorkerRequest};
