//! Coordinator ↔ Worker control channel records

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::caller::ReplyOutcome;

/// Request sent from the coordinator to a worker: `{id, type, arg}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: String,

    /// Operation wire name; the worker validates it again on receipt
    #[serde(rename = "type")]
    pub operation: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<Value>,
}

impl WorkerRequest {
    pub fn new(id: impl Into<String>, operation: impl Into<String>, arg: Option<Value>) -> Self {
        Self {
            id: id.into(),
            operation: operation.into(),
            arg,
        }
    }
}

/// Records sent from a worker to the coordinator.
///
/// Variant order matters for untagged decoding: `Ready` and `Failure` carry
/// fields that `Success` does not, so they are tried first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerMessage {
    /// Worker finished starting and is listening: `{ready, pid}`
    Ready { ready: u32, pid: u32 },

    /// Provider call failed: `{id, error}`
    Failure { id: String, error: String },

    /// Provider call succeeded: `{id, res}`
    Success { id: String, res: Value },
}

impl WorkerMessage {
    /// Build the reply record for a finished request
    pub fn reply(id: impl Into<String>, outcome: ReplyOutcome) -> Self {
        match outcome {
            ReplyOutcome::Res(res) => WorkerMessage::Success { id: id.into(), res },
            ReplyOutcome::Error(error) => WorkerMessage::Failure { id: id.into(), error },
        }
    }
}
