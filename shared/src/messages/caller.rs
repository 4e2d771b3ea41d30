//! Caller ↔ Coordinator requests and replies

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the per-request reply channel a caller listens on
pub fn reply_channel(id: &str) -> String {
    format!("reply-{id}")
}

/// One request line from a caller: `{id?, operation, args}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerRequest {
    /// Generated by the front-end when omitted
    #[serde(default)]
    pub id: Option<String>,

    pub operation: String,

    #[serde(default)]
    pub args: Vec<Value>,
}

/// Final result of a request as seen by its caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyOutcome {
    Res(Value),
    Error(String),
}

impl ReplyOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ReplyOutcome::Error(_))
    }
}

/// Reply delivered to the caller on channel `reply-<id>`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallerReply {
    pub channel: String,
    pub id: String,
    #[serde(flatten)]
    pub outcome: ReplyOutcome,
}

impl CallerReply {
    pub fn new(id: impl Into<String>, outcome: ReplyOutcome) -> Self {
        let id = id.into();
        Self {
            channel: reply_channel(&id),
            id,
            outcome,
        }
    }
}
