//! Trait definitions with mockall annotations for testing
//!
//! The coordinator reaches its two outside collaborators through these
//! traits: the caller that receives replies, and whatever starts worker
//! processes.

use std::time::Duration;

use shared::{CallerReply, WorkerId, WorkerRequest};
use tokio::sync::mpsc;

use crate::error::CoordinatorResult;
use crate::services::channel::WorkerEvent;

/// Outbound half of a freshly spawned worker's control channel
#[derive(Debug)]
pub struct WorkerLink {
    pub outbound: mpsc::UnboundedSender<WorkerRequest>,
    /// OS process id when the worker is a real process
    pub pid: Option<u32>,
}

/// Destination for replies addressed to one caller.
///
/// The coordinator only ever holds a `Weak` reference to a sink, so a caller
/// that goes away simply stops receiving replies.
#[mockall::automock]
pub trait ReplySink: Send + Sync {
    /// True once the caller can no longer accept replies
    fn is_detached(&self) -> bool;

    /// Hand a finished reply to the caller
    fn deliver(&self, reply: CallerReply);
}

/// Worker process lifecycle abstraction
///
/// Spawned workers report everything they send, and their eventual exit, as
/// `WorkerEvent`s on the supplied sender.
#[mockall::automock]
#[async_trait::async_trait]
pub trait WorkerSpawner: Send + Sync {
    /// Start one worker and attach its control channel
    ///
    /// # Parameters
    /// - `worker`: Identity assigned by the coordinator
    /// - `events`: Sender for the worker's messages and lifecycle events
    async fn spawn(
        &self,
        worker: WorkerId,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> CoordinatorResult<WorkerLink>;

    /// Wait up to `grace` for spawned workers to exit, then stop the rest
    async fn shutdown(&self, grace: Duration) -> CoordinatorResult<()>;
}
