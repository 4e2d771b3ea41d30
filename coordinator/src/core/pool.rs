//! Live worker membership and round-robin selection

use shared::{WorkerId, WorkerRequest};
use tokio::sync::mpsc;

use crate::error::{CoordinatorError, CoordinatorResult};

/// Coordinator-side handle for one ready worker
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    id: WorkerId,
    pid: Option<u32>,
    outbound: mpsc::UnboundedSender<WorkerRequest>,
}

impl WorkerHandle {
    pub fn new(id: WorkerId, pid: Option<u32>, outbound: mpsc::UnboundedSender<WorkerRequest>) -> Self {
        Self { id, pid, outbound }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Queue a request on the worker's control channel
    pub fn send(&self, request: WorkerRequest) -> CoordinatorResult<()> {
        self.outbound
            .send(request)
            .map_err(|_| CoordinatorError::WorkerUnavailable { worker: self.id })
    }
}

/// Ordered set of ready workers.
///
/// Selection walks the current membership with a cursor that only ever
/// advances, so N consecutive selections over N workers visit each once.
/// Membership may grow or shrink between selections.
#[derive(Debug)]
pub struct WorkerPool {
    members: Vec<WorkerHandle>,
    cursor: usize,
    hard_cap: usize,
}

impl WorkerPool {
    pub fn new(hard_cap: usize) -> Self {
        Self {
            members: Vec::with_capacity(hard_cap),
            cursor: 0,
            hard_cap,
        }
    }

    pub fn register(&mut self, handle: WorkerHandle) -> CoordinatorResult<()> {
        if self.members.iter().any(|member| member.id == handle.id) {
            return Err(CoordinatorError::DuplicateWorker { worker: handle.id });
        }
        if self.members.len() >= self.hard_cap {
            return Err(CoordinatorError::PoolFull {
                capacity: self.hard_cap,
            });
        }
        self.members.push(handle);
        Ok(())
    }

    pub fn deregister(&mut self, id: WorkerId) -> Option<WorkerHandle> {
        let index = self.members.iter().position(|member| member.id == id)?;
        Some(self.members.remove(index))
    }

    /// Next worker in rotation, or `None` while the pool is empty
    pub fn select(&mut self) -> Option<&WorkerHandle> {
        if self.members.is_empty() {
            return None;
        }
        let index = self.cursor % self.members.len();
        self.cursor = self.cursor.wrapping_add(1);
        self.members.get(index)
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: WorkerId) -> bool {
        self.members.iter().any(|member| member.id == id)
    }

    pub fn ids(&self) -> Vec<WorkerId> {
        self.members.iter().map(WorkerHandle::id).collect()
    }

    /// Remove every member, closing their control channels once dropped
    pub fn clear(&mut self) -> Vec<WorkerHandle> {
        self.members.drain(..).collect()
    }
}
