//! Process identity types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Global process ID singleton - set once at startup
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Process identifier for any component in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// Coordinator process (singleton)
    Coordinator,
    /// Worker process with its coordinator-assigned number
    Worker(u32),
}

impl ProcessId {
    /// Initialize the global process ID for the coordinator
    pub fn init_coordinator() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Coordinator)
    }

    /// Initialize the global process ID for a worker with explicit ID
    pub fn init_worker(id: u32) -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Worker(id))
    }

    /// Get the global process ID.
    ///
    /// Falls back to `Coordinator` when no `init_*` call has happened yet,
    /// which is the case for library users and unit tests.
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Coordinator)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Coordinator => write!(f, "coordinator"),
            ProcessId::Worker(id) => write!(f, "worker_{id}"),
        }
    }
}

/// Identity of one spawned worker.
///
/// Assigned by the coordinator from a monotonic counter, so a respawned worker
/// never shares an identity with the one it replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(u32);

impl WorkerId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Process identity the worker logs under
    pub fn process_id(&self) -> ProcessId {
        ProcessId::Worker(self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker_{}", self.0)
    }
}
