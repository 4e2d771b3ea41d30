//! Coordinator library for dispatching system-metric queries to worker processes
//!
//! The coordinator owns a bounded table of pending requests and a pool of
//! worker processes. Requests are validated, routed round-robin to a worker
//! (or run inline when that is cheaper) and every result is routed back to
//! the caller that asked for it.

pub mod config;
pub mod coordinator;
pub mod core;
pub mod error;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use config::{CoordinatorConfig, FailurePolicy};
pub use coordinator::{Coordinator, CoordinatorHandle, CoordinatorStatus};
pub use crate::core::{Dispatcher, PendingRequestTable, Resolution, Route, Submission, WorkerHandle, WorkerPool};
pub use error::{CoordinatorError, CoordinatorResult};
pub use traits::{ReplySink, WorkerLink, WorkerSpawner};
