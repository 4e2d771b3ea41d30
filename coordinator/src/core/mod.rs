//! Coordinator-owned routing state

pub mod dispatcher;
pub mod pending;
pub mod pool;

pub use dispatcher::{Dispatcher, Route, Submission};
pub use pending::{PendingRequestTable, Resolution};
pub use pool::{WorkerHandle, WorkerPool};
