//! Worker library for the metrics dispatch system
//!
//! A worker is a child process of the coordinator. It reads requests from its
//! control channel, runs them against a `MetricsProvider` and writes the
//! correlated results back.

pub mod error;
pub mod runtime;

pub use error::{WorkerError, WorkerResult};
pub use runtime::WorkerRuntime;
