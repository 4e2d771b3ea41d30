//! Service implementations for the coordinator's outside collaborators

pub mod caller;
pub mod channel;
pub mod process_manager;

pub use caller::{ChannelReplySink, StdioCaller};
pub use channel::{ControlChannel, WorkerEvent};
pub use process_manager::RealWorkerSpawner;
