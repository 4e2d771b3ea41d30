//! Real worker process management
//!
//! Spawns the `worker` binary as a child process with its stdin/stdout wired
//! to a control channel, reports each child's exit, and terminates stragglers
//! at shutdown.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::services::channel::{ControlChannel, WorkerEvent};
use crate::traits::{WorkerLink, WorkerSpawner};
use shared::{process_debug, process_error, process_info, process_warn, ProcessId, WorkerId};

/// Name of the worker executable expected next to the coordinator
pub const WORKER_BINARY: &str = "worker";

/// Live children by worker identity, holding their OS pids
type ChildTable = Arc<Mutex<HashMap<WorkerId, Option<u32>>>>;

/// Real process spawner implementation
pub struct RealWorkerSpawner {
    /// Path of the worker executable
    worker_bin: PathBuf,

    /// Log level to pass to spawned workers
    log_level: String,

    /// Workers whose process has not exited yet
    children: ChildTable,
}

impl RealWorkerSpawner {
    /// Spawner for the worker binary installed beside the current executable
    pub fn new() -> CoordinatorResult<Self> {
        let current = std::env::current_exe()?;
        let worker_bin = current.with_file_name(format!("{}{}", WORKER_BINARY, std::env::consts::EXE_SUFFIX));
        Ok(Self::with_worker_bin(worker_bin))
    }

    /// Spawner for an explicit worker executable
    pub fn with_worker_bin(worker_bin: impl Into<PathBuf>) -> Self {
        Self {
            worker_bin: worker_bin.into(),
            log_level: "info".to_string(),
            children: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Configure log level (fluent API)
    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }

    pub fn worker_bin(&self) -> &PathBuf {
        &self.worker_bin
    }

    /// Number of spawned workers that have not exited
    pub fn live_count(&self) -> usize {
        self.children.lock().map(|children| children.len()).unwrap_or(0)
    }

    fn live_pids(&self) -> Vec<(WorkerId, u32)> {
        match self.children.lock() {
            Ok(children) => children
                .iter()
                .filter_map(|(worker, pid)| pid.map(|pid| (*worker, pid)))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[cfg(unix)]
    fn terminate(worker: WorkerId, pid: u32) {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => process_warn!(ProcessId::current(), "⚠️ Sent SIGTERM to {} (PID {})", worker, pid),
            Err(Errno::ESRCH) => process_debug!(ProcessId::current(), "{} (PID {}) already gone", worker, pid),
            Err(e) => process_error!(ProcessId::current(), "❌ Failed to signal {} (PID {}): {}", worker, pid, e),
        }
    }

    #[cfg(not(unix))]
    fn terminate(worker: WorkerId, pid: u32) {
        process_warn!(ProcessId::current(), "⚠️ {} (PID {}) still running at shutdown", worker, pid);
    }
}

#[async_trait]
impl WorkerSpawner for RealWorkerSpawner {
    async fn spawn(&self, worker: WorkerId, events: mpsc::UnboundedSender<WorkerEvent>) -> CoordinatorResult<WorkerLink> {
        let mut cmd = Command::new(&self.worker_bin);
        cmd.arg("--id")
            .arg(worker.get().to_string())
            .arg("--log-level")
            .arg(&self.log_level);

        // stdout carries replies; stderr is shared so worker logs reach the terminal
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| CoordinatorError::spawn(worker, format!("{}: {e}", self.worker_bin.display())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CoordinatorError::spawn(worker, "stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoordinatorError::spawn(worker, "stdout not captured"))?;

        let pid = child.id();
        if let Ok(mut children) = self.children.lock() {
            children.insert(worker, pid);
        }

        let outbound = ControlChannel::attach(worker, stdout, stdin, events.clone());

        let children = Arc::clone(&self.children);
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    process_error!(ProcessId::current(), "❌ Waiting on {} failed: {}", worker, e);
                    None
                }
            };
            if let Ok(mut children) = children.lock() {
                children.remove(&worker);
            }
            let _ = events.send(WorkerEvent::Exited { worker, code });
        });

        process_debug!(
            ProcessId::current(),
            "🏭 Spawned {} (PID: {})",
            worker,
            pid.map(|pid| pid.to_string()).unwrap_or_else(|| "unknown".to_string())
        );
        Ok(WorkerLink { outbound, pid })
    }

    async fn shutdown(&self, grace: Duration) -> CoordinatorResult<()> {
        let deadline = tokio::time::Instant::now() + grace;
        while self.live_count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let stragglers = self.live_pids();
        for (worker, pid) in &stragglers {
            Self::terminate(*worker, *pid);
        }

        process_info!(
            ProcessId::current(),
            "🛑 Workers stopped ({} needed SIGTERM)",
            stragglers.len()
        );
        Ok(())
    }
}
