//! Coordinator event loop
//!
//! A single task owns the dispatcher (and through it the pending table and
//! worker pool). Caller submissions, worker events and the expiry timer are
//! multiplexed onto that task, so none of the routing state is shared.

use std::collections::HashMap;
use std::sync::Arc;

use provider::MetricsProvider;
use shared::{
    logging, process_debug, process_error, process_info, process_warn, ProcessId, ReplyOutcome, WorkerId,
    WorkerMessage,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::CoordinatorConfig;
use crate::core::{Dispatcher, Submission, WorkerHandle};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::services::channel::WorkerEvent;
use crate::traits::{WorkerLink, WorkerSpawner};

/// Snapshot of coordinator state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorStatus {
    /// Ready workers in rotation order
    pub workers: Vec<WorkerId>,
    /// Workers spawned but not yet ready
    pub starting: usize,
    pub pending: usize,
    pub restarts: u32,
}

enum Command {
    Submit(Submission),
    Status(oneshot::Sender<CoordinatorStatus>),
    Shutdown,
}

/// Cloneable handle for talking to a running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// Queue a submission; its reply, if any, arrives on the caller's sink
    pub fn submit(&self, submission: Submission) -> CoordinatorResult<()> {
        self.commands
            .send(Command::Submit(submission))
            .map_err(|_| CoordinatorError::channel("submission after shutdown"))
    }

    pub async fn status(&self) -> CoordinatorResult<CoordinatorStatus> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Status(tx))
            .map_err(|_| CoordinatorError::channel("status after shutdown"))?;
        rx.await
            .map_err(|_| CoordinatorError::channel("coordinator stopped before answering"))
    }

    /// Ask the event loop to stop
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Resolves once the event loop has stopped
    pub async fn closed(&self) {
        self.commands.closed().await
    }
}

/// Owns the worker processes and routes every request and reply
pub struct Coordinator<P, S>
where
    P: MetricsProvider + 'static,
    S: WorkerSpawner + 'static,
{
    config: CoordinatorConfig,
    dispatcher: Dispatcher<P>,
    spawner: S,

    /// Spawned workers waiting for their ready record
    starting: HashMap<WorkerId, WorkerLink>,
    next_worker: u32,
    restarts: u32,

    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<WorkerEvent>>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: Option<mpsc::UnboundedReceiver<Command>>,
}

impl<P, S> Coordinator<P, S>
where
    P: MetricsProvider + 'static,
    S: WorkerSpawner + 'static,
{
    /// Fails if the provider does not cover the operation allow-list
    pub fn new(config: CoordinatorConfig, provider: P, spawner: S) -> CoordinatorResult<Self> {
        let dispatcher = Dispatcher::new(Arc::new(provider), &config)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            dispatcher,
            spawner,
            starting: HashMap::new(),
            next_worker: 0,
            restarts: 0,
            events_tx,
            events_rx: Some(events_rx),
            commands_tx,
            commands_rx: Some(commands_rx),
        })
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            commands: self.commands_tx.clone(),
        }
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            workers: self.dispatcher.worker_ids(),
            starting: self.starting.len(),
            pending: self.dispatcher.pending_len(),
            restarts: self.restarts,
        }
    }

    /// Spawn the worker pool and serve until shutdown is requested
    pub async fn run(&mut self) -> CoordinatorResult<()> {
        let mut events = self
            .events_rx
            .take()
            .ok_or_else(|| CoordinatorError::channel("event loop already ran"))?;
        let mut commands = self
            .commands_rx
            .take()
            .ok_or_else(|| CoordinatorError::channel("event loop already ran"))?;

        process_info!(
            ProcessId::current(),
            "🚀 Starting {} workers (pending capacity {}, failure policy {:?})",
            self.config.worker_count,
            self.config.pending_capacity,
            self.config.failure_policy
        );
        for _ in 0..self.config.worker_count {
            self.spawn_worker().await;
        }

        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let expiry_enabled = self.config.pending_ttl.is_some();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Submit(submission)) => {
                        let _ = self.dispatcher.submit(submission);
                    }
                    Some(Command::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(Command::Shutdown) | None => break,
                },

                Some(event) = events.recv() => self.handle_event(event).await,

                _ = sweep.tick(), if expiry_enabled => self.expire_pending(),
            }
        }

        drop(commands);
        self.shutdown().await
    }

    async fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Message { worker, message } => match message {
                WorkerMessage::Ready { ready, pid } => self.on_ready(worker, ready, pid),
                WorkerMessage::Success { id, res } => {
                    self.dispatcher.on_reply(&id, ReplyOutcome::Res(res));
                }
                WorkerMessage::Failure { id, error } => {
                    self.dispatcher.on_reply(&id, ReplyOutcome::Error(error));
                }
            },
            WorkerEvent::Closed { worker } => {
                self.on_worker_lost(worker, "closed its control channel").await;
            }
            WorkerEvent::Exited { worker, code } => {
                let reason = match code {
                    Some(code) => format!("exited with status {code}"),
                    None => "was terminated by a signal".to_string(),
                };
                self.on_worker_lost(worker, &reason).await;
            }
        }
    }

    fn on_ready(&mut self, worker: WorkerId, announced: u32, pid: u32) {
        let Some(link) = self.starting.remove(&worker) else {
            process_warn!(ProcessId::current(), "⚠️ Unexpected ready record from {}", worker);
            return;
        };
        if announced != worker.get() {
            process_warn!(ProcessId::current(), "⚠️ {} announced itself as worker_{}", worker, announced);
        }

        match self.dispatcher.add_worker(WorkerHandle::new(worker, Some(pid), link.outbound)) {
            Ok(()) => process_info!(
                ProcessId::current(),
                "✅ {} ready (PID {}), pool size {}",
                worker,
                pid,
                self.dispatcher.pool_size()
            ),
            Err(e) => process_error!(ProcessId::current(), "❌ Could not add {} to the pool: {}", worker, e),
        }
    }

    /// Forget a worker after it closed its channel or exited.
    ///
    /// Both events arrive for a real process; only the first one counts.
    async fn on_worker_lost(&mut self, worker: WorkerId, reason: &str) {
        let was_starting = self.starting.remove(&worker).is_some();
        if !was_starting && !self.dispatcher.has_worker(worker) {
            process_debug!(ProcessId::current(), "{} {} (already removed)", worker, reason);
            return;
        }

        let settled = self.dispatcher.remove_worker(worker, reason);
        process_warn!(
            ProcessId::current(),
            "⚠️ {} {}; {} in-flight requests settled, pool size {}",
            worker,
            reason,
            settled,
            self.dispatcher.pool_size()
        );
        self.replace_worker().await;
    }

    async fn replace_worker(&mut self) {
        if !self.config.respawn {
            return;
        }
        if self.dispatcher.pool_size() + self.starting.len() >= self.config.worker_count {
            return;
        }
        if self.restarts >= self.config.max_restarts {
            process_warn!(
                ProcessId::current(),
                "⚠️ Restart budget of {} spent, continuing with {} workers",
                self.config.max_restarts,
                self.dispatcher.pool_size()
            );
            return;
        }

        self.restarts += 1;
        self.spawn_worker().await;
    }

    async fn spawn_worker(&mut self) {
        let worker = WorkerId::new(self.next_worker);
        self.next_worker += 1;

        match self.spawner.spawn(worker, self.events_tx.clone()).await {
            Ok(link) => {
                self.starting.insert(worker, link);
            }
            Err(e) => process_error!(ProcessId::current(), "❌ Failed to spawn {}: {}", worker, e),
        }
    }

    fn expire_pending(&mut self) {
        if let Some(ttl) = self.config.pending_ttl {
            let expired = self.dispatcher.expire(Instant::now().into_std(), ttl);
            if expired > 0 {
                process_warn!(ProcessId::current(), "⏱️ Expired {} pending requests", expired);
            }
        }
    }

    async fn shutdown(&mut self) -> CoordinatorResult<()> {
        let settled = self.dispatcher.settle_all("coordinator shutting down");
        let workers = self.dispatcher.clear_workers().len() + self.starting.len();
        self.starting.clear();
        process_info!(
            ProcessId::current(),
            "🛑 Stopping {} workers ({} pending requests settled)",
            workers,
            settled
        );

        self.spawner.shutdown(self.config.shutdown_grace).await?;
        logging::log_shutdown(ProcessId::current(), "event loop stopped");
        Ok(())
    }
}
