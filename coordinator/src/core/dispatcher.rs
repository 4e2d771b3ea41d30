//! Request validation, path selection and reply routing

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use provider::{validate_surface, MetricsProvider};
use serde_json::Value;
use shared::{
    process_debug, process_error, process_warn, validate_request_id, Operation, ProcessId, ReplyOutcome, WorkerId,
    WorkerRequest,
};

use super::pending::{deliver, PendingRequestTable, Resolution};
use super::pool::{WorkerHandle, WorkerPool};
use crate::config::{CoordinatorConfig, FailurePolicy, WORKER_HARD_CAP};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::traits::ReplySink;

/// A caller's request as it enters the coordinator
pub struct Submission {
    pub operation: String,
    pub id: String,
    pub args: Vec<Value>,
    pub caller: Weak<dyn ReplySink>,
}

impl Submission {
    pub fn new(
        operation: impl Into<String>,
        id: impl Into<String>,
        args: Vec<Value>,
        caller: Weak<dyn ReplySink>,
    ) -> Self {
        Self {
            operation: operation.into(),
            id: id.into(),
            args,
            caller,
        }
    }
}

/// Where an accepted submission went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Run in the coordinator process against the provider directly
    Inline,
    /// Offloaded to a worker and recorded as pending
    Worker(WorkerId),
}

/// Owns the pending table and the worker pool and moves requests between them
pub struct Dispatcher<P>
where
    P: MetricsProvider + 'static,
{
    provider: Arc<P>,
    pending: PendingRequestTable,
    pool: WorkerPool,
    failure_policy: FailurePolicy,
}

impl<P> Dispatcher<P>
where
    P: MetricsProvider + 'static,
{
    /// Fails if the provider does not implement every allow-listed operation
    pub fn new(provider: Arc<P>, config: &CoordinatorConfig) -> CoordinatorResult<Self> {
        validate_surface(provider.as_ref())?;

        Ok(Self {
            provider,
            pending: PendingRequestTable::new(config.pending_capacity),
            pool: WorkerPool::new(WORKER_HARD_CAP),
            failure_policy: config.failure_policy,
        })
    }

    /// Validate a submission and start it on the inline or worker path.
    ///
    /// Rejections are logged here and returned; the caller gets no reply for
    /// a rejected submission.
    pub fn submit(&mut self, submission: Submission) -> CoordinatorResult<Route> {
        let id = submission.id.clone();
        let routed = self.route(submission);
        if let Err(e) = &routed {
            process_warn!(ProcessId::current(), "⚠️ Request {:?} rejected: {}", id, e);
        }
        routed
    }

    fn route(&mut self, submission: Submission) -> CoordinatorResult<Route> {
        let Submission {
            operation,
            id,
            args,
            caller,
        } = submission;

        let operation: Operation = operation.parse()?;
        validate_request_id(&id)?;
        if self.pending.is_full() {
            return Err(CoordinatorError::PendingFull {
                capacity: self.pending.capacity(),
            });
        }

        if args.len() > 1 {
            self.run_inline(operation, id, args, caller);
            return Ok(Route::Inline);
        }

        if self.pending.contains(&id) {
            return Err(CoordinatorError::DuplicateRequest { id });
        }
        let worker = match self.pool.select() {
            Some(worker) => worker.clone(),
            None => {
                self.run_inline(operation, id, args, caller);
                return Ok(Route::Inline);
            }
        };

        self.pending.admit(&id, operation, worker.id(), caller)?;
        let request = WorkerRequest::new(id.clone(), operation.as_str(), args.into_iter().next());
        if let Err(e) = worker.send(request) {
            self.settle_failure(&id, e.to_string());
            return Err(e);
        }

        process_debug!(ProcessId::current(), "Request {} ({}) sent to {}", id, operation, worker.id());
        Ok(Route::Worker(worker.id()))
    }

    fn run_inline(&self, operation: Operation, id: String, args: Vec<Value>, caller: Weak<dyn ReplySink>) {
        let provider = Arc::clone(&self.provider);
        let failure_policy = self.failure_policy;
        process_debug!(ProcessId::current(), "Request {} ({}) running inline", id, operation);

        tokio::spawn(async move {
            let outcome = match provider.call(operation, args).await {
                Ok(res) => ReplyOutcome::Res(res),
                Err(e) => {
                    process_error!(ProcessId::current(), "❌ {} for request {} failed: {}", operation, id, e);
                    if failure_policy == FailurePolicy::Drop {
                        return;
                    }
                    ReplyOutcome::Error(e.to_string())
                }
            };
            deliver(&caller, &id, outcome);
        });
    }

    /// Route a worker's reply to the waiting caller
    pub fn on_reply(&mut self, id: &str, outcome: ReplyOutcome) -> Resolution {
        let resolution = match outcome {
            ReplyOutcome::Error(message) => {
                process_error!(ProcessId::current(), "❌ Request {} failed in worker: {}", id, message);
                self.settle_failure(id, message)
            }
            outcome => self.pending.resolve(id, outcome),
        };
        if resolution == Resolution::Unknown {
            process_debug!(ProcessId::current(), "Discarding reply for unknown request {}", id);
        }
        resolution
    }

    /// Settle a pending entry that will never get a result
    fn settle_failure(&mut self, id: &str, message: String) -> Resolution {
        match self.failure_policy {
            FailurePolicy::Reply => self.pending.resolve(id, ReplyOutcome::Error(message)),
            FailurePolicy::Drop => match self.pending.discard(id) {
                true => Resolution::Dropped,
                false => Resolution::Unknown,
            },
        }
    }

    pub fn add_worker(&mut self, handle: WorkerHandle) -> CoordinatorResult<()> {
        self.pool.register(handle)
    }

    /// Take a worker out of rotation and settle everything it still owed.
    ///
    /// Returns how many pending requests were settled.
    pub fn remove_worker(&mut self, worker: WorkerId, reason: &str) -> usize {
        if let Some(handle) = self.pool.deregister(worker) {
            process_debug!(ProcessId::current(), "{} (PID {:?}) left the pool", worker, handle.pid());
        }
        let orphaned = self.pending.ids_for_worker(worker);
        for id in &orphaned {
            self.settle_failure(id, format!("{worker} {reason}"));
        }
        orphaned.len()
    }

    /// Settle entries pending for at least `ttl`
    pub fn expire(&mut self, now: Instant, ttl: Duration) -> usize {
        let stale = self.pending.expired(now, ttl);
        for id in &stale {
            let operation = self.pending.operation(id).map(|op| op.as_str()).unwrap_or("request");
            process_warn!(ProcessId::current(), "⏱️ Request {} ({}) timed out after {:?}", id, operation, ttl);
            self.settle_failure(id, format!("timed out after {}s", ttl.as_secs_f64()));
        }
        stale.len()
    }

    /// Settle every pending entry with `reason`
    pub fn settle_all(&mut self, reason: &str) -> usize {
        let ids = self.pending.ids();
        for id in &ids {
            self.settle_failure(id, reason.to_string());
        }
        ids.len()
    }

    /// Drop every worker handle, closing their control channels
    pub fn clear_workers(&mut self) -> Vec<WorkerHandle> {
        self.pool.clear()
    }

    pub fn has_worker(&self, worker: WorkerId) -> bool {
        self.pool.contains(worker)
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.pool.ids()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
