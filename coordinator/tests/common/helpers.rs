//! Test helpers: a scripted metrics provider, an in-process worker spawner and
//! a harness that runs a coordinator against them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coordinator::services::{ChannelReplySink, ControlChannel, WorkerEvent};
use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorResult, CoordinatorStatus, ReplySink, Submission,
    WorkerLink, WorkerSpawner,
};
use provider::{MetricsProvider, ProviderError, ProviderResult};
use serde_json::{json, Value};
use shared::{CallerReply, Operation, WorkerId};
use tokio::io::duplex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use worker::WorkerRuntime;

use super::fixtures::TestFixtures;

/// Behaviour shared by every `FakeProvider` of one test
#[derive(Clone, Default)]
pub struct ProviderPlan {
    /// When set, every call waits for a permit before answering
    pub gate: Option<Arc<Semaphore>>,
    /// Operations that fail
    pub failing: Vec<Operation>,
    /// Calls made across all providers
    pub calls: Arc<AtomicUsize>,
}

impl ProviderPlan {
    /// Calls block until `open_gate` is called
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn failing(operations: Vec<Operation>) -> Self {
        Self {
            failing: operations,
            ..Self::default()
        }
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Provider that answers with where it ran: `{operation, worker, args}`
pub struct FakeProvider {
    /// `None` for the coordinator's inline provider
    worker: Option<u32>,
    plan: ProviderPlan,
}

impl FakeProvider {
    pub fn new(worker: Option<u32>, plan: ProviderPlan) -> Self {
        Self { worker, plan }
    }
}

#[async_trait]
impl MetricsProvider for FakeProvider {
    fn operations(&self) -> Vec<Operation> {
        Operation::ALL.to_vec()
    }

    async fn call(&self, operation: Operation, args: Vec<Value>) -> ProviderResult<Value> {
        self.plan.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.plan.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| ProviderError::collection(operation, "gate closed"))?;
        }
        if self.plan.failing.contains(&operation) {
            return Err(ProviderError::collection(operation, "sensor unavailable"));
        }

        Ok(json!({
            "operation": operation.as_str(),
            "worker": self.worker,
            "args": args,
        }))
    }
}

/// Spawner that runs each worker as a task over in-memory pipes
#[derive(Clone)]
pub struct InMemorySpawner {
    plan: ProviderPlan,
    workers: Arc<Mutex<HashMap<WorkerId, JoinHandle<()>>>>,
}

impl InMemorySpawner {
    pub fn new(plan: ProviderPlan) -> Self {
        Self {
            plan,
            workers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Abort a worker as if its process crashed
    pub fn kill(&self, worker: WorkerId) -> bool {
        match self.workers.lock().unwrap().remove(&worker) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl WorkerSpawner for InMemorySpawner {
    async fn spawn(&self, worker: WorkerId, events: mpsc::UnboundedSender<WorkerEvent>) -> CoordinatorResult<WorkerLink> {
        let (coordinator_out, worker_in) = duplex(64 * 1024);
        let (worker_out, coordinator_in) = duplex(64 * 1024);

        let provider = FakeProvider::new(Some(worker.get()), self.plan.clone());
        let runtime = WorkerRuntime::new(worker.get(), Arc::new(provider));
        let exit_events = events.clone();
        let task = tokio::spawn(async move {
            let code = match runtime.run(worker_in, worker_out).await {
                Ok(()) => 0,
                Err(_) => 1,
            };
            let _ = exit_events.send(WorkerEvent::Exited {
                worker,
                code: Some(code),
            });
        });
        self.workers.lock().unwrap().insert(worker, task);

        let outbound = ControlChannel::attach(worker, coordinator_in, coordinator_out, events);
        Ok(WorkerLink { outbound, pid: None })
    }

    async fn shutdown(&self, grace: Duration) -> CoordinatorResult<()> {
        let tasks: Vec<JoinHandle<()>> = self.workers.lock().unwrap().drain().map(|(_, task)| task).collect();
        for task in tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(grace, task).await.is_err() {
                abort.abort();
            }
        }
        Ok(())
    }
}

/// A running coordinator wired to in-memory workers and one caller sink
pub struct TestCoordinator {
    pub handle: CoordinatorHandle,
    pub spawner: InMemorySpawner,
    pub plan: ProviderPlan,
    sink: Arc<dyn ReplySink>,
    replies: mpsc::UnboundedReceiver<CallerReply>,
    running: JoinHandle<CoordinatorResult<()>>,
}

impl TestCoordinator {
    /// Start a coordinator and wait until all its workers are ready
    pub async fn start(config: CoordinatorConfig, plan: ProviderPlan) -> Self {
        let expected = config.worker_count;
        let spawner = InMemorySpawner::new(plan.clone());
        let mut coordinator =
            Coordinator::new(config, FakeProvider::new(None, plan.clone()), spawner.clone()).unwrap();
        let handle = coordinator.handle();
        let running = tokio::spawn(async move { coordinator.run().await });

        let (sink, replies) = ChannelReplySink::new();
        let harness = Self {
            handle,
            spawner,
            plan,
            sink,
            replies,
            running,
        };
        harness.wait_for(|status| status.workers.len() == expected).await;
        harness
    }

    pub fn submit(&self, operation: &str, id: &str, args: Vec<Value>) {
        self.handle
            .submit(Submission::new(operation, id, args, Arc::downgrade(&self.sink)))
            .unwrap();
    }

    pub async fn next_reply(&mut self) -> CallerReply {
        tokio::time::timeout(TestFixtures::WAIT, self.replies.recv())
            .await
            .expect("timed out waiting for a reply")
            .expect("reply channel closed")
    }

    /// Collect `n` replies keyed by id
    pub async fn replies(&mut self, n: usize) -> HashMap<String, CallerReply> {
        let mut replies = HashMap::new();
        for _ in 0..n {
            let reply = self.next_reply().await;
            assert!(
                replies.insert(reply.id.clone(), reply).is_none(),
                "duplicate reply delivered"
            );
        }
        replies
    }

    pub async fn assert_quiet(&mut self) {
        if let Ok(Some(reply)) = tokio::time::timeout(TestFixtures::QUIET, self.replies.recv()).await {
            panic!("unexpected reply {:?}", reply);
        }
    }

    pub async fn status(&self) -> CoordinatorStatus {
        self.handle.status().await.unwrap()
    }

    /// Poll status until `predicate` holds
    pub async fn wait_for<F>(&self, predicate: F) -> CoordinatorStatus
    where
        F: Fn(&CoordinatorStatus) -> bool,
    {
        let deadline = tokio::time::Instant::now() + TestFixtures::WAIT;
        loop {
            let status = self.status().await;
            if predicate(&status) {
                return status;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition never held, last status {:?}",
                status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Shut down and return replies delivered during shutdown
    pub async fn stop(mut self) -> Vec<CallerReply> {
        self.handle.shutdown();
        self.running.await.unwrap().unwrap();

        let mut late = Vec::new();
        while let Ok(reply) = self.replies.try_recv() {
            late.push(reply);
        }
        late
    }
}
