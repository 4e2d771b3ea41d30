//! Coordinator configuration

use std::time::Duration;

/// Ceiling on concurrently pending offloaded requests
pub const DEFAULT_PENDING_CAPACITY: usize = 100;

/// Upper bound on the worker pool regardless of core count
pub const WORKER_HARD_CAP: usize = 7;

/// Age after which an unanswered pending request is settled as timed out
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(30);

/// Replacement workers spawned over the coordinator's lifetime
pub const DEFAULT_MAX_RESTARTS: u32 = 16;

/// Time workers get to exit on their own before SIGTERM
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Worker count for a machine with `cores` logical cores.
///
/// One core is left to the coordinator and its caller.
pub fn worker_count_for(cores: usize) -> usize {
    cores.saturating_sub(1).min(WORKER_HARD_CAP)
}

/// Worker count derived from the cores this process may use
pub fn detected_worker_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    worker_count_for(cores)
}

/// What callers see when a request fails after admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FailurePolicy {
    /// Deliver an `{error}` reply
    #[default]
    Reply,
    /// Remove the pending entry without replying
    Drop,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub pending_capacity: usize,
    pub worker_count: usize,
    pub failure_policy: FailurePolicy,
    /// `None` disables expiry
    pub pending_ttl: Option<Duration>,
    pub sweep_interval: Duration,
    pub respawn: bool,
    pub max_restarts: u32,
    pub shutdown_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            pending_capacity: DEFAULT_PENDING_CAPACITY,
            worker_count: detected_worker_count(),
            failure_policy: FailurePolicy::default(),
            pending_ttl: Some(DEFAULT_PENDING_TTL),
            sweep_interval: Duration::from_secs(1),
            respawn: true,
            max_restarts: DEFAULT_MAX_RESTARTS,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure pending table capacity (fluent API)
    pub fn with_pending_capacity(mut self, capacity: usize) -> Self {
        self.pending_capacity = capacity;
        self
    }

    /// Configure worker count, clamped to the hard cap (fluent API)
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.min(WORKER_HARD_CAP);
        self
    }

    /// Configure failure policy (fluent API)
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Configure pending entry expiry (fluent API)
    pub fn with_pending_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.pending_ttl = ttl;
        self
    }

    /// Configure how often expiry runs (fluent API)
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Configure worker respawn (fluent API)
    pub fn with_respawn(mut self, respawn: bool) -> Self {
        self.respawn = respawn;
        self
    }

    /// Configure respawn budget (fluent API)
    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Configure shutdown grace period (fluent API)
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}
