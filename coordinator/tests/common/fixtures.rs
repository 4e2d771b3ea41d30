//! Test fixtures and configuration used across the coordinator suites

use std::time::Duration;

use coordinator::CoordinatorConfig;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    /// Upper bound for anything a test waits on
    pub const WAIT: Duration = Duration::from_secs(5);

    /// How long a test watches for a reply that must not arrive
    pub const QUIET: Duration = Duration::from_millis(200);

    pub const CAPACITY: usize = 100;

    /// Configuration with fast timers and an explicit worker count
    pub fn config(workers: usize) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_worker_count(workers)
            .with_sweep_interval(Duration::from_millis(20))
            .with_shutdown_grace(Duration::from_millis(100))
    }

    /// Caller lines for the stdio front-end, including one malformed line and
    /// one request for an operation outside the allow-list
    pub fn caller_lines() -> &'static str {
        concat!(
            "{\"id\":\"a1\",\"operation\":\"mem\"}\n",
            "{\"operation\":\"time\",\"args\":[]}\n",
            "this is not a request\n",
            "\n",
            "{\"id\":\"x1\",\"operation\":\"rmrf\"}\n",
        )
    }
}
