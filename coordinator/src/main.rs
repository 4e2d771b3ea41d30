//! Main entry point for the coordinator binary
//!
//! Caller requests are read from stdin and replies written to stdout, one JSON
//! record per line. Logs go to stderr.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal;

use coordinator::services::{RealWorkerSpawner, StdioCaller};
use coordinator::{Coordinator, CoordinatorConfig, FailurePolicy};
use provider::SysinfoProvider;
use shared::{logging, process_debug, process_info, ProcessId};

/// Coordinator dispatching system-metric queries to worker processes
#[derive(Parser, Debug)]
#[command(name = "coordinator")]
#[command(about = "Dispatches system-metric queries to a pool of worker processes")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Worker executable (defaults to `worker` next to this binary)
    #[arg(long)]
    pub worker_bin: Option<PathBuf>,

    /// Whether failed requests are answered with an error or left unanswered
    #[arg(long, value_enum, default_value_t = FailurePolicy::Reply)]
    pub failure_policy: FailurePolicy,

    /// Seconds before an unanswered request is timed out (0 disables)
    #[arg(long, default_value_t = 30)]
    pub pending_ttl_secs: u64,

    /// Do not replace workers that exit
    #[arg(long)]
    pub no_respawn: bool,

    /// Seconds to wait for outstanding replies after stdin closes
    #[arg(long, default_value_t = 5)]
    pub drain_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let process_id = ProcessId::init_coordinator();
    logging::init_tracing(Some(&args.log_level));
    logging::log_startup(process_id, &format!("metrics coordinator (PID {})", std::process::id()));

    let pending_ttl = (args.pending_ttl_secs > 0).then(|| Duration::from_secs(args.pending_ttl_secs));
    let config = CoordinatorConfig::default()
        .with_failure_policy(args.failure_policy)
        .with_pending_ttl(pending_ttl)
        .with_respawn(!args.no_respawn);
    process_debug!(process_id, "Configuration: {:?}", config);

    let spawner = match args.worker_bin {
        Some(path) => RealWorkerSpawner::with_worker_bin(path),
        None => RealWorkerSpawner::new()?,
    }
    .with_log_level(args.log_level.clone());
    process_debug!(process_id, "Worker binary: {}", spawner.worker_bin().display());

    let mut coordinator = Coordinator::new(config, SysinfoProvider::new(), spawner)?;
    let handle = coordinator.handle();
    let running = tokio::spawn(async move { coordinator.run().await });

    // Set up graceful shutdown
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal");
                signal_handle.shutdown();
            }
            Err(err) => {
                logging::log_error(ProcessId::current(), "Signal handling", &err);
            }
        }
    });

    let caller = StdioCaller::new(handle.clone()).with_drain_timeout(Duration::from_secs(args.drain_timeout_secs));
    let summary = caller.run(tokio::io::stdin(), tokio::io::stdout()).await?;
    process_info!(
        process_id,
        "📊 Session: {} submitted, {} replied, {} malformed, {} rejected, {} unanswered",
        summary.submitted,
        summary.replied,
        summary.malformed,
        summary.rejected,
        summary.unanswered
    );

    handle.shutdown();
    running.await??;

    logging::log_success(process_id, "Coordinator stopped gracefully");

    // The stdin reader can still be parked in a blocking read after Ctrl+C
    std::process::exit(0);
}
