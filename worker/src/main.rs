//! Metrics worker process
//!
//! Spawned by the coordinator. Requests arrive on stdin and replies leave on
//! stdout, one JSON record per line; logs go to stderr.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use provider::SysinfoProvider;
use shared::{logging, ProcessId};
use worker::WorkerRuntime;

#[derive(Parser, Debug)]
#[command(name = "worker")]
#[command(about = "Metrics worker serving system queries for the coordinator")]
struct Args {
    /// Worker identifier assigned by the coordinator
    #[arg(long)]
    id: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let process_id = ProcessId::init_worker(args.id);
    logging::init_tracing(Some(&args.log_level));
    logging::log_startup(process_id, &format!("metrics worker (PID {})", std::process::id()));

    let runtime = WorkerRuntime::new(args.id, Arc::new(SysinfoProvider::new()));
    if let Err(e) = runtime.run(tokio::io::stdin(), tokio::io::stdout()).await {
        logging::log_error(process_id, "Worker runtime", &e);
        return Err(e.into());
    }

    logging::log_shutdown(process_id, "control channel closed");
    Ok(())
}
