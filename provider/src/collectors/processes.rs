//! Process list with state counts

use serde::Serialize;
use serde_json::Value;
use sysinfo::ProcessStatus;

use super::to_value;
use crate::error::ProviderResult;
use crate::sysinfo_provider::Sampler;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessEntry {
    pid: u32,
    parent_pid: Option<u32>,
    name: String,
    cpu: f32,
    mem_rss: u64,
    state: String,
    started: u64,
    command: String,
}

#[derive(Debug, Serialize)]
struct ProcessSummary {
    all: usize,
    running: usize,
    sleeping: usize,
    blocked: usize,
    list: Vec<ProcessEntry>,
}

pub fn processes(sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    sampler.system.refresh_processes();

    let mut running = 0;
    let mut sleeping = 0;
    let mut blocked = 0;
    let mut list = Vec::with_capacity(sampler.system.processes().len());

    for (pid, process) in sampler.system.processes() {
        let status = process.status();
        match status {
            ProcessStatus::Run => running += 1,
            ProcessStatus::Sleep | ProcessStatus::Idle => sleeping += 1,
            ProcessStatus::UninterruptibleDiskSleep | ProcessStatus::LockBlocked => blocked += 1,
            _ => {}
        }

        list.push(ProcessEntry {
            pid: pid.as_u32(),
            parent_pid: process.parent().map(|p| p.as_u32()),
            name: process.name().to_string(),
            cpu: process.cpu_usage(),
            mem_rss: process.memory(),
            state: status.to_string(),
            started: process.start_time(),
            command: process.cmd().join(" "),
        });
    }
    list.sort_by_key(|entry| entry.pid);

    to_value(&ProcessSummary {
        all: list.len(),
        running,
        sleeping,
        blocked,
        list,
    })
}
