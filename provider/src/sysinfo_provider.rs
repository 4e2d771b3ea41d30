//! sysinfo-backed implementation of `MetricsProvider`

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use shared::{process_debug, Operation, ProcessId};
use sysinfo::{Networks, System};

use crate::collectors::{cpu, host, memory, network, processes, storage};
use crate::error::{ProviderError, ProviderResult};
use crate::traits::MetricsProvider;

/// A collector turns sampler state plus positional arguments into a JSON result
pub type Collector = fn(&mut Sampler, &[Value]) -> ProviderResult<Value>;

/// Static operation → collector mapping
static COLLECTORS: &[(Operation, Collector)] = &[
    (Operation::Time, host::time as Collector),
    (Operation::CpuCurrentSpeed, cpu::cpu_current_speed as Collector),
    (Operation::CpuTemperature, cpu::cpu_temperature as Collector),
    (Operation::CurrentLoad, cpu::current_load as Collector),
    (Operation::Mem, memory::mem as Collector),
    (Operation::Battery, host::battery as Collector),
    (Operation::Graphics, host::graphics as Collector),
    (Operation::NetworkInterfaces, network::network_interfaces as Collector),
    (Operation::NetworkStats, network::network_stats as Collector),
    (Operation::FsSize, storage::fs_size as Collector),
    (Operation::BlockDevices, storage::block_devices as Collector),
    (Operation::Processes, processes::processes as Collector),
    (Operation::Versions, host::versions as Collector),
    (Operation::System, host::system as Collector),
    (Operation::OsInfo, host::os_info as Collector),
    (Operation::NetworkConnections, network::network_connections as Collector),
];

/// State carried between samples.
///
/// CPU usage and network rates are deltas, so the previous refresh has to
/// survive from one call to the next.
pub struct Sampler {
    pub(crate) system: System,
    pub(crate) networks: Networks,
    pub(crate) networks_sampled_at: Option<Instant>,
    cpu_primed: bool,
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            networks: Networks::new_with_refreshed_list(),
            networks_sampled_at: None,
            cpu_primed: false,
        }
    }

    /// Take the baseline CPU sample usage figures are measured against
    pub(crate) fn prime_cpu(&mut self) {
        if !self.cpu_primed {
            self.system.refresh_cpu();
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            self.cpu_primed = true;
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics provider reading the local machine through sysinfo
pub struct SysinfoProvider {
    sampler: Arc<Mutex<Sampler>>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        Self {
            sampler: Arc::new(Mutex::new(Sampler::new())),
        }
    }

    fn collector(operation: Operation) -> Option<Collector> {
        COLLECTORS
            .iter()
            .find(|(op, _)| *op == operation)
            .map(|(_, collector)| *collector)
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsProvider for SysinfoProvider {
    fn operations(&self) -> Vec<Operation> {
        COLLECTORS.iter().map(|(op, _)| *op).collect()
    }

    async fn call(&self, operation: Operation, args: Vec<Value>) -> ProviderResult<Value> {
        let collector = Self::collector(operation).ok_or(ProviderError::Unsupported { operation })?;
        let sampler = Arc::clone(&self.sampler);

        let started = Instant::now();

        // sysinfo refreshes block on procfs/sysfs reads
        let result = tokio::task::spawn_blocking(move || {
            let mut sampler = sampler
                .lock()
                .map_err(|_| ProviderError::collection(operation, "sampler lock poisoned"))?;
            collector(&mut sampler, &args)
        })
        .await?;

        process_debug!(
            ProcessId::current(),
            "{} collected in {:?} ({})",
            operation,
            started.elapsed(),
            if result.is_ok() { "ok" } else { "failed" }
        );
        result
    }
}
