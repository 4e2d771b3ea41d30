//! Memory and swap usage

use serde::Serialize;
use serde_json::Value;

use super::to_value;
use crate::error::ProviderResult;
use crate::sysinfo_provider::Sampler;

/// Byte counts; key names match what callers of `mem` already read
#[derive(Debug, Serialize)]
struct Memory {
    total: u64,
    free: u64,
    used: u64,
    active: u64,
    available: u64,
    swaptotal: u64,
    swapused: u64,
    swapfree: u64,
}

pub fn mem(sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    sampler.system.refresh_memory();
    let system = &sampler.system;

    to_value(&Memory {
        total: system.total_memory(),
        free: system.free_memory(),
        used: system.used_memory(),
        active: system.total_memory().saturating_sub(system.available_memory()),
        available: system.available_memory(),
        swaptotal: system.total_swap(),
        swapused: system.used_swap(),
        swapfree: system.free_swap(),
    })
}
