//! CPU speed, temperature and load

use serde::Serialize;
use serde_json::Value;
use sysinfo::{Components, System};

use super::to_value;
use crate::error::ProviderResult;
use crate::sysinfo_provider::Sampler;

#[derive(Debug, Serialize)]
struct CpuSpeed {
    avg: f64,
    min: f64,
    max: f64,
    cores: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct CpuTemperature {
    main: Option<f32>,
    cores: Vec<f32>,
    max: Option<f32>,
    critical: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CoreLoad {
    load: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentLoad {
    avg_load: f64,
    current_load: f32,
    cpus: Vec<CoreLoad>,
}

/// MHz to GHz rounded to two decimals
fn ghz(mhz: u64) -> f64 {
    (mhz as f64 / 10.0).round() / 100.0
}

pub fn cpu_current_speed(sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    sampler.system.refresh_cpu();
    let cores: Vec<f64> = sampler.system.cpus().iter().map(|cpu| ghz(cpu.frequency())).collect();

    let speed = if cores.is_empty() {
        CpuSpeed {
            avg: 0.0,
            min: 0.0,
            max: 0.0,
            cores,
        }
    } else {
        let sum: f64 = cores.iter().sum();
        CpuSpeed {
            avg: (sum / cores.len() as f64 * 100.0).round() / 100.0,
            min: cores.iter().copied().fold(f64::INFINITY, f64::min),
            max: cores.iter().copied().fold(0.0, f64::max),
            cores,
        }
    };
    to_value(&speed)
}

fn is_cpu_sensor(label: &str) -> bool {
    let label = label.to_lowercase();
    ["cpu", "core", "package", "tctl", "tdie", "k10temp"]
        .iter()
        .any(|needle| label.contains(needle))
}

pub fn cpu_temperature(_sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    let components = Components::new_with_refreshed_list();

    let mut package = None;
    let mut cores = Vec::new();
    let mut readings = Vec::new();
    let mut critical = None;

    for component in &components {
        let label = component.label();
        if !is_cpu_sensor(label) {
            continue;
        }
        let temperature = component.temperature();
        let lower = label.to_lowercase();
        if lower.contains("core") {
            cores.push(temperature);
        } else if package.is_none() {
            package = Some(temperature);
        }
        readings.push(temperature);
        if critical.is_none() {
            critical = component.critical();
        }
    }

    let average = if readings.is_empty() {
        None
    } else {
        Some(readings.iter().sum::<f32>() / readings.len() as f32)
    };

    to_value(&CpuTemperature {
        main: package.or(average),
        max: readings.iter().copied().reduce(f32::max),
        cores,
        critical,
    })
}

pub fn current_load(sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    sampler.prime_cpu();
    sampler.system.refresh_cpu();

    let cpus = sampler
        .system
        .cpus()
        .iter()
        .map(|cpu| CoreLoad { load: cpu.cpu_usage() })
        .collect();

    to_value(&CurrentLoad {
        avg_load: System::load_average().one,
        current_load: sampler.system.global_cpu_info().cpu_usage(),
        cpus,
    })
}
