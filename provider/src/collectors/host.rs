//! Host identity, OS details, clock, power and graphics

use std::path::Path;

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use sysinfo::System;

use super::{read_trimmed, to_value};
use crate::error::ProviderResult;
use crate::sysinfo_provider::Sampler;

#[derive(Debug, Serialize)]
struct TimeInfo {
    current: i64,
    uptime: u64,
    timezone: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SystemInfo {
    manufacturer: Option<String>,
    model: Option<String>,
    version: Option<String>,
    uuid: Option<String>,
    hostname: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OsInfo {
    platform: &'static str,
    distro: Option<String>,
    release: Option<String>,
    kernel: Option<String>,
    arch: &'static str,
    hostname: Option<String>,
    long_version: Option<String>,
    distribution_id: String,
    uptime: u64,
    boot_time: u64,
}

#[derive(Debug, Serialize)]
struct Versions {
    kernel: Option<String>,
    os: Option<String>,
    provider: &'static str,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct Battery {
    has_battery: bool,
    is_charging: bool,
    percent: Option<u8>,
    cycle_count: Option<u32>,
    manufacturer: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct GraphicsController {
    name: String,
    vendor: Option<String>,
    device: Option<String>,
    driver: Option<String>,
}

#[derive(Debug, Serialize)]
struct Graphics {
    controllers: Vec<GraphicsController>,
    displays: Vec<Value>,
}

pub fn time(_sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    let now = Local::now();
    to_value(&TimeInfo {
        current: now.timestamp_millis(),
        uptime: System::uptime(),
        timezone: now.format("%:z").to_string(),
    })
}

pub fn system(_sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    let dmi = Path::new("/sys/class/dmi/id");
    to_value(&SystemInfo {
        manufacturer: read_trimmed(dmi.join("sys_vendor")),
        model: read_trimmed(dmi.join("product_name")),
        version: read_trimmed(dmi.join("product_version")),
        // Readable by root only on most distributions
        uuid: read_trimmed(dmi.join("product_uuid")),
        hostname: System::host_name(),
    })
}

pub fn os_info(_sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    to_value(&OsInfo {
        platform: std::env::consts::OS,
        distro: System::name(),
        release: System::os_version(),
        kernel: System::kernel_version(),
        arch: std::env::consts::ARCH,
        hostname: System::host_name(),
        long_version: System::long_os_version(),
        distribution_id: System::distribution_id(),
        uptime: System::uptime(),
        boot_time: System::boot_time(),
    })
}

pub fn versions(_sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    to_value(&Versions {
        kernel: System::kernel_version(),
        os: System::os_version(),
        provider: env!("CARGO_PKG_VERSION"),
    })
}

pub fn battery(_sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    to_value(&read_battery(Path::new("/sys/class/power_supply")))
}

/// First supply whose `type` is `Battery`; an absent directory means no battery
fn read_battery(power_supply: &Path) -> Battery {
    let Ok(entries) = std::fs::read_dir(power_supply) else {
        return Battery::default();
    };

    let mut supplies: Vec<_> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    supplies.sort();

    for supply in supplies {
        if read_trimmed(supply.join("type")).as_deref() != Some("Battery") {
            continue;
        }
        let status = read_trimmed(supply.join("status"));
        return Battery {
            has_battery: true,
            is_charging: status.as_deref() == Some("Charging"),
            percent: read_trimmed(supply.join("capacity")).and_then(|v| v.parse().ok()),
            cycle_count: read_trimmed(supply.join("cycle_count")).and_then(|v| v.parse().ok()),
            manufacturer: read_trimmed(supply.join("manufacturer")),
            model: read_trimmed(supply.join("model_name")),
        };
    }
    Battery::default()
}

pub fn graphics(_sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    to_value(&Graphics {
        controllers: read_drm_cards(Path::new("/sys/class/drm")),
        displays: Vec::new(),
    })
}

/// `cardN` entries only; connectors such as `card0-HDMI-A-1` are skipped
fn read_drm_cards(drm: &Path) -> Vec<GraphicsController> {
    let Ok(entries) = std::fs::read_dir(drm) else {
        return Vec::new();
    };

    let mut controllers: Vec<GraphicsController> = entries
        .filter_map(|e| e.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_card = name
                .strip_prefix("card")
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
            if !is_card {
                return None;
            }
            let device = entry.path().join("device");
            Some(GraphicsController {
                vendor: read_trimmed(device.join("vendor")),
                device: read_trimmed(device.join("device")),
                driver: std::fs::read_link(device.join("driver"))
                    .ok()
                    .and_then(|p| p.file_name().map(|f| f.to_string_lossy().into_owned())),
                name,
            })
        })
        .collect();
    controllers.sort_by(|a, b| a.name.cmp(&b.name));
    controllers
}
