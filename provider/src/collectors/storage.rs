//! File system usage and block devices

use serde::Serialize;
use serde_json::Value;
use shared::Operation;
use sysinfo::{Disk, Disks};

use super::{string_arg, to_value};
use crate::error::ProviderResult;
use crate::sysinfo_provider::Sampler;

#[derive(Debug, Serialize)]
struct FsSize {
    fs: String,
    #[serde(rename = "type")]
    fs_type: String,
    size: u64,
    used: u64,
    available: u64,
    #[serde(rename = "use")]
    use_percent: f64,
    mount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockDevice {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    fs_type: String,
    mount: String,
    size: u64,
    removable: bool,
}

/// Percentage used, two decimals
fn use_percent(size: u64, used: u64) -> f64 {
    if size == 0 {
        return 0.0;
    }
    (used as f64 / size as f64 * 10_000.0).round() / 100.0
}

fn fs_size_entry(disk: &Disk) -> FsSize {
    let size = disk.total_space();
    let available = disk.available_space();
    let used = size.saturating_sub(available);
    FsSize {
        fs: disk.name().to_string_lossy().into_owned(),
        fs_type: disk.file_system().to_string_lossy().into_owned(),
        size,
        used,
        available,
        use_percent: use_percent(size, used),
        mount: disk.mount_point().to_string_lossy().into_owned(),
    }
}

/// `fsSize([filter])`: all mounted file systems, or the one whose mount
/// point or device name equals `filter`
pub fn fs_size(_sampler: &mut Sampler, args: &[Value]) -> ProviderResult<Value> {
    let filter = string_arg(Operation::FsSize, args, 0)?;
    let disks = Disks::new_with_refreshed_list();

    let entries: Vec<FsSize> = disks
        .list()
        .iter()
        .map(fs_size_entry)
        .filter(|entry| match &filter {
            Some(wanted) => &entry.mount == wanted || &entry.fs == wanted,
            None => true,
        })
        .collect();

    to_value(&entries)
}

pub fn block_devices(_sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    let disks = Disks::new_with_refreshed_list();

    let devices: Vec<BlockDevice> = disks
        .list()
        .iter()
        .map(|disk| BlockDevice {
            name: disk.name().to_string_lossy().into_owned(),
            kind: format!("{:?}", disk.kind()),
            fs_type: disk.file_system().to_string_lossy().into_owned(),
            mount: disk.mount_point().to_string_lossy().into_owned(),
            size: disk.total_space(),
            removable: disk.is_removable(),
        })
        .collect();

    to_value(&devices)
}
