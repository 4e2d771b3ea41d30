//! The fixed allow-list of metric operations callers may request

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{SharedError, SharedResult};

/// Longest request id a caller may supply
pub const MAX_REQUEST_ID_LEN: usize = 50;

/// Metric operations a caller is allowed to invoke.
///
/// The wire name of each variant is the exact, case-sensitive string callers
/// send; anything else is rejected before it reaches a provider or a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "cpuCurrentSpeed")]
    CpuCurrentSpeed,
    #[serde(rename = "cpuTemperature")]
    CpuTemperature,
    #[serde(rename = "currentLoad")]
    CurrentLoad,
    #[serde(rename = "mem")]
    Mem,
    #[serde(rename = "battery")]
    Battery,
    #[serde(rename = "graphics")]
    Graphics,
    #[serde(rename = "networkInterfaces")]
    NetworkInterfaces,
    #[serde(rename = "networkStats")]
    NetworkStats,
    #[serde(rename = "fsSize")]
    FsSize,
    #[serde(rename = "blockDevices")]
    BlockDevices,
    #[serde(rename = "processes")]
    Processes,
    #[serde(rename = "versions")]
    Versions,
    #[serde(rename = "system")]
    System,
    #[serde(rename = "osInfo")]
    OsInfo,
    #[serde(rename = "networkConnections")]
    NetworkConnections,
}

impl Operation {
    /// Every allow-listed operation
    pub const ALL: [Operation; 16] = [
        Operation::Time,
        Operation::CpuCurrentSpeed,
        Operation::CpuTemperature,
        Operation::CurrentLoad,
        Operation::Mem,
        Operation::Battery,
        Operation::Graphics,
        Operation::NetworkInterfaces,
        Operation::NetworkStats,
        Operation::FsSize,
        Operation::BlockDevices,
        Operation::Processes,
        Operation::Versions,
        Operation::System,
        Operation::OsInfo,
        Operation::NetworkConnections,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Time => "time",
            Operation::CpuCurrentSpeed => "cpuCurrentSpeed",
            Operation::CpuTemperature => "cpuTemperature",
            Operation::CurrentLoad => "currentLoad",
            Operation::Mem => "mem",
            Operation::Battery => "battery",
            Operation::Graphics => "graphics",
            Operation::NetworkInterfaces => "networkInterfaces",
            Operation::NetworkStats => "networkStats",
            Operation::FsSize => "fsSize",
            Operation::BlockDevices => "blockDevices",
            Operation::Processes => "processes",
            Operation::Versions => "versions",
            Operation::System => "system",
            Operation::OsInfo => "osInfo",
            Operation::NetworkConnections => "networkConnections",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .find(|op| op.as_str() == s)
            .copied()
            .ok_or_else(|| SharedError::UnknownOperation { name: s.to_string() })
    }
}

/// Check a caller-supplied request id: 1 to `MAX_REQUEST_ID_LEN` UTF-16 code
/// units, the length JSON-speaking callers see for the same string
pub fn validate_request_id(id: &str) -> SharedResult<()> {
    let len = id.encode_utf16().count();
    if len == 0 {
        return Err(SharedError::InvalidRequestId {
            reason: "id is empty".to_string(),
        });
    }
    if len > MAX_REQUEST_ID_LEN {
        return Err(SharedError::InvalidRequestId {
            reason: format!("id has {len} UTF-16 code units (max {MAX_REQUEST_ID_LEN})"),
        });
    }
    Ok(())
}
