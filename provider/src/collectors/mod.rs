//! Per-operation collectors
//!
//! Each collector has the `Collector` signature and returns the operation's
//! JSON result. Field names follow the camelCase shape callers already parse.

pub mod cpu;
pub mod host;
pub mod memory;
pub mod network;
pub mod processes;
pub mod storage;

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use shared::Operation;

use crate::error::{ProviderError, ProviderResult};

pub(crate) fn to_value<T: Serialize>(value: &T) -> ProviderResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Optional string argument at `index`; `null` counts as absent
pub(crate) fn string_arg(operation: Operation, args: &[Value], index: usize) -> ProviderResult<Option<String>> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ProviderError::invalid_argument(
            operation,
            format!("expected a string at position {index}, got {other}"),
        )),
    }
}

/// Read a sysfs-style attribute file, trimmed; `None` when missing or unreadable
pub(crate) fn read_trimmed(path: impl AsRef<Path>) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
