//! Network interfaces, traffic counters and open connections

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use shared::Operation;
use sysinfo::Networks;

use super::{read_trimmed, string_arg, to_value};
use crate::error::{ProviderError, ProviderResult};
use crate::sysinfo_provider::Sampler;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    iface: String,
    mac: String,
    internal: bool,
    operstate: Option<String>,
    mtu: Option<u32>,
    speed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct NetworkStats {
    iface: String,
    operstate: Option<String>,
    rx_bytes: u64,
    rx_errors: u64,
    tx_bytes: u64,
    tx_errors: u64,
    rx_sec: Option<f64>,
    tx_sec: Option<f64>,
    ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub protocol: &'static str,
    pub local_address: String,
    pub local_port: u16,
    pub peer_address: String,
    pub peer_port: u16,
    pub state: String,
}

fn sys_class_net(iface: &str, attribute: &str) -> Option<String> {
    read_trimmed(format!("/sys/class/net/{iface}/{attribute}"))
}

pub fn network_interfaces(_sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    let networks = Networks::new_with_refreshed_list();

    let mut interfaces: Vec<NetworkInterface> = (&networks)
        .into_iter()
        .map(|(name, data)| NetworkInterface {
            iface: name.clone(),
            mac: data.mac_address().to_string(),
            internal: name == "lo",
            operstate: sys_class_net(name, "operstate"),
            mtu: sys_class_net(name, "mtu").and_then(|v| v.parse().ok()),
            // Negative for links that are down
            speed: sys_class_net(name, "speed").and_then(|v| v.parse().ok()),
        })
        .collect();
    interfaces.sort_by(|a, b| a.iface.cmp(&b.iface));

    to_value(&interfaces)
}

/// Interfaces selected by the optional argument: absent or `*` means all,
/// otherwise a comma-separated list of names
fn interface_filter(arg: Option<String>) -> Option<Vec<String>> {
    match arg.as_deref().map(str::trim) {
        None | Some("") | Some("*") => None,
        Some(list) => Some(list.split(',').map(|s| s.trim().to_string()).collect()),
    }
}

/// `networkStats([ifaces])`: byte counters plus per-second rates measured
/// against the previous call. Rates are `null` on the first sample.
pub fn network_stats(sampler: &mut Sampler, args: &[Value]) -> ProviderResult<Value> {
    let filter = interface_filter(string_arg(Operation::NetworkStats, args, 0)?);

    let elapsed = sampler.networks_sampled_at.map(|at| at.elapsed());
    sampler.networks.refresh();
    sampler.networks_sampled_at = Some(Instant::now());

    let seconds = elapsed.map(|e| e.as_secs_f64()).filter(|s| *s > 0.0);

    let mut stats: Vec<NetworkStats> = (&sampler.networks)
        .into_iter()
        .filter(|(name, _)| match &filter {
            Some(wanted) => wanted.iter().any(|w| w == *name),
            None => true,
        })
        .map(|(name, data)| NetworkStats {
            iface: name.clone(),
            operstate: sys_class_net(name, "operstate"),
            rx_bytes: data.total_received(),
            rx_errors: data.total_errors_on_received(),
            tx_bytes: data.total_transmitted(),
            tx_errors: data.total_errors_on_transmitted(),
            rx_sec: seconds.map(|s| data.received() as f64 / s),
            tx_sec: seconds.map(|s| data.transmitted() as f64 / s),
            ms: elapsed.map(|e| e.as_millis() as u64),
        })
        .collect();
    stats.sort_by(|a, b| a.iface.cmp(&b.iface));

    to_value(&stats)
}

#[cfg(target_os = "linux")]
pub fn network_connections(_sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    let mut connections = Vec::new();

    for (path, protocol) in [
        ("/proc/net/tcp", "tcp"),
        ("/proc/net/tcp6", "tcp6"),
        ("/proc/net/udp", "udp"),
        ("/proc/net/udp6", "udp6"),
    ] {
        match std::fs::read_to_string(path) {
            Ok(contents) => connections.extend(parse_proc_net(&contents, protocol)),
            // IPv6 may be disabled
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(ProviderError::IoError(e)),
        }
    }

    to_value(&connections)
}

#[cfg(not(target_os = "linux"))]
pub fn network_connections(_sampler: &mut Sampler, _args: &[Value]) -> ProviderResult<Value> {
    Err(ProviderError::Unsupported {
        operation: Operation::NetworkConnections,
    })
}

/// Parse one `/proc/net/{tcp,udp}[6]` table
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_proc_net(contents: &str, protocol: &'static str) -> Vec<Connection> {
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            let (local_address, local_port) = parse_endpoint(fields[1])?;
            let (peer_address, peer_port) = parse_endpoint(fields[2])?;
            let state = if protocol.starts_with("tcp") {
                tcp_state(fields[3]).to_string()
            } else {
                String::new()
            };
            Some(Connection {
                protocol,
                local_address: local_address.to_string(),
                local_port,
                peer_address: peer_address.to_string(),
                peer_port,
                state,
            })
        })
        .collect()
}

/// `0100007F:0035` → 127.0.0.1:53. Addresses are kernel words printed in
/// host (little-endian) order.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_endpoint(field: &str) -> Option<(IpAddr, u16)> {
    let (address, port) = field.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;

    let ip = match address.len() {
        8 => {
            let word = u32::from_str_radix(address, 16).ok()?;
            IpAddr::V4(Ipv4Addr::from(word.to_le_bytes()))
        }
        32 => {
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_mut(4).enumerate() {
                let word = u32::from_str_radix(&address[i * 8..i * 8 + 8], 16).ok()?;
                chunk.copy_from_slice(&word.to_le_bytes());
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };
    Some((ip, port))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn tcp_state(code: &str) -> &'static str {
    match code {
        "01" => "ESTABLISHED",
        "02" => "SYN_SENT",
        "03" => "SYN_RECV",
        "04" => "FIN_WAIT1",
        "05" => "FIN_WAIT2",
        "06" => "TIME_WAIT",
        "07" => "CLOSE",
        "08" => "CLOSE_WAIT",
        "09" => "LAST_ACK",
        "0A" => "LISTEN",
        "0B" => "CLOSING",
        _ => "UNKNOWN",
    }
}
