//! Pure parsers for compose CLI output.
//!
//! Everything here is deterministic and free of I/O. A malformed entry is
//! logged and skipped; a batch never fails because one line did not parse.

use crate::domain::{PortMapping, ServiceInfo, ServiceState};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Classify the textual status of a service.
///
/// Matching is case-insensitive and substring-based; the first rule that
/// matches wins:
/// 1. contains "restart" -> `Restarting`
/// 2. contains "running"/"up" and "healthy" (but not "unhealthy") -> `Healthy`
/// 3. contains "running"/"up" -> `Running`
/// 4. contains "exit"/"stop" -> `Stopped`
/// 5. anything else (including blank input) -> `Unknown`
pub fn parse_service_state(raw: &str) -> ServiceState {
    let status = raw.trim().to_ascii_lowercase();
    if status.is_empty() {
        return ServiceState::Unknown;
    }
    if status.contains("restart") {
        return ServiceState::Restarting;
    }

    let active = status.contains("running") || status.contains("up");
    // "unhealthy" contains "healthy", so the negative check is required.
    if active && status.contains("healthy") && !status.contains("unhealthy") {
        return ServiceState::Healthy;
    }
    if active {
        return ServiceState::Running;
    }
    if status.contains("exit") || status.contains("stop") {
        return ServiceState::Stopped;
    }
    ServiceState::Unknown
}

/// Parse a textual port column such as
/// `0.0.0.0:9091->8080/tcp, :::9091->8080/tcp`.
///
/// Entries are comma-separated, each of the shape
/// `(host-ip:)?host-port->container-port(/protocol)?`. Malformed entries
/// are skipped; an all-malformed input yields an empty list.
pub fn parse_port_mappings(raw: &str) -> Vec<PortMapping> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parsed = parse_port_entry(entry);
            if parsed.is_none() {
                warn!("skipping malformed port entry '{entry}'");
            }
            parsed
        })
        .collect()
}

fn parse_port_entry(entry: &str) -> Option<PortMapping> {
    let (host_side, container_side) = entry.split_once("->")?;
    // The host side may carry a v4 or v6 address prefix
    // (`0.0.0.0:9091`, `:::9091`, `[::1]:9091`); the port is what follows
    // the last colon.
    let host_port = host_side.rsplit(':').next()?.trim().parse::<u16>().ok()?;
    let (container_port, protocol) = match container_side.split_once('/') {
        Some((port, protocol)) => (port, protocol.trim()),
        None => (container_side, "tcp"),
    };
    if protocol.is_empty() {
        return None;
    }
    let container_port = container_port.trim().parse::<u16>().ok()?;
    Some(PortMapping {
        container_port,
        host_port,
        protocol: protocol.to_ascii_lowercase(),
    })
}

/// One entry of `compose ps --format json` output.
///
/// Docker emits one JSON object per line; podman's compose wrapper follows
/// the same shape. Only the fields used here are modelled.
#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Service", default)]
    service: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Health", default)]
    health: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Publishers", default)]
    publishers: Option<Vec<Publisher>>,
    #[serde(rename = "Ports", default)]
    ports: String,
}

#[derive(Debug, Deserialize)]
struct Publisher {
    #[serde(rename = "PublishedPort", default)]
    published_port: u16,
    #[serde(rename = "TargetPort", default)]
    target_port: u16,
    #[serde(rename = "Protocol", default = "default_protocol")]
    protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

/// Parse `compose ps --format json` output: one JSON object per line, each
/// parsed independently so one bad line never poisons the batch.
///
/// The service name is read from the `Service` field, falling back to
/// `Name`; an entry carrying neither is dropped.
pub fn parse_services_json(raw: &str) -> BTreeMap<String, ServiceInfo> {
    let mut services = BTreeMap::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let entry: PsEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unparseable ps line: {err}");
                continue;
            }
        };

        match service_from_entry(entry) {
            Some(info) => {
                services.insert(info.name.clone(), info);
            }
            None => warn!("skipping ps entry without a service or container name"),
        }
    }

    services
}

fn service_from_entry(entry: PsEntry) -> Option<ServiceInfo> {
    let name = if !entry.service.is_empty() {
        entry.service
    } else if !entry.name.is_empty() {
        entry.name
    } else {
        return None;
    };

    // `Status` carries the human string ("Up 5 minutes (healthy)"); older
    // tool versions only fill the structured State/Health columns.
    let status = if !entry.status.is_empty() {
        entry.status
    } else if entry.health.is_empty() {
        entry.state
    } else {
        format!("{} ({})", entry.state, entry.health)
    };
    let state = parse_service_state(&status);

    let ports = match entry.publishers {
        Some(publishers) => publishers
            .into_iter()
            .filter(|p| p.published_port != 0 && p.target_port != 0)
            .map(|p| PortMapping {
                container_port: p.target_port,
                host_port: p.published_port,
                protocol: p.protocol,
            })
            .collect(),
        None => parse_port_mappings(&entry.ports),
    };

    Some(ServiceInfo {
        name,
        container_id: entry.id,
        state,
        ports,
    })
}
