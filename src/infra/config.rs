//! `composebox.toml` loading.
//!
//! The file is deserialized into raw option-heavy sections, then resolved
//! into validated domain structs so every later stage works with checked
//! values only.

use crate::domain::{ServiceState, StackConfig, WaitSpec};
use crate::error::{Error, Result};
use crate::services::{LogsCapture, ToolConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "composebox.toml";

/// Fully resolved configuration for one stack.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub stack: StackConfig,
    pub tool: ToolConfig,
    pub wait: Option<WaitSpec>,
    pub logs: Option<LogsCapture>,
}

#[derive(Deserialize, Debug)]
struct RawConfig {
    stack: RawStack,
    #[serde(default)]
    tool: RawTool,
    wait: Option<RawWait>,
    logs: Option<RawLogs>,
}

#[derive(Deserialize, Debug)]
struct RawStack {
    name: Option<String>,
    project: Option<String>,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    env_files: Vec<String>,
    #[serde(default)]
    variables: BTreeMap<String, String>,
}

#[derive(Deserialize, Debug, Default)]
struct RawTool {
    program: Option<String>,
    base_args: Option<Vec<String>>,
    timeout: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawWait {
    #[serde(default)]
    services: Vec<String>,
    target: Option<ServiceState>,
    timeout: Option<String>,
    interval: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawLogs {
    service: Option<String>,
    tail: Option<u32>,
    destination: Option<String>,
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|err| Error::Configuration {
        context: path.display().to_string(),
        reason: format!("could not read config: {err}"),
    })?;
    parse_config(&content, &path.display().to_string())
}

fn parse_config(content: &str, origin: &str) -> Result<AppConfig> {
    let raw: RawConfig = toml::from_str(content).map_err(|err| Error::Configuration {
        context: origin.to_string(),
        reason: err.to_string(),
    })?;

    // Name and project default off each other; at least one is required.
    let (name, project) = match (raw.stack.name, raw.stack.project) {
        (Some(name), Some(project)) => (name, project),
        (Some(name), None) => {
            let project = format!("{name}-test");
            (name, project)
        }
        (None, Some(project)) => (project.clone(), project),
        (None, None) => {
            return Err(Error::Configuration {
                context: origin.to_string(),
                reason: "stack.name or stack.project is required".to_string(),
            });
        }
    };

    let stack = StackConfig {
        name,
        project,
        files: raw.stack.files.iter().map(|f| expand_path(f)).collect(),
        env_files: raw.stack.env_files.iter().map(|f| expand_path(f)).collect(),
        variables: raw.stack.variables,
    };
    stack.validate()?;

    let defaults = ToolConfig::default();
    let tool = ToolConfig {
        program: raw.tool.program.unwrap_or(defaults.program),
        base_args: raw.tool.base_args.unwrap_or(defaults.base_args),
        timeout: raw.tool.timeout.as_deref().map(parse_duration).transpose()?,
    };

    let wait = raw
        .wait
        .map(|section| -> Result<WaitSpec> {
            let mut spec = WaitSpec::new(
                section.services,
                section.target.unwrap_or(ServiceState::Running),
            );
            if let Some(timeout) = section.timeout.as_deref() {
                spec.timeout = parse_duration(timeout)?;
            }
            if let Some(interval) = section.interval.as_deref() {
                spec.poll_interval = parse_duration(interval)?;
            }
            spec.validate()?;
            Ok(spec)
        })
        .transpose()?;

    let logs = raw.logs.map(|section| LogsCapture {
        spec: crate::domain::LogsSpec {
            service: section.service,
            tail: section.tail,
            follow: false,
        },
        destination: section.destination.as_deref().map(expand_path),
    });

    Ok(AppConfig {
        stack,
        tool,
        wait,
        logs,
    })
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// Parse `"90s"` / `"2m"` style duration strings.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let parsed = if let Some(stripped) = s.strip_suffix('s') {
        stripped.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(stripped) = s.strip_suffix('m') {
        stripped
            .parse::<u64>()
            .ok()
            .map(|mins| Duration::from_secs(mins * 60))
    } else {
        None
    };
    parsed.ok_or_else(|| Error::Configuration {
        context: "duration".to_string(),
        reason: format!("invalid duration '{s}' (expected e.g. \"30s\" or \"2m\")"),
    })
}
