use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Readiness classification of a compose service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Running,
    Healthy,
    Stopped,
    Restarting,
    Unknown,
}

impl ServiceState {
    /// Whether an observed state satisfies `target`.
    ///
    /// A `Running` target is also satisfied by `Healthy`; a `Healthy`
    /// target requires the exact state.
    pub fn satisfies(self, target: ServiceState) -> bool {
        match target {
            ServiceState::Running => {
                matches!(self, ServiceState::Running | ServiceState::Healthy)
            }
            other => self == other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Running => "running",
            ServiceState::Healthy => "healthy",
            ServiceState::Stopped => "stopped",
            ServiceState::Restarting => "restarting",
            ServiceState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One published port of a running service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: String,
}

impl PortMapping {
    pub fn tcp(host_port: u16, container_port: u16) -> Self {
        Self {
            container_port,
            host_port,
            protocol: "tcp".to_string(),
        }
    }
}

/// Snapshot of one service as reported by the compose tool.
///
/// Replaced wholesale on every poll; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub container_id: String,
    pub state: ServiceState,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
}

impl ServiceInfo {
    /// Host port published for the given container-internal port.
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.container_port == container_port)
            .map(|p| p.host_port)
    }
}

/// Test-execution boundary a stack's lifetime is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// One stack for a whole suite of tests.
    Suite,
    /// One stack per test.
    Test,
}

/// Immutable snapshot of a started stack.
///
/// Created once per successful up; readiness changes produce a new
/// snapshot rather than editing this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackState {
    pub name: String,
    pub project: String,
    pub scope: ScopeKind,
    pub created_at: SystemTime,
    pub services: BTreeMap<String, ServiceInfo>,
}

impl StackState {
    pub fn service(&self, name: &str) -> Option<&ServiceInfo> {
        self.services.get(name)
    }

    /// Host port published for `container_port` of the named service.
    pub fn host_port(&self, service: &str, container_port: u16) -> Option<u16> {
        self.service(service)
            .and_then(|info| info.host_port(container_port))
    }
}

/// Definition of a stack to bring up: which compose files, which project
/// namespace, and which interpolation variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    pub name: String,
    pub project: String,
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub env_files: Vec<PathBuf>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl StackConfig {
    pub fn new(
        name: impl Into<String>,
        project: impl Into<String>,
        files: Vec<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            files,
            env_files: Vec::new(),
            variables: BTreeMap::new(),
        }
    }

    /// Fail fast before any subprocess is spawned.
    ///
    /// Project uniqueness across concurrently running stacks is the
    /// caller's obligation; only local well-formedness is checked here.
    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(Error::Configuration {
                context: self.name.clone(),
                reason: "at least one compose file is required".to_string(),
            });
        }
        if self.project.trim().is_empty() {
            return Err(Error::Configuration {
                context: self.name.clone(),
                reason: "project identifier must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_target_accepts_healthy() {
        assert!(ServiceState::Running.satisfies(ServiceState::Running));
        assert!(ServiceState::Healthy.satisfies(ServiceState::Running));
        assert!(!ServiceState::Stopped.satisfies(ServiceState::Running));
        assert!(!ServiceState::Restarting.satisfies(ServiceState::Running));
    }

    #[test]
    fn healthy_target_requires_exact_match() {
        assert!(ServiceState::Healthy.satisfies(ServiceState::Healthy));
        assert!(!ServiceState::Running.satisfies(ServiceState::Healthy));
    }

    #[test]
    fn host_port_lookup() {
        let info = ServiceInfo {
            name: "web".to_string(),
            container_id: "abc123".to_string(),
            state: ServiceState::Running,
            ports: vec![PortMapping::tcp(9091, 8080), PortMapping::tcp(9443, 8443)],
        };

        assert_eq!(info.host_port(8080), Some(9091));
        assert_eq!(info.host_port(8443), Some(9443));
        assert_eq!(info.host_port(5432), None);
    }

    #[test]
    fn config_requires_a_compose_file() {
        let config = StackConfig::new("shop", "shop-ci", vec![]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_requires_a_project() {
        let config = StackConfig::new("shop", "  ", vec![PathBuf::from("compose.yml")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_config_passes() {
        let config = StackConfig::new("shop", "shop-ci", vec![PathBuf::from("compose.yml")]);
        assert!(config.validate().is_ok());
    }
}
