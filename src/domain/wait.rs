use crate::domain::ServiceState;
use crate::error::{Error, Result};
use std::time::Duration;

/// What must be true before a stack counts as ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSpec {
    /// Services that must reach the target state. Must be a subset of the
    /// services the stack declares; the caller is responsible for that.
    pub services: Vec<String>,
    pub target: ServiceState,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitSpec {
    pub fn new(services: Vec<String>, target: ServiceState) -> Self {
        Self {
            services,
            target,
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Checked before any polling happens.
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(Error::Configuration {
                context: "wait".to_string(),
                reason: "at least one target service is required".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Configuration {
                context: "wait".to_string(),
                reason: "poll interval must be greater than zero".to_string(),
            });
        }
        if self.poll_interval >= self.timeout {
            return Err(Error::Configuration {
                context: "wait".to_string(),
                reason: format!(
                    "poll interval ({:?}) must be shorter than the timeout ({:?})",
                    self.poll_interval, self.timeout
                ),
            });
        }
        Ok(())
    }
}

/// Options for a finite log capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogsSpec {
    /// Restrict the capture to one service; `None` captures the stack.
    pub service: Option<String>,
    /// Maximum number of trailing lines per service.
    pub tail: Option<u32>,
    /// Accepted for interface symmetry; a capture is always finite and
    /// this flag is ignored.
    pub follow: bool,
}
