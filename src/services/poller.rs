//! Readiness polling.
//!
//! A two-state machine: POLLING until every target service satisfies the
//! requested state (settles READY), or until the timeout elapses (settles
//! TIMED_OUT). Settlement is immediate on the satisfying observation; the
//! poller never sleeps a trailing interval.

use crate::domain::{Clock, ServiceInfo, ServiceState, WaitSpec};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Polls a status probe until every service named in a `WaitSpec` settles.
pub struct ReadinessPoller<'a> {
    clock: &'a dyn Clock,
}

impl<'a> ReadinessPoller<'a> {
    pub fn new(clock: &'a dyn Clock) -> Self {
        Self { clock }
    }

    /// Block until every service in `spec` satisfies the target state.
    ///
    /// `spec` is validated before the first probe. On timeout the error
    /// names every service still pending together with its last observed
    /// state.
    pub fn wait<F>(&self, project: &str, spec: &WaitSpec, mut probe: F) -> Result<ServiceState>
    where
        F: FnMut() -> Result<BTreeMap<String, ServiceInfo>>,
    {
        spec.validate()?;

        let started = self.clock.now();
        loop {
            let services = probe()?;
            let pending = pending_services(spec, &services);
            if pending.is_empty() {
                info!(
                    "project '{project}': services {:?} reached {}",
                    spec.services, spec.target
                );
                return Ok(spec.target);
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= spec.timeout {
                return Err(Error::Timeout {
                    project: project.to_string(),
                    timeout: spec.timeout,
                    pending,
                });
            }

            debug!("project '{project}': still waiting on {pending:?}");
            self.clock.sleep(spec.poll_interval);
        }
    }
}

/// Services not yet satisfying the target, with their last observed state.
/// A service missing from the probe result counts as `Unknown`.
fn pending_services(
    spec: &WaitSpec,
    services: &BTreeMap<String, ServiceInfo>,
) -> Vec<(String, ServiceState)> {
    spec.services
        .iter()
        .filter_map(|name| {
            let state = services
                .get(name)
                .map(|info| info.state)
                .unwrap_or(ServiceState::Unknown);
            if state.satisfies(spec.target) {
                None
            } else {
                Some((name.clone(), state))
            }
        })
        .collect()
}
