//! Test-facing shells over the lifecycle coordinator.
//!
//! `StackGuard` gives method-scoped semantics: the stack comes up when the
//! guard is built and goes down when it drops. `SharedStack` gives
//! class/suite-scoped semantics: the first caller starts the stack, later
//! callers get the same snapshot, and teardown is explicit (Rust has no
//! after-all hook; a static's drop never runs). Both are thin layers over
//! the same `LifecycleCoordinator` the CLI tasks use.

use crate::domain::{ScopeKind, StackState};
use crate::error::Result;
use crate::services::{ComposeService, LifecycleCoordinator, ScopeOptions, TeardownReport};
use std::sync::{Arc, Mutex};

/// Method-scoped stack: up on construction, down on drop.
pub struct StackGuard {
    coordinator: LifecycleCoordinator,
    state: StackState,
}

impl StackGuard {
    /// Bring a stack up for one test. The scope tag is forced to `Test`.
    pub fn up(service: Arc<ComposeService>, mut options: ScopeOptions) -> Result<Self> {
        options.scope = ScopeKind::Test;
        let mut coordinator = LifecycleCoordinator::new(service, options);
        let state = coordinator.start()?;
        Ok(Self { coordinator, state })
    }

    pub fn state(&self) -> &StackState {
        &self.state
    }

    /// Host port published for `container_port` of the named service.
    pub fn host_port(&self, service: &str, container_port: u16) -> Option<u16> {
        self.state.host_port(service, container_port)
    }

    /// Explicit teardown for callers that want the warning report; drop
    /// does the same without one.
    pub fn down(mut self) -> TeardownReport {
        self.coordinator.finish()
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        // finish() is a no-op once the scope is terminated, so an explicit
        // down() followed by drop stays safe.
        self.coordinator.finish();
    }
}

/// Suite-scoped stack shared by many tests.
///
/// Keep one in a `std::sync::OnceLock` (or any static) and call
/// [`SharedStack::state`] from each test; the first call starts the stack.
pub struct SharedStack {
    coordinator: Mutex<LifecycleCoordinator>,
}

impl SharedStack {
    pub fn new(service: Arc<ComposeService>, mut options: ScopeOptions) -> Self {
        options.scope = ScopeKind::Suite;
        Self {
            coordinator: Mutex::new(LifecycleCoordinator::new(service, options)),
        }
    }

    /// Start on first use; subsequent calls return the same snapshot.
    pub fn state(&self) -> Result<StackState> {
        self.coordinator.lock().unwrap().start()
    }

    /// Tear down after the last test of the suite. Also reachable from a
    /// separate process via the CLI `down` task, which resumes the scope
    /// from the handoff record.
    pub fn teardown(&self) -> TeardownReport {
        self.coordinator.lock().unwrap().finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ServiceState, StackConfig};
    use crate::services::ToolConfig;
    use crate::test_support::{ps_line, MockRunner};
    use std::path::PathBuf;

    fn service_and_mock() -> (Arc<ComposeService>, Arc<MockRunner>) {
        let mock = Arc::new(MockRunner::new());
        mock.push_ps(&[ps_line("web", "running", "healthy")]);
        let service = Arc::new(ComposeService::new(mock.clone(), ToolConfig::default()));
        (service, mock)
    }

    fn options(dir: &std::path::Path) -> ScopeOptions {
        let mut options = ScopeOptions::new(
            StackConfig::new("shop", "shop-ci", vec![PathBuf::from("compose.yml")]),
            ScopeKind::Test,
        );
        options.state_file = Some(dir.join("state.json"));
        options
    }

    #[test]
    fn guard_tears_down_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let (service, mock) = service_and_mock();

        {
            let guard = StackGuard::up(service, options(dir.path())).unwrap();
            assert_eq!(guard.state().services["web"].state, ServiceState::Healthy);
            assert_eq!(mock.count("down"), 0);
        }

        assert_eq!(mock.count("down"), 1);
    }

    #[test]
    fn explicit_down_then_drop_runs_teardown_once() {
        let dir = tempfile::tempdir().unwrap();
        let (service, mock) = service_and_mock();

        let guard = StackGuard::up(service, options(dir.path())).unwrap();
        let report = guard.down();

        assert!(report.is_clean());
        assert_eq!(mock.count("down"), 1);
    }

    #[test]
    fn shared_stack_starts_once_for_many_readers() {
        let dir = tempfile::tempdir().unwrap();
        let (service, mock) = service_and_mock();
        let shared = SharedStack::new(service, options(dir.path()));

        let first = shared.state().unwrap();
        let second = shared.state().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.scope, ScopeKind::Suite);
        assert_eq!(mock.count("up"), 1);

        shared.teardown();
        assert_eq!(mock.count("down"), 1);
    }
}
