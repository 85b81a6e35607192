//! Binds stack lifecycle to test-scope boundaries.
//!
//! One coordinator serves both invocation surfaces: the build-task CLI and
//! the in-process test guards. A scope moves through
//! `Created -> Starting -> Ready -> TearingDown -> Terminated`; a failure
//! while starting aborts the scope, and teardown failures are collected as
//! warnings so they never mask a test's own result.

use crate::domain::{LogsSpec, ScopeKind, StackConfig, StackState, WaitSpec};
use crate::error::{Error, Result};
use crate::infra::handoff::HandoffStore;
use crate::services::ComposeService;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where a scope currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopePhase {
    Created,
    Starting,
    Ready,
    TearingDown,
    Terminated,
}

/// Log capture to perform during teardown. Without a destination the
/// captured text goes to the logging channel.
#[derive(Debug, Clone, Default)]
pub struct LogsCapture {
    pub spec: LogsSpec,
    pub destination: Option<PathBuf>,
}

/// Everything the coordinator needs to run one scope.
#[derive(Debug, Clone)]
pub struct ScopeOptions {
    pub config: StackConfig,
    pub scope: ScopeKind,
    pub wait: Option<WaitSpec>,
    pub logs: Option<LogsCapture>,
    /// Explicit handoff record path; defaults to the environment variable
    /// or a per-stack temp file (see [`HandoffStore::resolve`]).
    pub state_file: Option<PathBuf>,
}

impl ScopeOptions {
    pub fn new(config: StackConfig, scope: ScopeKind) -> Self {
        Self {
            config,
            scope,
            wait: None,
            logs: None,
            state_file: None,
        }
    }
}

/// Warnings gathered during a best-effort teardown.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub warnings: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

/// Drives one stack through one test scope.
pub struct LifecycleCoordinator {
    service: Arc<ComposeService>,
    options: ScopeOptions,
    store: HandoffStore,
    phase: ScopePhase,
    state: Option<StackState>,
}

impl LifecycleCoordinator {
    pub fn new(service: Arc<ComposeService>, options: ScopeOptions) -> Self {
        let store = HandoffStore::resolve(options.state_file.clone(), &options.config.name);
        Self {
            service,
            options,
            store,
            phase: ScopePhase::Created,
            state: None,
        }
    }

    /// Coordinator for a stack some earlier process brought up: starts in
    /// `Ready` with whatever the handoff record still holds, so `finish`
    /// follows the normal teardown path. This is how the CLI `down` task
    /// shares the engine with the in-process guards.
    pub fn resume(service: Arc<ComposeService>, options: ScopeOptions) -> Self {
        let mut coordinator = Self::new(service, options);
        coordinator.state = coordinator.store.read().ok();
        coordinator.phase = ScopePhase::Ready;
        coordinator
    }

    pub fn phase(&self) -> ScopePhase {
        self.phase
    }

    pub fn state(&self) -> Option<&StackState> {
        self.state.as_ref()
    }

    pub fn state_path(&self) -> &Path {
        self.store.path()
    }

    /// Bring the scope to `Ready`: up, optional readiness wait, handoff
    /// write. Calling again on a ready scope returns the existing snapshot,
    /// which is what gives a suite its start-once semantics.
    ///
    /// A failure after the stack came up (readiness timeout, handoff write)
    /// still tears the half-started stack down before the error propagates,
    /// so nothing is left running on the host.
    pub fn start(&mut self) -> Result<StackState> {
        if self.phase == ScopePhase::Ready {
            if let Some(state) = &self.state {
                return Ok(state.clone());
            }
        }
        if self.phase != ScopePhase::Created {
            return Err(Error::Configuration {
                context: self.options.config.name.clone(),
                reason: format!("scope cannot start from phase {:?}", self.phase),
            });
        }

        self.phase = ScopePhase::Starting;
        match self.try_start() {
            Ok(state) => {
                self.state = Some(state.clone());
                self.phase = ScopePhase::Ready;
                Ok(state)
            }
            Err(err) => {
                self.phase = ScopePhase::Terminated;
                Err(err)
            }
        }
    }

    fn try_start(&mut self) -> Result<StackState> {
        let state = self
            .service
            .up_stack(&self.options.config, self.options.scope)?;
        let result = self.settle(state);
        if let Err(err) = &result {
            self.abort_half_started(err);
        }
        result
    }

    fn settle(&mut self, mut state: StackState) -> Result<StackState> {
        if let Some(wait) = &self.options.wait {
            self.service.wait_for_services(&self.options.config, wait)?;
            // Re-snapshot so the handoff reflects the settled states.
            state.services = self.service.query_services(&self.options.config)?;
        }
        self.store.write(&state)?;
        Ok(state)
    }

    fn abort_half_started(&self, cause: &Error) {
        error!(
            "aborting scope for stack '{}': {cause}",
            self.options.config.name
        );
        if let Err(err) = self.service.down_stack(&self.options.config) {
            warn!(
                "best-effort cleanup of project '{}' failed: {err}",
                self.options.config.project
            );
        }
    }

    /// Tear the scope down. Nothing here propagates: failures are logged
    /// and collected so the build can surface them as warnings without
    /// overwriting test results already recorded.
    pub fn finish(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        match self.phase {
            ScopePhase::Terminated => return report,
            ScopePhase::Created => {
                // Nothing was started in this scope.
                self.phase = ScopePhase::Terminated;
                return report;
            }
            _ => {}
        }

        self.phase = ScopePhase::TearingDown;
        self.capture_logs(&mut report);

        if let Err(err) = self.service.down_stack(&self.options.config) {
            report.warn(format!(
                "teardown of project '{}' failed: {err}",
                self.options.config.project
            ));
        }
        if let Err(err) = self.store.clear() {
            report.warn(format!("could not remove handoff record: {err}"));
        }

        self.state = None;
        self.phase = ScopePhase::Terminated;
        report
    }

    fn capture_logs(&self, report: &mut TeardownReport) {
        let Some(capture) = &self.options.logs else {
            return;
        };

        let logs = self.service.capture_logs(&self.options.config, &capture.spec);
        if logs.is_empty() {
            return;
        }

        match &capture.destination {
            Some(path) => {
                if let Err(err) = write_log_file(path, &logs) {
                    report.warn(format!(
                        "could not write stack logs to {}: {err}",
                        path.display()
                    ));
                } else {
                    info!("stack logs written to {}", path.display());
                }
            }
            None => info!(
                "captured logs for stack '{}':\n{logs}",
                self.options.config.name
            ),
        }
    }
}

fn write_log_file(path: &Path, logs: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ServiceState;
    use crate::services::ToolConfig;
    use crate::test_support::{ps_line, MockClock, MockRunner};
    use std::path::PathBuf;
    use std::time::Duration;

    fn options(dir: &Path) -> ScopeOptions {
        let mut options = ScopeOptions::new(
            StackConfig::new("shop", "shop-ci", vec![PathBuf::from("compose.yml")]),
            ScopeKind::Test,
        );
        options.state_file = Some(dir.join("state.json"));
        options
    }

    fn coordinator_with(
        runner: Arc<MockRunner>,
        options: ScopeOptions,
    ) -> LifecycleCoordinator {
        let service = ComposeService::new(runner, ToolConfig::default())
            .with_clock(Arc::new(MockClock::new()));
        LifecycleCoordinator::new(Arc::new(service), options)
    }

    #[test]
    fn start_reaches_ready_and_writes_handoff() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRunner::new());
        mock.push_ps(&[ps_line("web", "running", "healthy")]);
        let mut coordinator = coordinator_with(mock, options(dir.path()));

        let state = coordinator.start().unwrap();

        assert_eq!(coordinator.phase(), ScopePhase::Ready);
        assert_eq!(state.services["web"].state, ServiceState::Healthy);
        assert!(coordinator.state_path().exists());
    }

    #[test]
    fn start_twice_reuses_the_running_stack() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRunner::new());
        mock.push_ps(&[ps_line("web", "running", "")]);
        let mut coordinator = coordinator_with(mock.clone(), options(dir.path()));

        let first = coordinator.start().unwrap();
        let second = coordinator.start().unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.count("up"), 1);
    }

    #[test]
    fn up_failure_terminates_the_scope() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRunner::new());
        mock.push_failure("up", 1, "bad compose file");
        let mut coordinator = coordinator_with(mock, options(dir.path()));

        let result = coordinator.start();

        assert!(matches!(result, Err(Error::Orchestration { .. })));
        assert_eq!(coordinator.phase(), ScopePhase::Terminated);
        assert!(!coordinator.state_path().exists());
    }

    #[test]
    fn readiness_timeout_tears_the_stack_down() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRunner::new());
        mock.push_ps(&[ps_line("web", "created", "")]);
        let mut opts = options(dir.path());
        let mut wait = WaitSpec::new(vec!["web".to_string()], ServiceState::Running);
        wait.timeout = Duration::from_secs(3);
        wait.poll_interval = Duration::from_secs(1);
        opts.wait = Some(wait);
        let mut coordinator = coordinator_with(mock.clone(), opts);

        let result = coordinator.start();

        match result {
            Err(Error::Timeout { pending, .. }) => {
                assert_eq!(pending, vec![("web".to_string(), ServiceState::Unknown)]);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(coordinator.phase(), ScopePhase::Terminated);
        assert_eq!(mock.count("down"), 1, "cleanup must run after a timeout");
    }

    #[test]
    fn finish_collects_teardown_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRunner::new());
        mock.push_ps(&[ps_line("web", "running", "")]);
        mock.push_failure("down", 125, "permission denied");
        let mut coordinator = coordinator_with(mock, options(dir.path()));

        coordinator.start().unwrap();
        let report = coordinator.finish();

        assert!(!report.is_clean());
        assert!(report.warnings[0].contains("shop-ci"));
        assert_eq!(coordinator.phase(), ScopePhase::Terminated);
    }

    #[test]
    fn finish_without_start_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRunner::new());
        let mut coordinator = coordinator_with(mock.clone(), options(dir.path()));

        let report = coordinator.finish();

        assert!(report.is_clean());
        assert!(mock.verbs().is_empty());
    }

    #[test]
    fn finish_clears_the_handoff_record() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRunner::new());
        mock.push_ps(&[ps_line("web", "running", "")]);
        let mut coordinator = coordinator_with(mock, options(dir.path()));

        coordinator.start().unwrap();
        assert!(coordinator.state_path().exists());
        coordinator.finish();

        assert!(!coordinator.state_path().exists());
    }

    #[test]
    fn logs_are_written_to_the_destination_during_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRunner::new());
        mock.push_ps(&[ps_line("web", "running", "")]);
        mock.push_response("logs", crate::domain::CommandOutput::ok("web | ready\n"));
        let mut opts = options(dir.path());
        let destination = dir.path().join("logs/stack.log");
        opts.logs = Some(LogsCapture {
            spec: LogsSpec::default(),
            destination: Some(destination.clone()),
        });
        let mut coordinator = coordinator_with(mock, opts);

        coordinator.start().unwrap();
        let report = coordinator.finish();

        assert!(report.is_clean());
        assert_eq!(fs::read_to_string(destination).unwrap(), "web | ready\n");
    }

    #[test]
    fn resume_follows_the_normal_teardown_path() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRunner::new());
        mock.push_ps(&[ps_line("web", "running", "")]);
        let mut coordinator = coordinator_with(mock.clone(), options(dir.path()));
        coordinator.start().unwrap();

        // A fresh process tears the same stack down via resume.
        let service = ComposeService::new(mock.clone(), ToolConfig::default());
        let mut resumed = LifecycleCoordinator::resume(Arc::new(service), options(dir.path()));
        assert!(resumed.state().is_some());
        let report = resumed.finish();

        assert!(report.is_clean());
        assert_eq!(mock.count("down"), 1);
        assert!(!resumed.state_path().exists());
    }
}
