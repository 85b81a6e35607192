use crate::domain::{
    Clock, CommandRunner, Invocation, LogsSpec, ScopeKind, ServiceInfo, ServiceState, StackConfig,
    StackState, SystemClock, WaitSpec,
};
use crate::error::{Error, Result};
use crate::parse;
use crate::services::poller::ReadinessPoller;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Which compose CLI to drive and how long one invocation may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub program: String,
    /// Arguments placed before everything else (`compose` for the docker
    /// plugin; empty for a standalone binary such as `podman-compose`).
    pub base_args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            base_args: vec!["compose".to_string()],
            timeout: None,
        }
    }
}

impl ToolConfig {
    pub fn podman() -> Self {
        Self {
            program: "podman".to_string(),
            ..Self::default()
        }
    }
}

/// Facade over the compose CLI: bring a stack up, query it, capture its
/// logs, tear it down. Stateless between calls; every operation spawns
/// exactly one subprocess (waiting spawns one per poll tick).
#[derive(Debug)]
pub struct ComposeService {
    runner: Arc<dyn CommandRunner>,
    tool: ToolConfig,
    clock: Arc<dyn Clock>,
}

impl ComposeService {
    pub fn new(runner: Arc<dyn CommandRunner>, tool: ToolConfig) -> Self {
        Self {
            runner,
            tool,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Arguments selecting the stack: files, env files, project namespace.
    /// Deterministic for a given config.
    pub fn stack_args(config: &StackConfig) -> Vec<String> {
        let mut args = Vec::new();
        for file in &config.files {
            args.push("-f".to_string());
            args.push(file.display().to_string());
        }
        for env_file in &config.env_files {
            args.push("--env-file".to_string());
            args.push(env_file.display().to_string());
        }
        args.push("-p".to_string());
        args.push(config.project.clone());
        args
    }

    pub fn up_args(config: &StackConfig) -> Vec<String> {
        let mut args = Self::stack_args(config);
        args.extend(["up".to_string(), "-d".to_string()]);
        args
    }

    pub fn down_args(config: &StackConfig) -> Vec<String> {
        let mut args = Self::stack_args(config);
        args.extend(["down".to_string(), "--remove-orphans".to_string()]);
        args
    }

    pub fn ps_args(config: &StackConfig) -> Vec<String> {
        let mut args = Self::stack_args(config);
        args.extend([
            "ps".to_string(),
            "-a".to_string(),
            "--format".to_string(),
            "json".to_string(),
        ]);
        args
    }

    pub fn logs_args(config: &StackConfig, spec: &LogsSpec) -> Vec<String> {
        let mut args = Self::stack_args(config);
        args.extend(["logs".to_string(), "--no-color".to_string()]);
        if let Some(tail) = spec.tail {
            args.push("--tail".to_string());
            args.push(tail.to_string());
        }
        if let Some(service) = &spec.service {
            args.push(service.clone());
        }
        args
    }

    fn invocation(&self, config: &StackConfig, args: Vec<String>) -> Invocation {
        let mut all_args = self.tool.base_args.clone();
        all_args.extend(args);
        let mut invocation =
            Invocation::new(&self.tool.program, all_args).with_timeout(self.tool.timeout);
        invocation.env = config
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        invocation
    }

    /// Bring the stack up and snapshot its services.
    pub fn up_stack(&self, config: &StackConfig, scope: ScopeKind) -> Result<StackState> {
        config.validate()?;
        info!(
            "starting stack '{}' (project '{}')",
            config.name, config.project
        );

        let output = self
            .runner
            .run(&self.invocation(config, Self::up_args(config)))?;
        if !output.success() {
            return Err(Error::Orchestration {
                project: config.project.clone(),
                operation: "up".to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let services = self.query_services(config)?;
        info!(
            "stack '{}' is up with {} service(s)",
            config.name,
            services.len()
        );
        Ok(StackState {
            name: config.name.clone(),
            project: config.project.clone(),
            scope,
            created_at: SystemTime::now(),
            services,
        })
    }

    /// Current service records as reported by `ps`.
    pub fn query_services(&self, config: &StackConfig) -> Result<BTreeMap<String, ServiceInfo>> {
        let output = self
            .runner
            .run(&self.invocation(config, Self::ps_args(config)))?;
        if !output.success() {
            return Err(Error::Orchestration {
                project: config.project.clone(),
                operation: "ps".to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(parse::parse_services_json(&output.stdout))
    }

    /// Tear the stack down. Safe to repeat: an already-stopped project is
    /// logged, not an error.
    pub fn down_stack(&self, config: &StackConfig) -> Result<()> {
        info!("stopping project '{}'", config.project);

        let output = self
            .runner
            .run(&self.invocation(config, Self::down_args(config)))?;
        if output.success() {
            return Ok(());
        }
        if is_already_gone(&output.stderr) {
            debug!("project '{}' already stopped", config.project);
            return Ok(());
        }
        Err(Error::Orchestration {
            project: config.project.clone(),
            operation: "down".to_string(),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        })
    }

    /// Best-effort log capture: one invocation, no retry, and any failure
    /// degrades to an empty string so a surrounding teardown never aborts.
    pub fn capture_logs(&self, config: &StackConfig, spec: &LogsSpec) -> String {
        if spec.follow {
            debug!("follow is not supported for a finite capture; ignoring");
        }

        let invocation = self.invocation(config, Self::logs_args(config, spec));
        match self.runner.run(&invocation) {
            Ok(output) if output.success() => output.stdout,
            Ok(output) => {
                warn!(
                    "log capture for project '{}' exited with {}: {}",
                    config.project,
                    output.code,
                    output.stderr.trim()
                );
                String::new()
            }
            Err(err) => {
                warn!("log capture for project '{}' failed: {err}", config.project);
                String::new()
            }
        }
    }

    /// Poll `ps` until every service named in `spec` reaches the target
    /// state, or fail with the services still pending.
    pub fn wait_for_services(&self, config: &StackConfig, spec: &WaitSpec) -> Result<ServiceState> {
        let poller = ReadinessPoller::new(self.clock.as_ref());
        poller.wait(&config.project, spec, || self.query_services(config))
    }
}

fn is_already_gone(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("no such") || stderr.contains("not found") || stderr.contains("no container")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ps_line, MockRunner};
    use std::path::PathBuf;

    fn sample_config() -> StackConfig {
        let mut config = StackConfig::new(
            "shop",
            "shop-ci",
            vec![
                PathBuf::from("compose.yml"),
                PathBuf::from("compose.ci.yml"),
            ],
        );
        config.env_files.push(PathBuf::from(".env.ci"));
        config
    }

    fn service_with(runner: Arc<MockRunner>) -> ComposeService {
        ComposeService::new(runner, ToolConfig::default())
    }

    #[test]
    fn up_args_are_deterministic() {
        let args = ComposeService::up_args(&sample_config());

        assert_eq!(
            args,
            vec![
                "-f",
                "compose.yml",
                "-f",
                "compose.ci.yml",
                "--env-file",
                ".env.ci",
                "-p",
                "shop-ci",
                "up",
                "-d",
            ]
        );
    }

    #[test]
    fn logs_args_include_tail_and_service() {
        let spec = LogsSpec {
            service: Some("web".to_string()),
            tail: Some(200),
            follow: false,
        };
        let args = ComposeService::logs_args(&sample_config(), &spec);

        assert!(args.ends_with(&[
            "logs".to_string(),
            "--no-color".to_string(),
            "--tail".to_string(),
            "200".to_string(),
            "web".to_string(),
        ]));
    }

    #[test]
    fn up_failure_carries_exit_code_and_stderr() {
        let mock = Arc::new(MockRunner::new());
        mock.push_failure("up", 17, "network unreachable");

        let result = service_with(mock).up_stack(&sample_config(), ScopeKind::Test);

        match result {
            Err(Error::Orchestration {
                project,
                operation,
                code,
                stderr,
            }) => {
                assert_eq!(project, "shop-ci");
                assert_eq!(operation, "up");
                assert_eq!(code, 17);
                assert_eq!(stderr, "network unreachable");
            }
            other => panic!("expected orchestration failure, got {other:?}"),
        }
    }

    #[test]
    fn up_snapshots_services_after_success() {
        let mock = Arc::new(MockRunner::new());
        mock.push_ps(&[
            ps_line("web", "running", "healthy"),
            ps_line("db", "running", ""),
        ]);

        let state = service_with(mock.clone())
            .up_stack(&sample_config(), ScopeKind::Suite)
            .unwrap();

        assert_eq!(state.scope, ScopeKind::Suite);
        assert_eq!(state.services.len(), 2);
        assert_eq!(state.services["web"].state, ServiceState::Healthy);
        assert_eq!(mock.verbs(), vec!["up", "ps"]);
    }

    #[test]
    fn invalid_config_fails_before_any_subprocess() {
        let mock = Arc::new(MockRunner::new());
        let config = StackConfig::new("shop", "shop-ci", vec![]);

        let result = service_with(mock.clone()).up_stack(&config, ScopeKind::Test);

        assert!(matches!(result, Err(Error::Configuration { .. })));
        assert!(mock.verbs().is_empty());
    }

    #[test]
    fn down_twice_never_raises_on_the_second_call() {
        let mock = Arc::new(MockRunner::new());
        // First down succeeds; the second reports the project as gone.
        mock.push_response("down", crate::domain::CommandOutput::ok(""));
        mock.push_response(
            "down",
            crate::domain::CommandOutput::failed(1, "no such project: shop-ci"),
        );
        let service = service_with(mock);

        assert!(service.down_stack(&sample_config()).is_ok());
        assert!(service.down_stack(&sample_config()).is_ok());
    }

    #[test]
    fn down_propagates_real_failures() {
        let mock = Arc::new(MockRunner::new());
        mock.push_failure("down", 125, "permission denied");

        let result = service_with(mock).down_stack(&sample_config());

        assert!(matches!(result, Err(Error::Orchestration { .. })));
    }

    #[test]
    fn capture_logs_degrades_to_empty_string() {
        let mock = Arc::new(MockRunner::new());
        mock.push_failure("logs", 1, "cannot connect to daemon");

        let logs = service_with(mock).capture_logs(&sample_config(), &LogsSpec::default());

        assert_eq!(logs, "");
    }

    #[test]
    fn capture_logs_returns_stdout() {
        let mock = Arc::new(MockRunner::new());
        mock.push_response("logs", crate::domain::CommandOutput::ok("web | booted\n"));

        let logs = service_with(mock).capture_logs(&sample_config(), &LogsSpec::default());

        assert_eq!(logs, "web | booted\n");
    }

    #[test]
    fn variables_are_passed_through_the_environment() {
        let mut config = sample_config();
        config
            .variables
            .insert("TAG".to_string(), "1.2.3".to_string());
        let mock = Arc::new(MockRunner::new());

        service_with(mock.clone()).down_stack(&config).unwrap();

        let invocations = mock.invocations();
        assert_eq!(
            invocations[0].env,
            vec![("TAG".to_string(), "1.2.3".to_string())]
        );
    }
}
