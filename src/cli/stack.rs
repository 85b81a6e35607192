//! Build-task surface: subcommands consuming `composebox.toml` and driving
//! the same lifecycle coordinator the in-process test guards use.

use crate::domain::{LogsSpec, ScopeKind};
use crate::infra::config::{load_config, AppConfig};
use crate::infra::SystemRunner;
use crate::services::{ComposeService, LifecycleCoordinator, ScopeOptions};
use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScopeArg {
    Suite,
    Test,
}

impl From<ScopeArg> for ScopeKind {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Suite => ScopeKind::Suite,
            ScopeArg::Test => ScopeKind::Test,
        }
    }
}

#[derive(Subcommand)]
pub enum StackAction {
    /// Start the stack, wait for readiness and write the handoff record
    Up {
        /// Skip the readiness wait even if the config defines one
        #[arg(long)]
        no_wait: bool,
        /// Lifecycle scope recorded in the handoff record
        #[arg(long, value_enum, default_value = "suite")]
        scope: ScopeArg,
    },
    /// Capture logs (if configured) and tear the stack down
    Down,
    /// Wait until the configured services reach their target state
    Wait,
    /// Capture stack logs to a file or stdout
    Logs {
        /// Only this service
        #[arg(long)]
        service: Option<String>,
        /// Maximum trailing lines per service
        #[arg(long)]
        tail: Option<u32>,
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show current service states and published ports
    Status,
}

pub fn run(action: StackAction, config_path: &Path, state_file: Option<PathBuf>) -> Result<()> {
    let app =
        load_config(config_path).with_context(|| format!("loading {}", config_path.display()))?;
    let runner = Arc::new(SystemRunner::new());
    let service = Arc::new(ComposeService::new(runner, app.tool.clone()));

    match action {
        StackAction::Up { no_wait, scope } => up(service, app, scope.into(), no_wait, state_file),
        StackAction::Down => down(service, app, state_file),
        StackAction::Wait => wait(&service, &app),
        StackAction::Logs {
            service: only,
            tail,
            output,
        } => logs(&service, app, only, tail, output),
        StackAction::Status => status(&service, &app),
    }
}

fn scope_options(
    app: AppConfig,
    scope: ScopeKind,
    state_file: Option<PathBuf>,
    include_wait: bool,
) -> ScopeOptions {
    ScopeOptions {
        config: app.stack,
        scope,
        wait: if include_wait { app.wait } else { None },
        logs: app.logs,
        state_file,
    }
}

fn up(
    service: Arc<ComposeService>,
    app: AppConfig,
    scope: ScopeKind,
    no_wait: bool,
    state_file: Option<PathBuf>,
) -> Result<()> {
    let options = scope_options(app, scope, state_file, !no_wait);
    let mut coordinator = LifecycleCoordinator::new(service, options);
    let state = coordinator.start()?;

    println!(
        "✅ stack '{}' is up ({} service(s))",
        state.name,
        state.services.len()
    );
    for (name, info) in &state.services {
        println!("- {:<16} | {:<10} | {}", name, info.state, ports_column(info));
    }
    println!("handoff record: {}", coordinator.state_path().display());
    Ok(())
}

fn down(service: Arc<ComposeService>, app: AppConfig, state_file: Option<PathBuf>) -> Result<()> {
    // Resume from the handoff record so teardown follows the exact path
    // the in-process guards use, including the configured log capture.
    let options = scope_options(app, ScopeKind::Suite, state_file, false);
    let mut coordinator = LifecycleCoordinator::resume(service, options);
    let report = coordinator.finish();

    if report.is_clean() {
        println!("✅ stack stopped");
    } else {
        for warning in &report.warnings {
            println!("⚠️  {warning}");
        }
    }
    Ok(())
}

fn wait(service: &ComposeService, app: &AppConfig) -> Result<()> {
    let Some(spec) = &app.wait else {
        bail!("no [wait] section configured for stack '{}'", app.stack.name);
    };
    let state = service.wait_for_services(&app.stack, spec)?;
    println!("✅ services {:?} reached {state}", spec.services);
    Ok(())
}

fn logs(
    service: &ComposeService,
    app: AppConfig,
    only: Option<String>,
    tail: Option<u32>,
    output: Option<PathBuf>,
) -> Result<()> {
    let configured = app.logs.unwrap_or_default();
    let spec = LogsSpec {
        service: only.or(configured.spec.service),
        tail: tail.or(configured.spec.tail),
        follow: false,
    };

    let text = service.capture_logs(&app.stack, &spec);
    match output.or(configured.destination) {
        Some(path) => {
            std::fs::write(&path, &text)
                .with_context(|| format!("writing logs to {}", path.display()))?;
            println!("logs written to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn status(service: &ComposeService, app: &AppConfig) -> Result<()> {
    let services = service.query_services(&app.stack)?;

    println!("📦 project '{}':", app.stack.project);
    if services.is_empty() {
        println!("no services running");
        return Ok(());
    }
    for (name, info) in &services {
        println!("- {:<16} | {:<10} | {}", name, info.state, ports_column(info));
    }
    Ok(())
}

fn ports_column(info: &crate::domain::ServiceInfo) -> String {
    if info.ports.is_empty() {
        return "-".to_string();
    }
    info.ports
        .iter()
        .map(|p| format!("{}->{}/{}", p.host_port, p.container_port, p.protocol))
        .collect::<Vec<_>>()
        .join(", ")
}
