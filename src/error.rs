use crate::domain::ServiceState;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for stack orchestration.
///
/// `Configuration` is raised before any subprocess is spawned; `Timeout`
/// carries the last observed state of every service that never settled, so
/// the caller can report exactly what was still pending.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration ({context}): {reason}")]
    Configuration { context: String, reason: String },

    #[error("'{operation}' failed for project '{project}' (exit code {code}): {stderr}")]
    Orchestration {
        project: String,
        operation: String,
        code: i32,
        stderr: String,
    },

    #[error(
        "timed out after {:?} waiting for project '{}', services not ready: {}",
        .timeout,
        .project,
        format_pending(.pending)
    )]
    Timeout {
        project: String,
        timeout: Duration,
        pending: Vec<(String, ServiceState)>,
    },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' did not exit within {timeout:?}")]
    CommandTimeout { program: String, timeout: Duration },

    #[error("handoff record {}: {}", .path.display(), .reason)]
    Handoff { path: PathBuf, reason: String },
}

fn format_pending(pending: &[(String, ServiceState)]) -> String {
    pending
        .iter()
        .map(|(name, state)| format!("{name} ({state})"))
        .collect::<Vec<_>>()
        .join(", ")
}
