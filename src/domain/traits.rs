use crate::error::Result;
use std::fmt::Debug;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// A single external command to execute: program, ordered arguments,
/// optional working directory, extra environment and execution timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
            current_dir: None,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Single-line rendering for logs and error messages.
    pub fn display_line(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Boundary to the orchestration tool's CLI.
///
/// Blocks until the process exits or the invocation's execution timeout
/// elapses. `Err` means the command could not run at all; a non-zero exit
/// is a normal `CommandOutput` and is interpreted by the caller.
pub trait CommandRunner: Send + Sync + Debug {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Time source for the readiness poller, injectable so tests can simulate
/// timeout and settlement without real delay.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by std.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_line_joins_program_and_args() {
        let invocation = Invocation::new("docker", vec!["compose".to_string(), "ps".to_string()]);
        assert_eq!(invocation.display_line(), "docker compose ps");
    }

    #[test]
    fn output_success_is_exit_zero() {
        assert!(CommandOutput::ok("").success());
        assert!(!CommandOutput::failed(1, "boom").success());
    }
}
