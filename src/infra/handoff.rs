//! Handoff of resolved stack state to test code.
//!
//! The record is a JSON file keyed by stack name, written once per scope
//! instantiation; a second up for the same scope overwrites it. Test code
//! finds it through [`STATE_FILE_ENV`] and reads host-exposed ports for a
//! named service at runtime.

use crate::domain::StackState;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the handoff record location.
pub const STATE_FILE_ENV: &str = "COMPOSEBOX_STATE_FILE";

/// Reads and writes the handoff record for one stack.
#[derive(Debug, Clone)]
pub struct HandoffStore {
    path: PathBuf,
}

impl HandoffStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the record path: an explicit override wins, then the
    /// `COMPOSEBOX_STATE_FILE` environment variable, then a per-stack file
    /// under the system temp directory.
    pub fn resolve(explicit: Option<PathBuf>, stack_name: &str) -> Self {
        let path = explicit
            .or_else(|| std::env::var_os(STATE_FILE_ENV).map(PathBuf::from))
            .unwrap_or_else(|| std::env::temp_dir().join(format!("composebox-{stack_name}.json")));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the record, replacing any previous one for this scope.
    pub fn write(&self, state: &StackState) -> Result<()> {
        let payload = serde_json::to_string_pretty(state).map_err(|err| self.error(err))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| self.error(err))?;
        }
        fs::write(&self.path, payload).map_err(|err| self.error(err))?;
        info!("handoff record written to {}", self.path.display());
        Ok(())
    }

    pub fn read(&self) -> Result<StackState> {
        let payload = fs::read_to_string(&self.path).map_err(|err| self.error(err))?;
        serde_json::from_str(&payload).map_err(|err| self.error(err))
    }

    /// Remove the record. A missing file is fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.error(err)),
        }
    }

    fn error(&self, err: impl std::fmt::Display) -> Error {
        Error::Handoff {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}
