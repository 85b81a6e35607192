pub mod config;
pub mod handoff;
pub mod process;

pub use handoff::{HandoffStore, STATE_FILE_ENV};
pub use process::SystemRunner;
