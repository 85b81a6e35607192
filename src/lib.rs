pub mod cli;
pub mod domain;
pub mod error;
pub mod infra;
pub mod parse;
pub mod services;

// Make test_support available for integration tests
// In a real production crate, we might use a feature flag "test-utils"
pub mod test_support;

pub use domain::{
    Clock, CommandOutput, CommandRunner, Invocation, LogsSpec, PortMapping, ScopeKind,
    ServiceInfo, ServiceState, StackConfig, StackState, SystemClock, WaitSpec,
};
pub use error::{Error, Result};
pub use infra::{HandoffStore, SystemRunner, STATE_FILE_ENV};
pub use services::{
    ComposeService, LifecycleCoordinator, LogsCapture, ReadinessPoller, ScopeOptions, ScopePhase,
    SharedStack, StackGuard, TeardownReport, ToolConfig,
};
