mod compose_service;
mod coordinator;
mod guard;
mod poller;

pub use compose_service::{ComposeService, ToolConfig};
pub use coordinator::{
    LifecycleCoordinator, LogsCapture, ScopeOptions, ScopePhase, TeardownReport,
};
pub use guard::{SharedStack, StackGuard};
pub use poller::ReadinessPoller;
