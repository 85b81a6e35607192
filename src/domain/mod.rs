mod stack;
pub mod traits;
mod wait;

pub use stack::{PortMapping, ScopeKind, ServiceInfo, ServiceState, StackConfig, StackState};
pub use traits::{Clock, CommandOutput, CommandRunner, Invocation, SystemClock};
pub use wait::{LogsSpec, WaitSpec};
