pub mod control;
pub mod executor;

pub use control::{ActionControl, ExecutionState, RunningGuard};
pub use executor::{ActionExecutor, ExecuteOptions, StreamMode};
