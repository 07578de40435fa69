mod api;
mod runtime_error;

pub use api::{
    ActionFailure, ActionRequest, ActionResult, ActionSuccess, StreamFrame,
    ACTION_ALREADY_RUNNING, ACTION_CANCELLED, NO_ACTION_SELECTED,
};
pub use runtime_error::{ErrorCategory, ErrorOrigin, RuntimeError};
