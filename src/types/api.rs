use super::runtime_error::RuntimeError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const NO_ACTION_SELECTED: &str = "No action selected.";
pub const ACTION_ALREADY_RUNNING: &str = "Action already running.";
pub const ACTION_CANCELLED: &str = "Action cancelled.";
const ACTION_FAILED: &str = "Action failed.";

/// Body of `POST /api/action` and of the streaming endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: String,
    pub payload: Value,
}

/// One decoded event-stream frame. `data` is `Null` when the frame had no
/// data lines or they were not valid JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    pub event: String,
    pub data: Value,
}

impl StreamFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionSuccess {
    pub ui: Option<Value>,
    pub traces: Option<Vec<Value>>,
    /// Remaining top-level fields of the response (`output`, ...).
    pub extra: Map<String, Value>,
}

/// A failed action. Always carries a non-empty `error` string, and the
/// runtime's envelope when one was available.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionFailure {
    runtime_error: Option<RuntimeError>,
    error: String,
    traces: Option<Vec<Value>>,
}

impl ActionFailure {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            runtime_error: None,
            error: non_empty_or(error.into(), ACTION_FAILED),
            traces: None,
        }
    }

    pub fn runtime(runtime_error: RuntimeError) -> Self {
        let error = non_empty_or(runtime_error.message.clone(), ACTION_FAILED);
        Self {
            runtime_error: Some(runtime_error),
            error,
            traces: None,
        }
    }

    pub fn with_traces(mut self, traces: Option<Vec<Value>>) -> Self {
        self.traces = traces;
        self
    }

    pub fn runtime_error(&self) -> Option<&RuntimeError> {
        self.runtime_error.as_ref()
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn traces(&self) -> Option<&[Value]> {
        self.traces.as_deref()
    }

    pub fn status_lines(&self) -> Vec<String> {
        match &self.runtime_error {
            Some(runtime_error) => runtime_error.status_lines(),
            None => vec![self.error.clone()],
        }
    }
}

/// Outcome of one action invocation. Created per call and never retained;
/// only its projections are written into the session store.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Succeeded(ActionSuccess),
    Failed(ActionFailure),
    Cancelled,
}

impl ActionResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed(ActionFailure::message(error))
    }

    /// Classifies a JSON body returned by the transport. Only an explicit
    /// `"ok": false` counts as failure; anything else (including `{}`) is
    /// a success.
    pub fn from_payload(payload: Value) -> Self {
        let Value::Object(mut body) = payload else {
            return Self::Succeeded(ActionSuccess::default());
        };

        let traces = take_traces(&mut body);

        if body.get("ok") == Some(&Value::Bool(false)) {
            if body.get("cancelled") == Some(&Value::Bool(true)) {
                return Self::Cancelled;
            }

            let envelope = Value::Object(body);
            let error_text = envelope
                .get("error")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string);
            let failure = match (RuntimeError::from_envelope(&envelope), error_text) {
                (Some(runtime_error), Some(error_text)) => ActionFailure {
                    error: error_text,
                    runtime_error: Some(runtime_error),
                    traces: None,
                },
                (Some(runtime_error), None) => ActionFailure::runtime(runtime_error),
                (None, Some(error_text)) => ActionFailure::message(error_text),
                (None, None) => ActionFailure::message(ACTION_FAILED),
            };
            return Self::Failed(failure.with_traces(traces));
        }

        body.remove("ok");
        let ui = body.remove("ui").filter(|ui| !ui.is_null());
        Self::Succeeded(ActionSuccess {
            ui,
            traces,
            extra: body,
        })
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn ui(&self) -> Option<&Value> {
        match self {
            Self::Succeeded(success) => success.ui.as_ref(),
            _ => None,
        }
    }

    pub fn traces(&self) -> Option<&[Value]> {
        match self {
            Self::Succeeded(success) => success.traces.as_deref(),
            Self::Failed(failure) => failure.traces(),
            Self::Cancelled => None,
        }
    }

    pub fn runtime_error(&self) -> Option<&RuntimeError> {
        match self {
            Self::Failed(failure) => failure.runtime_error(),
            _ => None,
        }
    }

    /// The failure text; `None` on success.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Succeeded(_) => None,
            Self::Failed(failure) => Some(failure.error()),
            Self::Cancelled => Some(ACTION_CANCELLED),
        }
    }

    pub fn status_lines(&self) -> Vec<String> {
        match self {
            Self::Succeeded(_) => Vec::new(),
            Self::Failed(failure) => failure.status_lines(),
            Self::Cancelled => vec![ACTION_CANCELLED.to_string()],
        }
    }

    /// Wire projection: `{ok, ui?, traces?, runtime_error?, cancelled?, error?}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Succeeded(success) => {
                let mut body = success.extra.clone();
                body.insert("ok".to_string(), Value::Bool(true));
                if let Some(ui) = &success.ui {
                    body.insert("ui".to_string(), ui.clone());
                }
                if let Some(traces) = &success.traces {
                    body.insert("traces".to_string(), Value::Array(traces.clone()));
                }
                Value::Object(body)
            }
            Self::Failed(failure) => {
                let mut body = Map::new();
                body.insert("ok".to_string(), Value::Bool(false));
                body.insert("error".to_string(), Value::String(failure.error.clone()));
                if let Some(runtime_error) = &failure.runtime_error {
                    body.insert("runtime_error".to_string(), json!(runtime_error));
                }
                if let Some(traces) = &failure.traces {
                    body.insert("traces".to_string(), Value::Array(traces.clone()));
                }
                Value::Object(body)
            }
            Self::Cancelled => json!({
                "ok": false,
                "cancelled": true,
                "error": ACTION_CANCELLED,
            }),
        }
    }
}

fn take_traces(body: &mut Map<String, Value>) -> Option<Vec<Value>> {
    match body.remove("traces") {
        Some(Value::Array(traces)) => Some(traces),
        Some(other) => {
            body.insert("traces".to_string(), other);
            None
        }
        None => None,
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
