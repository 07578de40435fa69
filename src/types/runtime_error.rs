use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Machine-facing failure category. Open for extension: categories the
/// runtime invents later round-trip through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCategory {
    ServerUnavailable,
    AuthInvalid,
    RuntimeInternal,
    Cancelled,
    Other(String),
}

impl ErrorCategory {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServerUnavailable => "server_unavailable",
            Self::AuthInvalid => "auth_invalid",
            Self::RuntimeInternal => "runtime_internal",
            Self::Cancelled => "cancelled",
            Self::Other(value) => value.as_str(),
        }
    }
}

impl From<String> for ErrorCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "server_unavailable" => Self::ServerUnavailable,
            "auth_invalid" => Self::AuthInvalid,
            "runtime_internal" => Self::RuntimeInternal,
            "cancelled" => Self::Cancelled,
            _ => Self::Other(value),
        }
    }
}

impl From<ErrorCategory> for String {
    fn from(value: ErrorCategory) -> Self {
        match value {
            ErrorCategory::Other(value) => value,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    Network,
    #[default]
    Runtime,
    Auth,
}

impl ErrorOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Runtime => "runtime",
            Self::Auth => "auth",
        }
    }
}

/// Canonical error envelope shared by the runtime server and the client.
///
/// Every value carries a human-readable `message` and a `stable_code` that
/// callers may match on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeError {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub origin: ErrorOrigin,
    #[serde(default)]
    pub stable_code: String,
}

impl RuntimeError {
    pub fn server_unavailable(path: &str) -> Self {
        Self {
            category: ErrorCategory::ServerUnavailable,
            message: "Runtime server is unavailable.".to_string(),
            hint: format!("Start the runtime server and retry {path}."),
            origin: ErrorOrigin::Network,
            stable_code: "runtime.server_unavailable".to_string(),
        }
    }

    /// Synthesizes an envelope for a non-2xx response whose body carried none.
    pub fn from_status(status: u16) -> Self {
        let (category, message, hint) = if matches!(status, 401 | 403) {
            (
                ErrorCategory::AuthInvalid,
                format!("Runtime rejected the request credentials (HTTP {status})."),
                "Check the runtime access token and retry.".to_string(),
            )
        } else {
            (
                ErrorCategory::RuntimeInternal,
                format!("Runtime returned HTTP {status}."),
                "Inspect the runtime server logs for details.".to_string(),
            )
        };

        Self {
            category,
            message,
            hint,
            origin: ErrorOrigin::Runtime,
            stable_code: format!("runtime.http_{status}"),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            category: ErrorCategory::Cancelled,
            message: "Action cancelled.".to_string(),
            hint: String::new(),
            origin: ErrorOrigin::Runtime,
            stable_code: "runtime.cancelled".to_string(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::RuntimeInternal,
            message: message.into(),
            hint: "Fix the request and retry.".to_string(),
            origin: ErrorOrigin::Runtime,
            stable_code: "runtime.invalid_request".to_string(),
        }
    }

    /// Reads an envelope out of a response body.
    ///
    /// Accepts both `{"runtime_error": {...}}` and a bare envelope. `category`
    /// and `message` must be strings; everything else falls back to defaults.
    pub fn from_envelope(body: &Value) -> Option<Self> {
        let envelope = match body.get("runtime_error") {
            Some(inner) if inner.is_object() => inner,
            _ => body,
        };

        let category = envelope.get("category")?.as_str()?.trim();
        let message = envelope.get("message")?.as_str()?;
        if category.is_empty() {
            return None;
        }

        let hint = string_field(envelope, "hint").unwrap_or_default();
        let origin = envelope
            .get("origin")
            .cloned()
            .and_then(|value| serde_json::from_value::<ErrorOrigin>(value).ok())
            .unwrap_or_default();
        let stable_code = string_field(envelope, "stable_code")
            .filter(|code| !code.trim().is_empty())
            .unwrap_or_else(|| format!("runtime.{category}"));

        Some(Self {
            category: ErrorCategory::from(category.to_string()),
            message: message.to_string(),
            hint,
            origin,
            stable_code,
        })
    }

    /// Human-readable lines in fixed order: category, message, hint, origin.
    pub fn status_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Category: {}", self.category),
            format!("Message: {}", self.message),
        ];
        if !self.hint.trim().is_empty() {
            lines.push(format!("Hint: {}", self.hint));
        }
        lines.push(format!("Origin: {}", self.origin.as_str()));
        lines
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

impl std::error::Error for RuntimeError {}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}
