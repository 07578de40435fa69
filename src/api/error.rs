use crate::types::{ErrorCategory, RuntimeError};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request itself failed, or the body broke off mid-read.
    NetworkUnavailable,
    /// Non-2xx response without a usable error envelope.
    HttpStatus,
    /// The caller's cancellation token fired.
    StreamAborted,
    /// The server answered with an explicit `runtime_error` envelope.
    RuntimeDomain,
    /// The request could not be built (empty path, unserializable body).
    InvalidRequest,
}

/// The only error the transport raises. Always carries a normalized
/// [`RuntimeError`], plus the HTTP status and decoded body when known.
#[derive(Debug, Clone, Error)]
#[error("{runtime_error}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub runtime_error: RuntimeError,
    pub status: Option<u16>,
    pub payload: Option<Value>,
}

impl TransportError {
    pub fn network_unavailable(path: &str) -> Self {
        Self {
            kind: TransportErrorKind::NetworkUnavailable,
            runtime_error: RuntimeError::server_unavailable(path),
            status: None,
            payload: None,
        }
    }

    pub fn http_status(status: u16, payload: Option<Value>) -> Self {
        Self {
            kind: TransportErrorKind::HttpStatus,
            runtime_error: RuntimeError::from_status(status),
            status: Some(status),
            payload,
        }
    }

    pub fn runtime_domain(
        status: u16,
        runtime_error: RuntimeError,
        payload: Option<Value>,
    ) -> Self {
        Self {
            kind: TransportErrorKind::RuntimeDomain,
            runtime_error,
            status: Some(status),
            payload,
        }
    }

    pub fn aborted() -> Self {
        Self {
            kind: TransportErrorKind::StreamAborted,
            runtime_error: RuntimeError::cancelled(),
            status: None,
            payload: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::InvalidRequest,
            runtime_error: RuntimeError::invalid_request(message),
            status: None,
            payload: None,
        }
    }

    pub fn category(&self) -> &ErrorCategory {
        &self.runtime_error.category
    }

    pub fn is_aborted(&self) -> bool {
        self.kind == TransportErrorKind::StreamAborted
    }
}
