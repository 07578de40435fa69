use super::store::{CachedError, SessionStore};
use crate::api::{FetchOptions, RuntimeClient, LOGS_PATH, METRICS_PATH, TRACE_PATH};
use crate::types::{ActionResult, ErrorCategory, ErrorOrigin, RuntimeError};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

const MANIFEST_UNAVAILABLE: &str = "Runtime manifest could not be loaded.";

/// Handles to the observability refreshes started by
/// [`Reconciler::apply_action_result`]. Dropping it detaches the tasks.
#[derive(Debug, Default)]
pub struct RefreshTasks {
    handles: Vec<JoinHandle<()>>,
}

impl RefreshTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every refresh to settle. Refresh failures are already
    /// swallowed, so this only reports nothing.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(error) = handle.await {
                tracing::debug!(error = %error, "observability refresh task did not finish");
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Refresh {
    Logs,
    Spans,
    Metrics,
}

impl Refresh {
    const ALL: [Refresh; 3] = [Refresh::Logs, Refresh::Spans, Refresh::Metrics];

    fn path(self) -> &'static str {
        match self {
            Refresh::Logs => LOGS_PATH,
            Refresh::Spans => TRACE_PATH,
            Refresh::Metrics => METRICS_PATH,
        }
    }

    /// Writes the useful part of `payload`, if any. Missing or malformed
    /// sections leave the cached copy alone.
    fn apply(self, store: &SessionStore, payload: Value) {
        match self {
            Refresh::Logs => {
                if let Some(Value::Array(logs)) = take_field(payload, "logs") {
                    store.set_logs(logs);
                }
            }
            Refresh::Spans => {
                if let Some(Value::Array(spans)) = take_field(payload, "spans") {
                    store.set_spans(spans);
                }
            }
            Refresh::Metrics => {
                if payload.is_object() && payload.get("ok") != Some(&Value::Bool(false)) {
                    store.set_metrics(payload);
                }
            }
        }
    }
}

/// Projects action outcomes into the [`SessionStore`] and keeps the
/// observability sections fresh.
#[derive(Clone)]
pub struct Reconciler {
    client: RuntimeClient,
    store: Arc<SessionStore>,
}

impl Reconciler {
    pub fn new(client: RuntimeClient, store: Arc<SessionStore>) -> Self {
        Self { client, store }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Caches traces and the last error, then starts the logs, spans and
    /// metrics refreshes. Never fails. Outside a tokio runtime no refresh
    /// is started.
    pub fn apply_action_result(&self, result: &ActionResult) -> RefreshTasks {
        if let Some(traces) = result.traces() {
            self.store.replace_traces(traces.to_vec());
        }

        self.store.cache_action_error(CachedError::from_action(result));

        self.spawn_refreshes()
    }

    /// Loads `GET /api/ui` into the store. A failure is cached as a
    /// manifest-kind error, which later action outcomes do not replace.
    pub async fn refresh_manifest(&self) -> Result<Value, RuntimeError> {
        let outcome = match self.client.fetch_manifest().await {
            Ok(payload) if payload.get("ok") == Some(&Value::Bool(false)) => {
                Err(manifest_failure(&payload))
            }
            Ok(payload) => Ok(manifest_from_payload(payload)),
            Err(error) => Err(error.runtime_error),
        };

        match outcome {
            Ok(manifest) => {
                self.store.apply_manifest(manifest.clone());
                self.store.clear_manifest_error();
                Ok(manifest)
            }
            Err(runtime_error) => {
                tracing::warn!(code = %runtime_error.stable_code, "manifest load failed");
                self.store
                    .set_last_error(Some(CachedError::manifest(runtime_error.clone())));
                Err(runtime_error)
            }
        }
    }

    fn spawn_refreshes(&self) -> RefreshTasks {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no tokio runtime; skipping observability refresh");
            return RefreshTasks::default();
        };

        let handles = Refresh::ALL
            .into_iter()
            .map(|refresh| {
                let client = self.client.clone();
                let store = Arc::clone(&self.store);
                handle.spawn(async move {
                    let path = refresh.path();
                    match client.fetch_json(path, FetchOptions::get()).await {
                        Ok(payload) => refresh.apply(&store, payload),
                        Err(error) => {
                            tracing::debug!(path, error = %error, "observability refresh failed");
                        }
                    }
                })
            })
            .collect();

        RefreshTasks { handles }
    }
}

fn take_field(payload: Value, key: &str) -> Option<Value> {
    match payload {
        Value::Object(mut body) => body.remove(key),
        _ => None,
    }
}

fn manifest_from_payload(payload: Value) -> Value {
    match payload {
        Value::Object(mut body) if body.get("ui").is_some_and(Value::is_object) => {
            body.remove("ui").unwrap_or_default()
        }
        other => other,
    }
}

fn manifest_failure(payload: &Value) -> RuntimeError {
    if let Some(runtime_error) = RuntimeError::from_envelope(payload) {
        return runtime_error;
    }
    let message = payload
        .get("error")
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .unwrap_or(MANIFEST_UNAVAILABLE);
    RuntimeError {
        category: ErrorCategory::RuntimeInternal,
        message: message.to_string(),
        hint: "Fix the runtime flow and reload the manifest.".to_string(),
        origin: ErrorOrigin::Runtime,
        stable_code: "runtime.manifest_unavailable".to_string(),
    }
}
