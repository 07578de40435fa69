use crate::types::{ActionResult, RuntimeError};
use serde_json::Value;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use tokio::sync::broadcast;

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Where a cached error came from. Manifest errors are sticky: action
/// outcomes neither replace nor clear them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Manifest,
    Action,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedError {
    pub kind: ErrorKind,
    pub message: String,
    pub runtime_error: Option<RuntimeError>,
}

impl CachedError {
    pub fn manifest(runtime_error: RuntimeError) -> Self {
        Self {
            kind: ErrorKind::Manifest,
            message: runtime_error.message.clone(),
            runtime_error: Some(runtime_error),
        }
    }

    /// The cached form of a failed or cancelled action; `None` on success.
    pub fn from_action(result: &ActionResult) -> Option<Self> {
        let message = result.error()?.to_string();
        Some(Self {
            kind: ErrorKind::Action,
            message,
            runtime_error: result.runtime_error().cloned(),
        })
    }

    pub fn is_manifest(&self) -> bool {
        self.kind == ErrorKind::Manifest
    }

    pub fn status_lines(&self) -> Vec<String> {
        match &self.runtime_error {
            Some(runtime_error) => runtime_error.status_lines(),
            None => vec![self.message.clone()],
        }
    }
}

/// Published after every write. Subscribers re-read the store and redraw
/// the named section in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreUpdate {
    Manifest,
    Traces,
    LastError,
    Logs,
    Spans,
    Metrics,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub manifest: Option<Value>,
    pub traces: Vec<Value>,
    pub last_error: Option<CachedError>,
    pub logs: Vec<Value>,
    pub spans: Vec<Value>,
    pub metrics: Option<Value>,
}

/// Session-lifetime cache of the latest manifest, traces, error and
/// observability data. Written by the executor and reconciler only;
/// everything else reads clones. Locks are never held across an await.
pub struct SessionStore {
    state: RwLock<SessionSnapshot>,
    updates: broadcast::Sender<StoreUpdate>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(SessionSnapshot::default()),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.read().clone()
    }

    pub fn manifest(&self) -> Option<Value> {
        self.read().manifest.clone()
    }

    pub fn traces(&self) -> Vec<Value> {
        self.read().traces.clone()
    }

    pub fn last_error(&self) -> Option<CachedError> {
        self.read().last_error.clone()
    }

    pub fn logs(&self) -> Vec<Value> {
        self.read().logs.clone()
    }

    pub fn spans(&self) -> Vec<Value> {
        self.read().spans.clone()
    }

    pub fn metrics(&self) -> Option<Value> {
        self.read().metrics.clone()
    }

    pub fn apply_manifest(&self, manifest: Value) {
        self.write(StoreUpdate::Manifest, |state| state.manifest = Some(manifest));
    }

    /// Replaces the cached trace list wholesale.
    pub fn replace_traces(&self, traces: Vec<Value>) {
        self.write(StoreUpdate::Traces, |state| state.traces = traces);
    }

    pub fn set_last_error(&self, error: Option<CachedError>) {
        self.write(StoreUpdate::LastError, |state| state.last_error = error);
    }

    /// Caches an action outcome's error, or clears the cached one, unless a
    /// manifest error is cached. Check and write happen under one lock.
    pub fn cache_action_error(&self, error: Option<CachedError>) {
        self.write(StoreUpdate::LastError, |state| {
            let manifest_cached = state
                .last_error
                .as_ref()
                .is_some_and(CachedError::is_manifest);
            if !manifest_cached {
                state.last_error = error;
            }
        });
    }

    /// Drops the cached error if, and only if, it is a manifest error.
    pub fn clear_manifest_error(&self) {
        self.write(StoreUpdate::LastError, |state| {
            if state.last_error.as_ref().is_some_and(CachedError::is_manifest) {
                state.last_error = None;
            }
        });
    }

    pub fn set_logs(&self, logs: Vec<Value>) {
        self.write(StoreUpdate::Logs, |state| state.logs = logs);
    }

    pub fn set_spans(&self, spans: Vec<Value>) {
        self.write(StoreUpdate::Spans, |state| state.spans = spans);
    }

    pub fn set_metrics(&self, metrics: Value) {
        self.write(StoreUpdate::Metrics, |state| state.metrics = Some(metrics));
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionSnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, update: StoreUpdate, apply: impl FnOnce(&mut SessionSnapshot)) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            apply(&mut state);
        }
        // No subscribers is fine; the data is still cached.
        let _ = self.updates.send(update);
    }
}
