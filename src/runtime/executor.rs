use super::control::{ActionControl, ExecutionState};
use crate::api::{RuntimeClient, SseOptions, ACTION_PATH, DEFAULT_STREAM_PATH};
use crate::state::{Reconciler, RefreshTasks, SessionStore};
use crate::types::{
    ActionFailure, ActionRequest, ActionResult, StreamFrame, ACTION_ALREADY_RUNNING,
    NO_ACTION_SELECTED,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Selects the event-stream wire mode for one invocation.
#[derive(Debug, Clone)]
pub struct StreamMode {
    pub path: String,
    pub cancel: Option<CancellationToken>,
    pub events: Option<mpsc::UnboundedSender<StreamFrame>>,
}

impl Default for StreamMode {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_PATH)
    }
}

impl StreamMode {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cancel: None,
            events: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<StreamFrame>) -> Self {
        self.events = Some(events);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Control disabled for the duration of the call.
    pub control: Option<ActionControl>,
    /// `None` sends a plain JSON request.
    pub stream: Option<StreamMode>,
}

impl ExecuteOptions {
    pub fn with_control(mut self, control: ActionControl) -> Self {
        self.control = Some(control);
        self
    }

    pub fn with_stream(mut self, stream: StreamMode) -> Self {
        self.stream = Some(stream);
        self
    }
}

/// Runs named actions against the runtime. Every outcome, including
/// transport failures and cancellation, comes back as an [`ActionResult`].
#[derive(Clone)]
pub struct ActionExecutor {
    client: RuntimeClient,
    store: Arc<SessionStore>,
    reconciler: Reconciler,
    action_path: String,
}

impl ActionExecutor {
    pub fn new(client: RuntimeClient, store: Arc<SessionStore>) -> Self {
        let reconciler = Reconciler::new(client.clone(), Arc::clone(&store));
        Self {
            client,
            store,
            reconciler,
            action_path: ACTION_PATH.to_string(),
        }
    }

    pub fn with_action_path(mut self, action_path: impl Into<String>) -> Self {
        self.action_path = action_path.into();
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub async fn execute_action(
        &self,
        action_id: &str,
        payload: Value,
        options: ExecuteOptions,
    ) -> ActionResult {
        if action_id.is_empty() {
            return ActionResult::failed(NO_ACTION_SELECTED);
        }

        let guard = match &options.control {
            Some(control) => match control.try_begin() {
                Some(guard) => Some(guard),
                None => {
                    tracing::debug!(action = action_id, "control busy; invocation refused");
                    return ActionResult::failed(ACTION_ALREADY_RUNNING);
                }
            },
            None => None,
        };

        let span = tracing::info_span!(
            "action",
            id = action_id,
            streaming = options.stream.is_some()
        );
        let result = self
            .dispatch(action_id, payload, options.stream)
            .instrument(span)
            .await;

        if let Some(ui) = result.ui() {
            self.store.apply_manifest(ui.clone());
        }

        if let Some(guard) = guard {
            guard.finish(settled_state(&result));
        }
        result
    }

    /// [`Self::execute_action`] followed by reconciliation of the outcome.
    pub async fn run_action(
        &self,
        action_id: &str,
        payload: Value,
        options: ExecuteOptions,
    ) -> (ActionResult, RefreshTasks) {
        let result = self.execute_action(action_id, payload, options).await;
        let refreshes = self.reconciler.apply_action_result(&result);
        (result, refreshes)
    }

    async fn dispatch(
        &self,
        action_id: &str,
        payload: Value,
        stream: Option<StreamMode>,
    ) -> ActionResult {
        let request = ActionRequest {
            id: action_id.to_string(),
            payload,
        };

        let response = match stream {
            Some(mode) => {
                let options = SseOptions {
                    cancel: mode.cancel,
                    events: mode.events,
                };
                self.client.post_sse(&mode.path, &request, options).await
            }
            None => self.client.post_json(&self.action_path, &request).await,
        };

        match response {
            Ok(body) => {
                let result = ActionResult::from_payload(body);
                tracing::info!(ok = result.is_ok(), "action finished");
                result
            }
            Err(error) if error.is_aborted() => {
                tracing::info!("action cancelled");
                ActionResult::Cancelled
            }
            Err(error) => {
                tracing::warn!(code = %error.runtime_error.stable_code, "action failed: {error}");
                ActionResult::Failed(ActionFailure::runtime(error.runtime_error))
            }
        }
    }
}

fn settled_state(result: &ActionResult) -> ExecutionState {
    match result {
        ActionResult::Succeeded(_) => ExecutionState::Succeeded,
        ActionResult::Failed(_) => ExecutionState::Failed,
        ActionResult::Cancelled => ExecutionState::Cancelled,
    }
}
