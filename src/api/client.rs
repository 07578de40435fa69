use super::backend::{HttpBackend, HttpMethod, HttpRequest, ReqwestBackend, ResponseBody};
use super::error::TransportError;
use super::frame::RETURN_EVENT;
use super::logging::{debug_payload_enabled, emit_debug_payload};
use super::stream::{split_frames, FrameBuffer};
use crate::config::Config;
use crate::types::{RuntimeError, StreamFrame};
use anyhow::Result;
use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const ACTION_PATH: &str = "/api/action";
pub const DEFAULT_STREAM_PATH: &str = "/api/action/stream";
pub const MANIFEST_PATH: &str = "/api/ui";
pub const LOGS_PATH: &str = "/api/logs";
pub const TRACE_PATH: &str = "/api/trace";
pub const METRICS_PATH: &str = "/api/metrics";

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub method: HttpMethod,
    pub body: Option<Value>,
    pub cancel: Option<CancellationToken>,
}

impl FetchOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Per-call options for [`RuntimeClient::post_sse`]. Every frame other than
/// `return` is sent to `events` as soon as it is decoded.
#[derive(Debug, Default)]
pub struct SseOptions {
    pub cancel: Option<CancellationToken>,
    pub events: Option<mpsc::UnboundedSender<StreamFrame>>,
}

#[derive(Clone)]
pub struct RuntimeClient {
    backend: Arc<dyn HttpBackend>,
    base_url: String,
    auth_token: Option<String>,
}

impl RuntimeClient {
    pub fn new(config: &Config) -> Result<Self> {
        let backend = ReqwestBackend::new(Some(config.connect_timeout()))?;
        Ok(Self::with_backend(&config.base_url, Arc::new(backend))
            .with_auth_token(config.auth_token.clone()))
    }

    pub fn with_backend(base_url: &str, backend: Arc<dyn HttpBackend>) -> Self {
        Self {
            backend,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, auth_token: Option<String>) -> Self {
        self.auth_token = auth_token.filter(|token| !token.trim().is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    /// Issues a request and decodes the JSON body.
    ///
    /// A parseable body is returned as-is whatever the status; callers branch
    /// on its own `ok` field. An unparseable body is `{}` on a 2xx status and
    /// a synthesized `auth_invalid`/`runtime_internal` error otherwise.
    pub async fn fetch_json(
        &self,
        path: &str,
        options: FetchOptions,
    ) -> Result<Value, TransportError> {
        let cancel = options.cancel.as_ref();
        let request = self.build_request(path, options.method, options.body, false)?;

        let response = cancellable(cancel, self.backend.send(request))
            .await?
            .map_err(|error| {
                tracing::debug!(path, error = %error, "runtime request failed");
                TransportError::network_unavailable(path)
            })?;
        let status = response.status;
        let success = response.is_success();

        let bytes = cancellable(cancel, response.into_bytes())
            .await?
            .map_err(|error| {
                tracing::debug!(path, error = %error, "runtime response body failed");
                TransportError::network_unavailable(path)
            })?;

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(payload) => Ok(payload),
            Err(error) if success => {
                tracing::warn!(
                    path,
                    status,
                    error = %error,
                    "runtime returned a non-JSON body; treating it as {{}}"
                );
                Ok(json!({}))
            }
            Err(_) => Err(TransportError::http_status(status, None)),
        }
    }

    pub async fn post_json<B>(&self, path: &str, body: &B) -> Result<Value, TransportError>
    where
        B: Serialize + ?Sized,
    {
        let body = encode_body(body)?;
        self.fetch_json(path, FetchOptions::post(body)).await
    }

    /// Streaming POST with `Accept: text/event-stream`.
    ///
    /// Frames are decoded as soon as their blank line arrives. `return`
    /// frames set the result; every other frame is forwarded to
    /// `options.events`. Resolves with the last `return` payload, or `{}`.
    /// When the cancellation token fires the body reader is dropped and
    /// [`TransportError::aborted`] is returned; frames already forwarded stay
    /// forwarded.
    pub async fn post_sse<B>(
        &self,
        path: &str,
        body: &B,
        options: SseOptions,
    ) -> Result<Value, TransportError>
    where
        B: Serialize + ?Sized,
    {
        let cancel = options.cancel.as_ref();
        let body = encode_body(body)?;
        let request = self.build_request(path, HttpMethod::Post, Some(body), true)?;

        let response = cancellable(cancel, self.backend.send(request))
            .await?
            .map_err(|error| {
                tracing::debug!(path, error = %error, "runtime stream request failed");
                TransportError::network_unavailable(path)
            })?;

        if !response.is_success() {
            let status = response.status;
            let bytes = cancellable(cancel, response.into_bytes())
                .await?
                .unwrap_or_default();
            let payload = serde_json::from_slice::<Value>(&bytes).ok();
            if let Some(runtime_error) = payload.as_ref().and_then(RuntimeError::from_envelope) {
                return Err(TransportError::runtime_domain(status, runtime_error, payload));
            }
            return Err(TransportError::http_status(status, payload));
        }

        let mut dispatcher = FrameDispatcher::new(options.events.as_ref());
        match response.body {
            ResponseBody::Buffered(bytes) => {
                for frame in split_frames(&bytes) {
                    dispatcher.dispatch(frame);
                }
            }
            ResponseBody::Stream(mut stream) => {
                let mut buffer = FrameBuffer::new();
                while let Some(chunk) = cancellable(cancel, stream.next()).await? {
                    let chunk = chunk.map_err(|error| {
                        tracing::debug!(path, error = %error, "runtime stream broke off");
                        TransportError::network_unavailable(path)
                    })?;
                    for frame in buffer.process(&chunk) {
                        dispatcher.dispatch(frame);
                    }
                }
                if let Some(frame) = buffer.flush() {
                    dispatcher.dispatch(frame);
                }
            }
        }

        Ok(dispatcher.finish())
    }

    pub async fn fetch_manifest(&self) -> Result<Value, TransportError> {
        self.fetch_json(MANIFEST_PATH, FetchOptions::get()).await
    }

    fn build_request(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<Value>,
        event_stream: bool,
    ) -> Result<HttpRequest, TransportError> {
        let url = self
            .endpoint(path)
            .ok_or_else(|| TransportError::invalid_request("Request path is empty."))?;

        let mut headers = Vec::new();
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        if event_stream {
            headers.push(("accept".to_string(), EVENT_STREAM.to_string()));
        }
        if let Some(token) = &self.auth_token {
            headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }

        if let Some(payload) = &body {
            if debug_payload_enabled() {
                emit_debug_payload(&url, payload);
            }
        }

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }
}

struct FrameDispatcher<'a> {
    events: Option<&'a mpsc::UnboundedSender<StreamFrame>>,
    result: Option<Value>,
}

impl<'a> FrameDispatcher<'a> {
    fn new(events: Option<&'a mpsc::UnboundedSender<StreamFrame>>) -> Self {
        Self {
            events,
            result: None,
        }
    }

    fn dispatch(&mut self, frame: StreamFrame) {
        if frame.event == RETURN_EVENT {
            self.result = Some(frame.data);
            return;
        }
        if let Some(events) = self.events {
            // A dropped receiver only means nobody is watching progress.
            let _ = events.send(frame);
        }
    }

    fn finish(self) -> Value {
        self.result
            .filter(|payload| !payload.is_null())
            .unwrap_or_else(|| json!({}))
    }
}

/// Runs `future` unless `cancel` fires first.
async fn cancellable<F>(
    cancel: Option<&CancellationToken>,
    future: F,
) -> Result<F::Output, TransportError>
where
    F: Future,
{
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransportError::aborted()),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}

fn encode_body<B>(body: &B) -> Result<Value, TransportError>
where
    B: Serialize + ?Sized,
{
    serde_json::to_value(body).map_err(|error| {
        TransportError::invalid_request(format!("Request body could not be encoded: {error}"))
    })
}
