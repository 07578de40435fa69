mod common;

use actionwire::api::{
    MockBackend, MockResponse, ReqwestBackend, RuntimeClient, ACTION_PATH, DEFAULT_STREAM_PATH,
    LOGS_PATH, MANIFEST_PATH, METRICS_PATH, TRACE_PATH,
};
use actionwire::runtime::{
    ActionControl, ActionExecutor, ExecuteOptions, ExecutionState, StreamMode,
};
use actionwire::state::{ErrorKind, SessionStore};
use actionwire::types::{ErrorCategory, StreamFrame};
use bytes::Bytes;
use common::{serve_once, unused_base_url, Reply};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const CHAT_SCENARIO: &str = "event: token\ndata: {\"output\":\"Hi\"}\n\nevent: return\ndata: {\"ok\":true,\"output\":\"Hi\"}\n\n";

fn mock_executor(backend: &MockBackend) -> ActionExecutor {
    let client = RuntimeClient::with_backend("http://127.0.0.1:8787", Arc::new(backend.clone()));
    ActionExecutor::new(client, Arc::new(SessionStore::new()))
}

fn network_executor(base_url: &str) -> ActionExecutor {
    let backend = ReqwestBackend::new(Some(Duration::from_secs(2))).expect("http client");
    let client = RuntimeClient::with_backend(base_url, Arc::new(backend));
    ActionExecutor::new(client, Arc::new(SessionStore::new()))
}

#[tokio::test]
async fn test_no_action_selected_issues_no_request() {
    let backend = MockBackend::new();
    let (result, refreshes) = mock_executor(&backend)
        .run_action("", json!({}), ExecuteOptions::default())
        .await;
    refreshes.join().await;

    assert_eq!(
        result.to_json(),
        json!({"ok": false, "error": "No action selected."})
    );
    assert!(backend.requests_to(ACTION_PATH).is_empty());
    assert!(backend.requests_to(DEFAULT_STREAM_PATH).is_empty());
}

#[tokio::test]
async fn test_unreachable_runtime_resolves_to_failure() {
    let executor = network_executor(&unused_base_url().await);
    let result = executor
        .execute_action("greet", json!({}), ExecuteOptions::default())
        .await;

    assert!(!result.is_ok());
    assert!(!result.error().unwrap_or_default().is_empty());
    let runtime_error = result.runtime_error().expect("normalized");
    assert_eq!(runtime_error.category, ErrorCategory::ServerUnavailable);
    assert_eq!(
        result.status_lines(),
        vec![
            "Category: server_unavailable".to_string(),
            "Message: Runtime server is unavailable.".to_string(),
            "Hint: Start the runtime server and retry /api/action.".to_string(),
            "Origin: network".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_streaming_chat_scenario_over_the_network() {
    let server = serve_once(Reply::event_stream([
        "event: token\ndata: {\"outp",
        "ut\":\"Hi\"}\n\nevent: return\ndata: {\"ok\":true,\"output\":\"Hi\",\"ui\":{\"pages\":[]}}\n\n",
    ]))
    .await;
    let executor = network_executor(&server.base_url);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let control = ActionControl::new();

    let result = executor
        .execute_action(
            "chat",
            json!({"message": "hello"}),
            ExecuteOptions::default()
                .with_control(control.clone())
                .with_stream(StreamMode::default().with_events(events_tx)),
        )
        .await;

    assert!(result.is_ok());
    assert_eq!(
        result.to_json(),
        json!({"ok": true, "output": "Hi", "ui": {"pages": []}})
    );
    assert_eq!(executor.store().manifest(), Some(json!({"pages": []})));
    assert_eq!(control.state(), ExecutionState::Succeeded);

    assert_eq!(
        events_rx.recv().await,
        Some(StreamFrame::new("token", json!({"output": "Hi"})))
    );
    assert_eq!(events_rx.recv().await, None);

    let request = server.handle.await.expect("server task");
    assert!(request.starts_with("POST /api/action/stream "));
    assert!(request.contains("\"id\":\"chat\""));
}

#[tokio::test]
async fn test_chat_scenario_split_anywhere_with_mock_reads() {
    for split in 1..CHAT_SCENARIO.len() {
        let (head, tail) = CHAT_SCENARIO.split_at(split);
        let backend = MockBackend::new().on(DEFAULT_STREAM_PATH, MockResponse::sse([head, tail]));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let result = mock_executor(&backend)
            .execute_action(
                "chat",
                json!({}),
                ExecuteOptions::default().with_stream(StreamMode::default().with_events(events_tx)),
            )
            .await;

        assert_eq!(result.to_json(), json!({"ok": true, "output": "Hi"}), "split {split}");
        let mut frames = Vec::new();
        while let Ok(frame) = events_rx.try_recv() {
            frames.push(frame);
        }
        assert_eq!(
            frames,
            vec![StreamFrame::new("token", json!({"output": "Hi"}))],
            "split {split}"
        );
    }
}

#[tokio::test]
async fn test_cancel_mid_stream_keeps_partial_output() {
    let backend = MockBackend::new().on(
        DEFAULT_STREAM_PATH,
        MockResponse::StalledStream {
            status: 200,
            chunks: vec![Bytes::from_static(b"event: token\ndata: {\"output\":\"H\"}\n\n")],
        },
    );
    let executor = mock_executor(&backend);
    let control = ActionControl::new();
    let cancel = CancellationToken::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let options = ExecuteOptions::default()
        .with_control(control.clone())
        .with_stream(
            StreamMode::default()
                .with_cancel(cancel.clone())
                .with_events(events_tx),
        );
    let task_executor = executor.clone();
    let run =
        tokio::spawn(async move { task_executor.run_action("chat", json!({}), options).await });

    let partial = events_rx.recv().await.expect("partial output");
    assert_eq!(partial.data, json!({"output": "H"}));
    assert!(!control.is_enabled());
    cancel.cancel();

    let (result, refreshes) = run.await.expect("join");
    refreshes.join().await;

    assert!(result.is_cancelled());
    assert_eq!(control.state(), ExecutionState::Cancelled);
    let cached = executor.store().last_error().expect("cancel is cached");
    assert_eq!(cached.kind, ErrorKind::Action);
    assert_eq!(cached.message, "Action cancelled.");
}

#[tokio::test]
async fn test_manifest_error_survives_failed_action() {
    let backend = MockBackend::new()
        .on(MANIFEST_PATH, MockResponse::text(500, "compile error"))
        .on(
            ACTION_PATH,
            MockResponse::json(200, json!({"ok": false, "error": "bad input"})),
        );
    let executor = mock_executor(&backend);

    executor
        .reconciler()
        .refresh_manifest()
        .await
        .expect_err("manifest fails");
    let (result, refreshes) = executor
        .run_action("greet", json!({}), ExecuteOptions::default())
        .await;
    refreshes.join().await;

    assert_eq!(result.error(), Some("bad input"));
    let cached = executor.store().last_error().expect("cached");
    assert_eq!(cached.kind, ErrorKind::Manifest);
    assert_eq!(cached.runtime_error.expect("envelope").stable_code, "runtime.http_500");
}

#[tokio::test]
async fn test_refreshes_run_after_every_action() {
    let backend = MockBackend::new()
        .on(ACTION_PATH, MockResponse::json(200, json!({"ok": true, "traces": [{"step": "a"}]})))
        .on(LOGS_PATH, MockResponse::json(200, json!({"logs": [{"line": "ran"}]})))
        .on(TRACE_PATH, MockResponse::Unreachable)
        .on(METRICS_PATH, MockResponse::json(200, json!({"actions": 1})));
    let executor = mock_executor(&backend);

    let (result, refreshes) = executor
        .run_action("greet", json!({}), ExecuteOptions::default())
        .await;
    assert_eq!(refreshes.len(), 3);
    refreshes.join().await;

    assert!(result.is_ok());
    let snapshot = executor.store().snapshot();
    assert_eq!(snapshot.traces, vec![json!({"step": "a"})]);
    assert_eq!(snapshot.logs, vec![json!({"line": "ran"})]);
    assert!(snapshot.spans.is_empty());
    assert_eq!(snapshot.metrics, Some(json!({"actions": 1})));
    assert!(snapshot.last_error.is_none());
}
