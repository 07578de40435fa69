use super::backend::{
    BackendError, ByteStream, HttpBackend, HttpRequest, HttpResponse, ResponseBody,
};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{stream, StreamExt};
use reqwest::Url;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A scripted reply for [`MockBackend`].
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// The request fails before any response (connection refused).
    Unreachable,
    /// Body delivered through an incremental reader, one item per chunk.
    Chunks { status: u16, chunks: Vec<Bytes> },
    /// Body delivered as one buffer (no incremental reader).
    Buffered { status: u16, body: Bytes },
    /// Emits `chunks`, then fails mid-body.
    BrokenStream { status: u16, chunks: Vec<Bytes> },
    /// Emits `chunks`, then never yields again.
    StalledStream { status: u16, chunks: Vec<Bytes> },
    /// The request never completes.
    Pending,
}

impl MockResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self::Chunks {
            status,
            chunks: vec![Bytes::from(body.to_string())],
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::Chunks {
            status,
            chunks: vec![Bytes::copy_from_slice(body.as_bytes())],
        }
    }

    pub fn sse<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Chunks {
            status: 200,
            chunks: chunks
                .into_iter()
                .map(|chunk| Bytes::copy_from_slice(chunk.as_ref().as_bytes()))
                .collect(),
        }
    }
}

/// In-memory [`HttpBackend`] keyed by request path. Every request is
/// recorded; a path with no scripted reply behaves as unreachable.
#[derive(Clone, Default)]
pub struct MockBackend {
    responses: Arc<Mutex<HashMap<String, VecDeque<MockResponse>>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `response` for the next request to `path`.
    pub fn on(self, path: &str, response: MockResponse) -> Self {
        self.push(path, response);
        self
    }

    pub fn push(&self, path: &str, response: MockResponse) {
        lock(&self.responses)
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        lock(&self.requests)
            .iter()
            .filter(|request| request_path(&request.url) == path)
            .cloned()
            .collect()
    }

    fn next_response(&self, path: &str) -> Option<MockResponse> {
        lock(&self.responses)
            .get_mut(path)
            .and_then(VecDeque::pop_front)
    }
}

impl HttpBackend for MockBackend {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, BackendError>> {
        let path = request_path(&request.url);
        let url = request.url.clone();
        lock(&self.requests).push(request);
        let response = self.next_response(&path);

        Box::pin(async move {
            match response {
                None | Some(MockResponse::Unreachable) => Err(BackendError::Unreachable {
                    message: format!("mock backend has no reply for '{url}'"),
                    url,
                }),
                Some(MockResponse::Pending) => futures::future::pending().await,
                Some(MockResponse::Buffered { status, body }) => Ok(HttpResponse {
                    status,
                    body: ResponseBody::Buffered(body),
                }),
                Some(MockResponse::Chunks { status, chunks }) => {
                    let stream: ByteStream = Box::pin(stream::iter(chunks.into_iter().map(Ok)));
                    Ok(HttpResponse {
                        status,
                        body: ResponseBody::Stream(stream),
                    })
                }
                Some(MockResponse::BrokenStream { status, chunks }) => {
                    let failure = BackendError::Body {
                        url,
                        message: "connection reset".to_string(),
                    };
                    let stream: ByteStream = Box::pin(
                        stream::iter(chunks.into_iter().map(Ok))
                            .chain(stream::once(async move { Err(failure) })),
                    );
                    Ok(HttpResponse {
                        status,
                        body: ResponseBody::Stream(stream),
                    })
                }
                Some(MockResponse::StalledStream { status, chunks }) => {
                    let stream: ByteStream = Box::pin(
                        stream::iter(chunks.into_iter().map(Ok)).chain(stream::pending()),
                    );
                    Ok(HttpResponse {
                        status,
                        body: ResponseBody::Stream(stream),
                    })
                }
            }
        })
    }
}

fn request_path(url: &str) -> String {
    Url::parse(url)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
