use crate::util::is_local_endpoint_url;
use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BackendError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub enum ResponseBody {
    /// Incremental reader over the body.
    Stream(ByteStream),
    /// The whole body, for backends that cannot read incrementally.
    Buffered(Bytes),
}

pub struct HttpResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reads the remaining body into memory.
    pub async fn into_bytes(self) -> Result<Bytes, BackendError> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Stream(mut stream) => {
                let mut collected = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    collected.extend_from_slice(&chunk?);
                }
                Ok(collected.freeze())
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The request never produced a response.
    #[error("{message}")]
    Unreachable { url: String, message: String },
    /// The response body broke off while being read.
    #[error("reading response body from '{url}' failed: {message}")]
    Body { url: String, message: String },
}

/// The network seam of [`super::RuntimeClient`].
pub trait HttpBackend: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, BackendError>>;
}

pub struct ReqwestBackend {
    http: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(connect_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().context("failed to build HTTP client")?;
        Ok(Self { http })
    }
}

impl HttpBackend for ReqwestBackend {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, BackendError>> {
        Box::pin(async move {
            let mut builder = match request.method {
                HttpMethod::Get => self.http.get(&request.url),
                HttpMethod::Post => self.http.post(&request.url),
            };
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|error| map_request_error(error, &request.url))?;
            let status = response.status().as_u16();

            let url = request.url;
            let stream = response.bytes_stream().map(move |item| {
                item.map_err(|error| BackendError::Body {
                    url: url.clone(),
                    message: error.to_string(),
                })
            });
            Ok(HttpResponse {
                status,
                body: ResponseBody::Stream(Box::pin(stream)),
            })
        })
    }
}

fn map_request_error(error: reqwest::Error, request_url: &str) -> BackendError {
    let message = if error.is_connect() && is_local_endpoint_url(request_url) {
        format!(
            "cannot reach local runtime endpoint '{request_url}': {error}. Start the runtime server or update ACTIONWIRE_URL."
        )
    } else if error.is_connect() {
        format!("cannot reach runtime endpoint '{request_url}': {error}")
    } else if error.is_timeout() {
        format!("request to '{request_url}' timed out: {error}")
    } else {
        format!("request to '{request_url}' failed: {error}")
    };

    BackendError::Unreachable {
        url: request_url.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_into_bytes_collects_stream_chunks() {
        let chunks: Vec<Result<Bytes, BackendError>> =
            vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let response = HttpResponse {
            status: 200,
            body: ResponseBody::Stream(Box::pin(stream::iter(chunks))),
        };
        assert_eq!(response.into_bytes().await.expect("bytes"), "abcd");
    }

    #[tokio::test]
    async fn test_into_bytes_surfaces_body_errors() {
        let chunks: Vec<Result<Bytes, BackendError>> = vec![
            Ok(Bytes::from_static(b"ab")),
            Err(BackendError::Body {
                url: "http://localhost/x".to_string(),
                message: "reset".to_string(),
            }),
        ];
        let response = HttpResponse {
            status: 200,
            body: ResponseBody::Stream(Box::pin(stream::iter(chunks))),
        };
        assert!(matches!(
            response.into_bytes().await,
            Err(BackendError::Body { .. })
        ));
    }

    #[test]
    fn test_request_header_lookup_is_case_insensitive() {
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: "http://localhost/api/action".to_string(),
            headers: vec![("Accept".to_string(), "text/event-stream".to_string())],
            body: None,
        };
        assert_eq!(request.header("accept"), Some("text/event-stream"));
        assert_eq!(request.header("authorization"), None);
    }

    #[tokio::test]
    async fn test_reqwest_backend_reports_unreachable_on_refused_connection() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let backend = ReqwestBackend::new(Some(Duration::from_secs(2))).expect("backend");
        let result = backend
            .send(HttpRequest {
                method: HttpMethod::Get,
                url: format!("http://127.0.0.1:{port}/api/logs"),
                headers: Vec::new(),
                body: None,
            })
            .await;

        match result {
            Err(BackendError::Unreachable { message, .. }) => {
                assert!(message.contains("cannot reach local runtime endpoint"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(response) => panic!("unexpected response status {}", response.status),
        }
    }
}
