#![allow(dead_code)]

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// One scripted HTTP response. With a `gate`, the first chunk is written,
/// then the server waits for the gate before writing the rest.
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub chunks: Vec<String>,
    pub gate: Option<oneshot::Receiver<()>>,
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            chunks: vec![body.to_string()],
            gate: None,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            chunks: vec![body.to_string()],
            gate: None,
        }
    }

    pub fn event_stream<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            status: 200,
            content_type: "text/event-stream",
            chunks: chunks.into_iter().map(Into::into).collect(),
            gate: None,
        }
    }

    pub fn gated(mut self, gate: oneshot::Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// A loopback server answering exactly one request. The join handle
/// yields the raw request text.
pub struct OneShotServer {
    pub base_url: String,
    pub handle: JoinHandle<String>,
}

pub async fn serve_once(reply: Reply) -> OneShotServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback server");
    let port = listener.local_addr().expect("local addr").port();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let request = read_request(&mut socket).await;
        write_reply(&mut socket, reply).await;
        request
    });

    OneShotServer {
        base_url: format!("http://127.0.0.1:{port}"),
        handle,
    }
}

/// A loopback address with nothing listening on it.
pub async fn unused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
        if request_complete(&request) {
            break;
        }
    }
    String::from_utf8_lossy(&request).into_owned()
}

fn request_complete(request: &[u8]) -> bool {
    let Some(header_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    request.len() >= header_end + 4 + content_length
}

async fn write_reply(socket: &mut TcpStream, reply: Reply) {
    let head = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: {}\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n",
        reply.status,
        reason(reply.status),
        reply.content_type
    );
    socket.write_all(head.as_bytes()).await.expect("write head");

    let mut gate = reply.gate;
    for (index, chunk) in reply.chunks.iter().enumerate() {
        if index == 1 {
            if let Some(gate) = gate.take() {
                let _ = gate.await;
            }
        }
        let framed = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
        socket.write_all(framed.as_bytes()).await.expect("write chunk");
        socket.flush().await.expect("flush chunk");
    }
    socket.write_all(b"0\r\n\r\n").await.expect("write trailer");
    let _ = socket.shutdown().await;
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        _ => "Status",
    }
}
