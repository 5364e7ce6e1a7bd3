//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use tokio::sync::mpsc;

use http_splitter::{Shutdown, SplitterConfig, SplitterServer};

/// One request as seen by a mock upstream.
#[derive(Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: axum::http::HeaderMap,
    pub body: bytes::Bytes,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Canned reply a mock upstream sends for every request.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockReply {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A running mock upstream plus the stream of requests it received.
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub requests: mpsc::UnboundedReceiver<CapturedRequest>,
}

impl MockUpstream {
    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Next captured request, failing the test after five seconds.
    pub async fn expect_request(&mut self) -> CapturedRequest {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.requests.recv())
            .await
            .expect("timed out waiting for upstream request")
            .expect("mock upstream channel closed")
    }
}

#[derive(Clone)]
struct MockState {
    tx: mpsc::UnboundedSender<CapturedRequest>,
    reply: MockReply,
}

async fn capture_handler(State(state): State<MockState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let _ = state.tx.send(CapturedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body: bytes,
    });

    let mut builder = Response::builder().status(state.reply.status);
    for (name, value) in &state.reply.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(Body::from(state.reply.body.clone())).unwrap()
}

/// Start a mock upstream on an ephemeral port.
pub async fn start_mock_upstream(reply: MockReply) -> MockUpstream {
    let (tx, requests) = mpsc::unbounded_channel();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new()
        .fallback(capture_handler)
        .with_state(MockState { tx, reply });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockUpstream { addr, requests }
}

/// Start the splitter against the given upstreams on an ephemeral port.
pub async fn start_splitter(config: SplitterConfig) -> (SocketAddr, Shutdown) {
    let server = SplitterServer::new(&config).expect("splitter setup failed");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, &handle).await.unwrap();
    });

    (addr, shutdown)
}

/// Config pointing at the given production/staging bases.
pub fn splitter_config(production: &str, staging: &str) -> SplitterConfig {
    let mut config = SplitterConfig::default();
    config.production = production.to_string();
    config.staging = staging.to_string();
    config
}
