//! Production upstream client.
//!
//! Relays an inbound request to the production base URL and hands the
//! response back for streaming to the client, byte for byte, minus the
//! hop-by-hop headers a proxy owns.

use axum::body::Body;
use axum::http::header::HeaderMap;
use axum::http::{Method, Response, StatusCode};
use url::Url;

use crate::config::schema::{IDLE_CONNECTIONS_LIMIT, IDLE_POOL_TIMEOUT, TRANSPORT_TIMEOUT};

/// Body handed to the production hop: captured bytes when the duplicate
/// path needed a copy, the live stream otherwise.
pub enum UpstreamBody {
    Buffered(bytes::Bytes),
    Stream(Body),
}

/// Client for the production upstream.
#[derive(Debug)]
pub struct UpstreamClient {
    base: Url,
    client: reqwest::Client,
}

impl UpstreamClient {
    /// Build the client. No total request timeout: responses may stream
    /// for longer than any header would take.
    pub fn new(base: Url) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(TRANSPORT_TIMEOUT)
            .tcp_keepalive(TRANSPORT_TIMEOUT)
            .pool_idle_timeout(IDLE_POOL_TIMEOUT)
            .pool_max_idle_per_host(IDLE_CONNECTIONS_LIMIT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { base, client })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Relay one request to production.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: UpstreamBody,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut url = self.base.clone();
        url.set_path(path);
        url.set_query(query);

        let mut request = self.client.request(method, url);
        for (name, value) in headers.iter() {
            if skip_on_forward(name.as_str()) {
                continue;
            }
            request = request.header(name.clone(), value.clone());
        }
        request = match body {
            UpstreamBody::Buffered(bytes) => request.body(bytes),
            UpstreamBody::Stream(stream) => {
                request.body(reqwest::Body::wrap_stream(stream.into_data_stream()))
            }
        };

        request.send().await
    }
}

/// Headers not copied onto an upstream request: hop-by-hop headers plus
/// the ones the client library derives itself.
pub fn skip_on_forward(name: &str) -> bool {
    // host comes from the production URL, content-length from the body
    name == "host" || name == "content-length" || is_hop_by_hop(name)
}

/// Hop-by-hop headers a proxy strips in both directions.
pub fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Turn the production response into the client response, streaming the
/// body through unchanged.
pub fn into_client_response(response: reqwest::Response) -> Response<Body> {
    let status = response.status();
    let headers = response.headers().clone();

    let mut builder = Response::builder().status(status);
    if let Some(target) = builder.headers_mut() {
        for (name, value) in headers.iter() {
            if !is_hop_by_hop(name.as_str()) {
                target.append(name.clone(), value.clone());
            }
        }
    }

    builder
        .body(Body::from_stream(response.bytes_stream()))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::BAD_GATEWAY)
                .body(Body::empty())
                .expect("static response")
        })
}
