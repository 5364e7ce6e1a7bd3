//! Staging forwarder: consumes the pending queue, rewrites each request
//! for the staging realm and dispatches it on a detached task.
//!
//! The forwarder is the single owner of the session store. Dispatch
//! tasks never touch it; they send a plain-data [`StagingOutcome`] back
//! over a channel and the forwarder applies it between dispatches.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::header::{HeaderMap, HeaderValue};
use axum::http::Method;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use rand::rngs::OsRng;
use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use url::Url;

use crate::config::schema::{IDLE_CONNECTIONS_LIMIT, IDLE_POOL_TIMEOUT, TRANSPORT_TIMEOUT};
use crate::observability::metrics;
use crate::session::{
    epoch_ms_now, request_cookies, response_cookies, SessionStore, StagingCookie, StagingIdentity,
};

use super::queue::{PendingQueue, PendingRequest};

/// Fixed value of the duplicate marker header.
pub const SPLITTER_NAME: &str = "Http-Splitter";
/// Marker appended to every staging-directed duplicate.
pub const X_DUPLICATE_BY: &str = "x-duplicate-by";
/// Inbound marker suppressed on the staging copy.
pub const X_FORWARDED_BY: &str = "x-forwarded-by";
/// CSRF header translated into the staging realm.
pub const X_CSRF_TOKEN: &str = "x-csrf-token";

/// Longest response-body prefix recorded when logging a completion.
const RESPONSE_LOG_LIMIT: usize = 70;

/// Capacity of the completion channel feeding cache updates back.
const COMPLETION_CHANNEL_SIZE: usize = 256;

/// Per-process unique-id source for duplicate requests: a random hex
/// prefix plus a monotonically increasing counter. Ids are never reused.
#[derive(Debug)]
pub struct RequestIds {
    prefix: String,
    counter: AtomicI64,
}

impl RequestIds {
    pub fn new() -> Self {
        let noise: u64 = OsRng.gen();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            prefix: format!("{:x}", noise ^ now),
            counter: AtomicI64::new(0),
        }
    }

    pub fn next(&self) -> String {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{:x}", self.prefix, id)
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// What a dispatch task learned from one staging response.
#[derive(Debug)]
pub struct StagingOutcome {
    pub session_key: String,
    pub key_expires: i64,
    pub status: u16,
    pub cookies: Vec<StagingCookie>,
}

/// A fully rewritten staging-directed request, ready to send.
#[derive(Debug)]
pub struct DuplicateRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Rewrite a pending record into its staging-realm duplicate.
///
/// Headers are copied minus the forwarded-by marker and the `Cookie`
/// header; `X-Csrf-Token` is translated when a staging token is known.
/// Cookies are rebuilt with the three identity cookies substituted from
/// the cache; cookies whose resulting value is empty are dropped. The
/// duplicate marker goes last.
pub fn build_duplicate(
    pending: &PendingRequest,
    identity: &StagingIdentity,
    staging: &Url,
) -> DuplicateRequest {
    let mut url = staging.clone();
    url.set_path(&pending.path);
    url.set_query(pending.query.as_deref());

    let mut headers = HeaderMap::new();
    for (name, value) in pending.headers.iter() {
        let lowered = name.as_str();
        // host and content-length are derived for the staging URL and
        // replayed body; cookies are rebuilt below
        if lowered == X_FORWARDED_BY
            || lowered == "cookie"
            || crate::http::upstream::skip_on_forward(lowered)
        {
            continue;
        }
        if lowered == X_CSRF_TOKEN && !identity.csrf_token.is_empty() {
            if let Ok(token) = HeaderValue::from_str(&identity.csrf_token) {
                headers.append(name.clone(), token);
                continue;
            }
        }
        headers.append(name.clone(), value.clone());
    }

    let mut pairs: Vec<String> = Vec::new();
    for (name, value) in request_cookies(&pending.headers) {
        let value = substitute_identity_cookie(&name, value, identity);
        if !value.is_empty() {
            pairs.push(format!("{}={}", name, value));
        }
    }
    if !pairs.is_empty() {
        if let Ok(rebuilt) = HeaderValue::from_str(&pairs.join("; ")) {
            headers.insert(axum::http::header::COOKIE, rebuilt);
        }
    }

    headers.append(X_DUPLICATE_BY, HeaderValue::from_static(SPLITTER_NAME));

    DuplicateRequest {
        method: pending.method.clone(),
        url,
        headers,
        body: pending.body.clone(),
    }
}

fn substitute_identity_cookie(name: &str, value: String, identity: &StagingIdentity) -> String {
    let replacement = if name.eq_ignore_ascii_case(crate::session::cache::COOKIE_CSRF_TOKEN) {
        &identity.csrf_token
    } else if name.eq_ignore_ascii_case(crate::session::cache::COOKIE_SESSION_KEY) {
        &identity.session_key
    } else if name.eq_ignore_ascii_case(crate::session::cache::COOKIE_SESSION_TTL) {
        &identity.session_ttl
    } else {
        return value;
    };
    if replacement.is_empty() {
        value
    } else {
        replacement.clone()
    }
}

/// The single long-lived consumer of the pending queue.
#[derive(Debug)]
pub struct Forwarder {
    queue: Arc<PendingQueue>,
    staging: Url,
    client: reqwest::Client,
    store: SessionStore,
    ids: RequestIds,
    completions_tx: mpsc::Sender<StagingOutcome>,
    completions_rx: mpsc::Receiver<StagingOutcome>,
}

impl Forwarder {
    pub fn new(queue: Arc<PendingQueue>, staging: Url) -> Result<Self, reqwest::Error> {
        // test environment: staging often runs on self-signed certs
        let client = reqwest::Client::builder()
            .timeout(TRANSPORT_TIMEOUT)
            .connect_timeout(TRANSPORT_TIMEOUT)
            .tcp_keepalive(TRANSPORT_TIMEOUT)
            .pool_idle_timeout(IDLE_POOL_TIMEOUT)
            .pool_max_idle_per_host(IDLE_CONNECTIONS_LIMIT)
            .danger_accept_invalid_certs(true)
            .build()?;

        let (completions_tx, completions_rx) = mpsc::channel(COMPLETION_CHANNEL_SIZE);
        Ok(Self {
            queue,
            staging,
            client,
            store: SessionStore::new(),
            ids: RequestIds::new(),
            completions_tx,
            completions_rx,
        })
    }

    /// Consume the queue until shutdown. Dispatches preserve queue order;
    /// completions arrive in whatever order staging answers and are
    /// applied to the session store here, on the owning task.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(staging = %self.staging, "staging forwarder running");
        loop {
            tokio::select! {
                pending = self.queue.recv() => self.dispatch(pending),
                outcome = self.completions_rx.recv() => match outcome {
                    Some(outcome) => self.record(outcome),
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("staging forwarder stopped");
    }

    fn dispatch(&mut self, pending: PendingRequest) {
        let identity = self.store.identity_for(&pending.request_key);
        let duplicate = build_duplicate(&pending, identity, &self.staging);
        let id = self.ids.next();
        metrics::record_duplicate_dispatched();
        tokio::spawn(send_duplicate(
            self.client.clone(),
            duplicate,
            id,
            pending.session_key,
            pending.key_expires,
            self.completions_tx.clone(),
        ));
    }

    fn record(&mut self, outcome: StagingOutcome) {
        self.store.record_response(
            &outcome.session_key,
            outcome.status,
            &outcome.cookies,
            outcome.key_expires,
            epoch_ms_now(),
        );
    }
}

/// Fire one duplicate at staging and report what came back. Errors are
/// logged and the record is discarded; there are no retries.
async fn send_duplicate(
    client: reqwest::Client,
    duplicate: DuplicateRequest,
    id: String,
    session_key: String,
    key_expires: i64,
    completions: mpsc::Sender<StagingOutcome>,
) {
    let path = duplicate.url.path().to_string();
    let mut request = client
        .request(duplicate.method, duplicate.url)
        .headers(duplicate.headers);
    if !duplicate.body.is_empty() {
        request = request.body(duplicate.body);
    }

    match request.send().await {
        Err(error) => {
            tracing::warn!(request_id = %id, %error, "error sending duplicate to staging");
        }
        Ok(response) => {
            let status = response.status().as_u16();
            let cookies = response_cookies(response.headers());
            let body = response.bytes().await.unwrap_or_default();
            log_staging_response(&path, &id, &body);

            let outcome = StagingOutcome {
                session_key,
                key_expires,
                status,
                cookies,
            };
            if completions.send(outcome).await.is_err() {
                tracing::debug!(request_id = %id, "forwarder gone, staging outcome dropped");
            }
        }
    }
}

/// Log the first bytes of a staging response; non-printable payloads are
/// base64-encoded first.
fn log_staging_response(path: &str, id: &str, body: &[u8]) {
    let snippet = &body[..body.len().min(RESPONSE_LOG_LIMIT)];
    let text = match std::str::from_utf8(snippet) {
        Ok(s) if s.chars().all(|c| !c.is_control()) => s.to_string(),
        _ => BASE64.encode(snippet),
    };
    tracing::info!(
        request_id = %id,
        path = %super::truncate_str(path, RESPONSE_LOG_LIMIT),
        response = %text,
        "staging response"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{HeaderName, COOKIE};

    fn pending_with(headers: HeaderMap, request_key: &str) -> PendingRequest {
        PendingRequest {
            method: Method::GET,
            path: "/api/resource".into(),
            query: Some("a=1&b=2".into()),
            headers,
            body: Bytes::new(),
            request_key: request_key.into(),
            session_key: String::new(),
            key_expires: 0,
        }
    }

    fn identity(session_key: &str, ttl: &str, csrf: &str) -> StagingIdentity {
        StagingIdentity {
            session_key: session_key.into(),
            session_ttl: ttl.into(),
            csrf_token: csrf.into(),
            expiration: 0,
        }
    }

    fn staging_base() -> Url {
        Url::parse("http://staging.internal:8080/").unwrap()
    }

    #[test]
    fn rewrites_url_onto_staging_base_preserving_query() {
        let dup = build_duplicate(
            &pending_with(HeaderMap::new(), ""),
            &StagingIdentity::default(),
            &staging_base(),
        );
        assert_eq!(dup.url.as_str(), "http://staging.internal:8080/api/resource?a=1&b=2");
    }

    #[test]
    fn appends_duplicate_marker_and_strips_forwarded_by() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(X_FORWARDED_BY),
            HeaderValue::from_static("someone"),
        );
        headers.insert(
            HeaderName::from_static("x-keep-me"),
            HeaderValue::from_static("v"),
        );

        let dup = build_duplicate(
            &pending_with(headers, ""),
            &StagingIdentity::default(),
            &staging_base(),
        );
        assert_eq!(dup.headers.get(X_DUPLICATE_BY).unwrap(), SPLITTER_NAME);
        assert!(dup.headers.get(X_FORWARDED_BY).is_none());
        assert_eq!(dup.headers.get("x-keep-me").unwrap(), "v");
    }

    #[test]
    fn translates_csrf_header_when_cached() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(X_CSRF_TOKEN),
            HeaderValue::from_static("prod-token"),
        );

        let dup = build_duplicate(
            &pending_with(headers.clone(), "PROD1"),
            &identity("STG1", "", "CT1"),
            &staging_base(),
        );
        assert_eq!(dup.headers.get(X_CSRF_TOKEN).unwrap(), "CT1");

        // no cached token: the inbound value stays
        let dup = build_duplicate(
            &pending_with(headers, "PROD1"),
            &StagingIdentity::default(),
            &staging_base(),
        );
        assert_eq!(dup.headers.get(X_CSRF_TOKEN).unwrap(), "prod-token");
    }

    #[test]
    fn rebuilds_identity_cookies_from_cache() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("sessionKey=PROD1; theme=dark; csrfToken=PC; sessionTtl=60"),
        );

        let dup = build_duplicate(
            &pending_with(headers, "PROD1"),
            &identity("STG1", "120", "CT1"),
            &staging_base(),
        );
        let cookie_header = dup.headers.get(COOKIE).unwrap().to_str().unwrap();
        assert_eq!(
            cookie_header,
            "sessionKey=STG1; theme=dark; csrfToken=CT1; sessionTtl=120"
        );
    }

    #[test]
    fn drops_cookies_that_end_up_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("empty=; sessionKey=PROD1"),
        );

        let dup = build_duplicate(
            &pending_with(headers, "PROD1"),
            &identity("STG1", "", ""),
            &staging_base(),
        );
        let cookie_header = dup.headers.get(COOKIE).unwrap().to_str().unwrap();
        assert_eq!(cookie_header, "sessionKey=STG1");
    }

    #[test]
    fn no_cookie_header_when_nothing_survives() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("empty="));

        let dup = build_duplicate(
            &pending_with(headers, ""),
            &StagingIdentity::default(),
            &staging_base(),
        );
        assert!(dup.headers.get(COOKIE).is_none());
    }

    #[test]
    fn request_ids_are_unique_and_share_the_prefix() {
        let ids = RequestIds::new();
        let a = ids.next();
        let b = ids.next();
        assert_ne!(a, b);
        let prefix = a.split('-').next().unwrap();
        assert!(b.starts_with(prefix));
        assert!(a.ends_with("-1"));
        assert!(b.ends_with("-2"));
    }
}
