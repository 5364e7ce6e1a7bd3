//! HTTP server setup and the client-facing proxy handler.
//!
//! # Responsibilities
//! - Build the Axum router: `/ping` plus a catch-all proxy route
//! - Capture POST bodies for the duplicate path
//! - Apply morf hooks before production send and duplicate capture
//! - Relay to production and stream the response back
//! - Hand pending records to the splitter queue
//! - Spawn the staging forwarder and serve with graceful shutdown

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use bytes::Bytes;
use rand::rngs::OsRng;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::schema::{PENDING_QUEUE_CAPACITY, TRANSPORT_TIMEOUT};
use crate::config::validation::validate_upstreams;
use crate::config::{SplitterConfig, ValidationError};
use crate::health::{Liveness, PingStatus};
use crate::lifecycle::Shutdown;
use crate::morf::{self, MorfOptions};
use crate::observability::metrics;
use crate::session::{session_key_from_request, session_key_from_response};
use crate::splitter::{Forwarder, PendingQueue, PendingRequest};

use super::upstream::{into_client_response, UpstreamBody, UpstreamClient};

/// Errors that prevent the splitter from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("{0}")]
    Config(#[from] ValidationError),
    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    upstream: Arc<UpstreamClient>,
    queue: Arc<PendingQueue>,
    staging_enabled: bool,
    morf: MorfOptions,
    liveness: Liveness,
}

/// The assembled splitter: router plus the forwarder task to spawn.
pub struct SplitterServer {
    router: Router,
    forwarder: Option<Forwarder>,
    liveness: Liveness,
}

impl SplitterServer {
    /// Validate the configuration and wire up all subsystems.
    pub fn new(config: &SplitterConfig) -> Result<Self, StartupError> {
        let upstreams = validate_upstreams(config)?;

        let liveness = Liveness::new(false);
        let queue = Arc::new(PendingQueue::new(PENDING_QUEUE_CAPACITY, liveness.clone()));
        let upstream = Arc::new(UpstreamClient::new(upstreams.production)?);

        let forwarder = match upstreams.staging {
            Some(staging) => Some(Forwarder::new(queue.clone(), staging)?),
            None => None,
        };

        let state = AppState {
            upstream,
            queue,
            staging_enabled: forwarder.is_some(),
            morf: MorfOptions::from_config(config),
            liveness: liveness.clone(),
        };

        Ok(Self {
            router: Self::build_router(state),
            forwarder,
            liveness,
        })
    }

    /// The shared liveness flag published by `/ping`.
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/ping", get(ping_handler))
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(TRANSPORT_TIMEOUT))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until the shutdown signal fires. The forwarder runs as its
    /// own task; in-flight duplicates are not awaited on shutdown.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> std::io::Result<()> {
        if let Some(forwarder) = self.forwarder {
            tokio::spawn(forwarder.run(shutdown.subscribe()));
        }

        self.liveness.set(true);

        let mut signal = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = signal.recv().await;
            })
            .await
    }
}

/// `GET /ping`: the liveness document.
async fn ping_handler(State(state): State<AppState>) -> Json<PingStatus> {
    Json(state.liveness.status())
}

/// Catch-all handler: relay to production, stream the response back and
/// queue a duplicate for staging. The client-visible path never waits on
/// staging work.
async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let method = parts.method;
    let mut headers = parts.headers;
    let mut path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);

    // Capture the body for the duplicate path. A read error leaves the
    // captured bytes empty and the relay proceeds with what there is.
    let (outbound, captured): (UpstreamBody, Bytes) =
        if state.staging_enabled && method == Method::POST {
            match axum::body::to_bytes(body, usize::MAX).await {
                Ok(bytes) => (UpstreamBody::Buffered(bytes.clone()), bytes),
                Err(error) => {
                    tracing::debug!(%error, "request body capture failed, duplicating without body");
                    (UpstreamBody::Buffered(Bytes::new()), Bytes::new())
                }
            }
        } else {
            (UpstreamBody::Stream(body), Bytes::new())
        };

    // Morf before the production send and before the capture is used, so
    // both upstreams receive the same perturbed request.
    if state.morf.morf_uri {
        if let Some(mutated) = morf::morf_path(&path, &state.morf.morf_uri_base, &mut OsRng) {
            path = mutated;
        }
    }
    if state.morf.morf_header {
        morf::morf_header(&mut headers, &mut OsRng);
    }

    let request_key = session_key_from_request(&headers);

    let response = match state
        .upstream
        .forward(method.clone(), &path, query.as_deref(), &headers, outbound)
        .await
    {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(%error, path = %path, "production upstream request failed");
            metrics::record_proxied(method.as_str(), StatusCode::BAD_GATEWAY.as_u16());
            return (StatusCode::BAD_GATEWAY, "production upstream request failed")
                .into_response();
        }
    };

    metrics::record_proxied(method.as_str(), response.status().as_u16());

    if state.staging_enabled {
        let (session_key, key_expires) = session_key_from_response(response.headers());
        state.queue.push(PendingRequest {
            method,
            path,
            query,
            headers,
            body: captured,
            request_key,
            session_key,
            key_expires,
        });
    }

    into_client_response(response)
}
