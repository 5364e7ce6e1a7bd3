//! Bounded FIFO of duplicate requests awaiting dispatch to staging.
//!
//! Multi-producer, single-consumer. When occupancy climbs to within
//! [`HIGH_WATER_MARGIN`] slots of capacity the oldest request is shed to
//! make room and the liveness flag is cleared; `/ping` consumers observe
//! the unhealthy state and may route away. Accepting normally restores
//! the flag.

use std::collections::VecDeque;
use std::sync::Mutex;

use axum::http::header::HeaderMap;
use axum::http::Method;
use bytes::Bytes;
use tokio::sync::Notify;

use crate::health::Liveness;
use crate::observability::metrics;

/// Free-slot margin at which shedding starts.
pub const HIGH_WATER_MARGIN: usize = 100;

/// Longest path prefix recorded when logging a shed request.
const DROP_LOG_PATH_LIMIT: usize = 80;

/// One captured request waiting to be duplicated to staging.
#[derive(Debug)]
pub struct PendingRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    /// Replayable body bytes; empty unless captured (POST with staging).
    pub body: Bytes,
    /// Production session key carried by the inbound request, or "".
    pub request_key: String,
    /// New production session key announced by the production response
    /// `Set-Cookie`, or "". This is the key later cache updates use.
    pub session_key: String,
    /// Expiration of that cookie in epoch ms; 0 when unknown.
    pub key_expires: i64,
}

/// The pending-duplicate queue.
#[derive(Debug)]
pub struct PendingQueue {
    inner: Mutex<VecDeque<PendingRequest>>,
    notify: Notify,
    capacity: usize,
    liveness: Liveness,
}

impl PendingQueue {
    pub fn new(capacity: usize, liveness: Liveness) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
            liveness,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("pending queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue a request, shedding the oldest one when the queue is
    /// within [`HIGH_WATER_MARGIN`] slots of capacity.
    pub fn push(&self, request: PendingRequest) {
        let high_water = self.capacity.saturating_sub(HIGH_WATER_MARGIN);
        let (dropped, depth) = {
            let mut queue = self.inner.lock().expect("pending queue mutex poisoned");
            let dropped = if queue.len() >= high_water {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(request);
            (dropped, queue.len())
        };

        match dropped {
            Some(old) => {
                self.liveness.set(false);
                metrics::record_duplicate_dropped();
                tracing::warn!(
                    path = %super::truncate_str(&old.path, DROP_LOG_PATH_LIMIT),
                    "pending requests overflow, removing oldest"
                );
            }
            None => self.liveness.set(true),
        }
        metrics::record_queue_depth(depth);
        self.notify.notify_one();
    }

    /// Wait for and take the oldest pending request.
    pub async fn recv(&self) -> PendingRequest {
        loop {
            // arm the notification before checking, so a push between
            // the check and the await is not lost
            let notified = self.notify.notified();
            if let Some(request) = self
                .inner
                .lock()
                .expect("pending queue mutex poisoned")
                .pop_front()
            {
                return request;
            }
            notified.await;
        }
    }
}
