//! Metrics collection.
//!
//! Counters and gauges go through the `metrics` facade; wiring a
//! recorder is left to the embedding environment.

use metrics::{counter, gauge};

/// Record a relayed client request.
pub fn record_proxied(method: &str, status: u16) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("splitter_requests_total", &labels).increment(1);
}

/// Record one duplicate handed to a dispatch task.
pub fn record_duplicate_dispatched() {
    counter!("splitter_duplicates_total").increment(1);
}

/// Record one pending request shed under overflow.
pub fn record_duplicate_dropped() {
    counter!("splitter_duplicates_dropped_total").increment(1);
}

/// Track the pending-queue depth.
pub fn record_queue_depth(depth: usize) {
    gauge!("splitter_pending_depth").set(depth as f64);
}
