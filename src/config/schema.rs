//! Configuration schema definitions.
//!
//! The splitter's configuration is assembled from defaults, an optional
//! JSON file and the command line, in that order. The field names of the
//! JSON document are PascalCase (`Port`, `Production`, ...) to stay
//! compatible with existing `redirector.json` files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default listen port, with the leading-colon notation accepted on the
/// command line.
pub const DEFAULT_PORT: &str = ":8888";

/// Timeout applied to inbound requests and outbound transports.
pub const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(60);

/// How long an idle upstream connection may sit in the pool.
pub const IDLE_POOL_TIMEOUT: Duration = Duration::from_secs(15);

/// Idle connection pool size per upstream host.
pub const IDLE_CONNECTIONS_LIMIT: usize = 2_000;

/// Maximum accepted request header block. Enforcement is owned by the
/// HTTP stack serving the listener.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Capacity of the pending-duplicate queue.
pub const PENDING_QUEUE_CAPACITY: usize = 10_000;

/// Root configuration for the splitter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SplitterConfig {
    /// TCP port to listen on, with or without a leading colon.
    pub port: String,

    /// Base URL of the production upstream. Responses from here are the
    /// answers returned to clients.
    pub production: String,

    /// Base URL of the staging upstream. Empty disables traffic forking.
    pub staging: String,

    /// Log format keywords: date, time, microsec, longfile, shortfile, UTC.
    pub log_flags: Vec<String>,

    /// Enable single-byte URI mutation under `morf_uri_base`.
    pub morf_uri: bool,

    /// Enable single-byte mutation of one random header value.
    pub morf_header: bool,

    /// Path prefix under which URI mutation applies.
    pub morf_uri_base: String,

    /// Where to write a CPU profile, if profiling is wired up.
    pub cpu_profile_filename: String,

    /// Where to write a heap profile, if profiling is wired up.
    pub heap_profile_filename: String,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            production: "http://router/".to_string(),
            staging: String::new(),
            log_flags: ["date", "time", "microsec", "shortfile", "UTC"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            morf_uri: false,
            morf_header: false,
            morf_uri_base: crate::morf::DEFAULT_MORF_URI_BASE.to_string(),
            cpu_profile_filename: String::new(),
            heap_profile_filename: String::new(),
        }
    }
}

impl SplitterConfig {
    /// Socket address to bind, normalizing the `:port` notation.
    pub fn bind_address(&self) -> String {
        if self.port.starts_with(':') {
            format!("0.0.0.0{}", self.port)
        } else {
            format!("0.0.0.0:{}", self.port)
        }
    }

    /// Whether a staging upstream is configured at all.
    pub fn staging_enabled(&self) -> bool {
        !self.staging.is_empty()
    }
}
