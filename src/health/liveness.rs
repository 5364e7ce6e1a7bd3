//! Process-wide liveness flag and the `/ping` document.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Service name reported by `/ping`.
pub const SERVICE_NAME: &str = "http-splitter";

/// Shared liveness flag. True means healthy; the splitter clears it when
/// the pending queue sheds requests.
#[derive(Clone, Debug, Default)]
pub struct Liveness {
    ok: Arc<AtomicBool>,
}

impl Liveness {
    pub fn new(ok: bool) -> Self {
        Self {
            ok: Arc::new(AtomicBool::new(ok)),
        }
    }

    pub fn set(&self, ok: bool) {
        self.ok.store(ok, Ordering::Relaxed);
    }

    pub fn get(&self) -> bool {
        self.ok.load(Ordering::Relaxed)
    }

    /// Snapshot for the `/ping` response.
    pub fn status(&self) -> PingStatus {
        PingStatus {
            service_name: SERVICE_NAME,
            status_ok: self.get(),
        }
    }
}

/// Body of the `/ping` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PingStatus {
    pub service_name: &'static str,
    pub status_ok: bool,
}
