//! Health subsystem.
//!
//! # Data Flow
//! ```text
//! queue overflow observed (splitter)
//!     → Liveness::set(false)
//!
//! queue accepts normally
//!     → Liveness::set(true)
//!
//! GET /ping
//!     → liveness.rs (serialize {ServiceName, StatusOk})
//!     → consumers route away while StatusOk=false
//! ```
//!
//! # Design Decisions
//! - One process-wide boolean; no per-upstream health tracking
//! - The flag is a backpressure signal, not a readiness probe

pub mod liveness;

pub use liveness::{Liveness, PingStatus, SERVICE_NAME};
