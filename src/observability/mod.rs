//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges via the metrics facade)
//! ```
//!
//! # Design Decisions
//! - Log formatting follows the legacy flag keywords from the CLI
//! - Metrics are cheap (atomic increments) and recorder-agnostic

pub mod logging;
pub mod metrics;
