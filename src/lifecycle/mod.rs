//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse CLI → init logging → validate config → bind → serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain connections → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Any startup error is fatal
//! - In-flight duplicate dispatches are not awaited on shutdown

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
