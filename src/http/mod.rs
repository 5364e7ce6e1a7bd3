//! HTTP front door subsystem.
//!
//! # Data Flow
//! ```text
//! client request
//!     → server.rs (capture POST body, apply morf hooks)
//!     → upstream.rs (relay to production, stream response back)
//!     → server.rs (extract Set-Cookie session key, enqueue duplicate)
//!     → splitter (asynchronous staging dispatch)
//! ```

pub mod server;
pub mod upstream;

pub use server::{SplitterServer, StartupError};
pub use upstream::UpstreamClient;
