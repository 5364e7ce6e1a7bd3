//! Session-identity translation between the production and staging realms.
//!
//! # Data Flow
//! ```text
//! staging response completes (splitter)
//!     → cache.rs record_response (identity cookies, logout detection)
//!     → expiry.rs (new keys join the expiration min-heap)
//!
//! duplicate request is built (splitter)
//!     → cache.rs identity_for (cookie + CSRF translation values)
//! ```
//!
//! # Design Decisions
//! - Single owner: only the forwarder task mutates the store
//! - The "" key is a permanent all-empty sentinel (no-null fast path)
//! - Stale heap elements are tolerated and lazily reused at the root

pub mod cache;
pub mod expiry;

pub use cache::{
    epoch_ms_now, request_cookies, response_cookies, session_key_from_request,
    session_key_from_response, SessionStore, StagingCookie, StagingIdentity,
};
pub use expiry::{ExpiryEntry, ExpiryQueue};
