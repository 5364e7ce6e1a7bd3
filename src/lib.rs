//! Traffic-forking HTTP reverse proxy.
//!
//! Sits between clients and a production upstream whose responses are
//! the authoritative answers, and asynchronously duplicates a rewritten
//! copy of each request to a staging upstream whose responses are
//! observed but never returned.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                  HTTP SPLITTER                   │
//!  Client ───────▶│  http/server ──▶ morf ──▶ http/upstream ─────────┼──▶ Production
//!  Client ◀───────┼───────────────── streamed response ◀─────────────┼──
//!                 │        │                                         │
//!                 │        ▼ pending record (after prod headers)     │
//!                 │  splitter/queue ──▶ splitter/forwarder ──────────┼──▶ Staging
//!                 │        │                  │                      │    (responses
//!                 │   liveness flag     session cache + expiry heap  │     observed,
//!                 │        │            (single-owner, completions)  │     discarded)
//!                 │        ▼                                         │
//!                 │      /ping                                       │
//!                 └──────────────────────────────────────────────────┘
//! ```
//!
//! The client-visible path never blocks on staging work; duplicates are
//! shed, not queued unboundedly, under overload.

// Core subsystems
pub mod config;
pub mod http;
pub mod morf;
pub mod session;
pub mod splitter;

// Cross-cutting concerns
pub mod health;
pub mod lifecycle;
pub mod observability;

pub use config::SplitterConfig;
pub use health::Liveness;
pub use http::{SplitterServer, StartupError};
pub use lifecycle::Shutdown;
