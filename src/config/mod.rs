//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! built-in defaults
//!     → loader.rs (optional JSON file, `redirector.json` layout)
//!     → cli.rs (positionals + options layered on top)
//!     → validation.rs (upstream URL checks)
//!     → SplitterConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - All fields have defaults so a bare command line still runs
//! - Syntactic parsing (serde/clap) is separate from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::SplitterConfig;
pub use validation::{Upstreams, ValidationError};
