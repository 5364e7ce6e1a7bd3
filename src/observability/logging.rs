//! Structured logging.
//!
//! Log formatting is driven by the legacy flag keywords: date, time,
//! microsec, longfile, shortfile, UTC. The default fmt timer already
//! prints UTC timestamps with sub-second precision, so the time-related
//! keywords collapse to "timestamps on or off"; the file keywords turn
//! source locations on.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parsed log-format keywords.
#[derive(Debug, Default, Clone)]
pub struct LogOptions {
    pub date: bool,
    pub time: bool,
    pub microsec: bool,
    pub longfile: bool,
    pub shortfile: bool,
    pub utc: bool,
}

impl LogOptions {
    pub fn from_flags(flags: &[String]) -> Self {
        let mut options = Self::default();
        for flag in flags {
            match flag.as_str() {
                "date" => options.date = true,
                "time" => options.time = true,
                "microsec" => options.microsec = true,
                "longfile" => options.longfile = true,
                "shortfile" => options.shortfile = true,
                "UTC" => options.utc = true,
                other => tracing::warn!(flag = %other, "unknown log flag, ignoring"),
            }
        }
        options
    }

    fn with_timestamps(&self) -> bool {
        self.date || self.time || self.microsec || self.utc
    }

    fn with_source(&self) -> bool {
        self.longfile || self.shortfile
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default
/// filter when set.
pub fn init(flags: &[String]) {
    let options = LogOptions::from_flags(flags);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "http_splitter=info,tower_http=warn".into());

    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(options.with_source())
        .with_line_number(options.with_source());

    if options.with_timestamps() {
        tracing_subscriber::registry().with(filter).with(fmt).init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt.without_time())
            .init();
    }
}
