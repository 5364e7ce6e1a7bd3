//! Configuration validation logic.

use url::Url;

use crate::config::schema::SplitterConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

impl std::error::Error for ValidationError {}

/// Validated upstream destinations.
#[derive(Debug, Clone)]
pub struct Upstreams {
    pub production: Url,
    /// None when traffic forking is disabled.
    pub staging: Option<Url>,
}

/// Validate the upstream URLs. The production URL is required and must
/// carry a scheme and a host; a non-empty staging URL must be equally
/// well-formed.
pub fn validate_upstreams(config: &SplitterConfig) -> Result<Upstreams, ValidationError> {
    let production = parse_base(&config.production)
        .map_err(|e| ValidationError(format!("production URL '{}': {}", config.production, e)))?;

    let staging = if config.staging.is_empty() {
        None
    } else {
        Some(
            parse_base(&config.staging)
                .map_err(|e| ValidationError(format!("staging URL '{}': {}", config.staging, e)))?,
        )
    };

    Ok(Upstreams {
        production,
        staging,
    })
}

fn parse_base(raw: &str) -> Result<Url, String> {
    let mut url = Url::parse(raw).map_err(|e| e.to_string())?;
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    if url.path().is_empty() {
        url.set_path("/");
    }
    Ok(url)
}
