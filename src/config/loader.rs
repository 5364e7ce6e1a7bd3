//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::SplitterConfig;

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from a flat JSON file (`redirector.json` layout).
///
/// Keys absent from the file keep the values already present in `base`,
/// so CLI merging can layer on top of the result.
pub fn load_config(path: &Path, base: &SplitterConfig) -> Result<SplitterConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;

    // Deserialize onto a fresh default, then keep only keys the file
    // actually carried by merging over the base.
    let file_values: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&content).map_err(ConfigError::Parse)?;

    let mut merged = serde_json::to_value(base).map_err(ConfigError::Parse)?;
    if let serde_json::Value::Object(ref mut target) = merged {
        for (key, value) in file_values {
            target.insert(key, value);
        }
    }

    serde_json::from_value(merged).map_err(ConfigError::Parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_override_base_and_missing_keys_survive() {
        let mut base = SplitterConfig::default();
        base.production = "http://keep-me/".into();

        let dir = std::env::temp_dir();
        let path = dir.join("splitter_loader_test.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, r#"{{"Staging": "http://stage/", "MorfHeader": true}}"#).unwrap();

        let loaded = load_config(&path, &base).unwrap();
        assert_eq!(loaded.production, "http://keep-me/");
        assert_eq!(loaded.staging, "http://stage/");
        assert!(loaded.morf_header);

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let base = SplitterConfig::default();
        let err = load_config(Path::new("/nonexistent/redirector.json"), &base).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
