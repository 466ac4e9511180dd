//! Connection and extraction configuration
//!
//! Both structs deserialize from JSON with every field optional, so a config
//! file only needs to name what differs from the defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PipelineError;
use crate::types::Boundary;

/// Default pause before the single reconnect attempt
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// How the record source reaches the rig database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Path of the SQLite database holding the rig tables
    pub database: PathBuf,
    /// Pause before reconnecting after a connection fault (milliseconds)
    pub reconnect_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("rig.sqlite"),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

impl SourceConfig {
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// What to do when a singular lookup finds several records in one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Use the first record in source order and log a warning
    #[default]
    First,
    /// Fail the field with an ambiguity error
    Reject,
}

/// How fields query and interpret windows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub boundary: Boundary,
    pub duplicates: DuplicatePolicy,
}

/// Full configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub extract: ExtractConfig,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json(
            r#"{ "source": { "database": "/data/allen.sqlite" }, "extract": { "boundary": "half_open" } }"#,
        )
        .unwrap();

        assert_eq!(config.source.database, PathBuf::from("/data/allen.sqlite"));
        assert_eq!(config.source.reconnect_delay_ms, DEFAULT_RECONNECT_DELAY_MS);
        assert_eq!(config.extract.boundary, Boundary::HalfOpen);
        assert_eq!(config.extract.duplicates, DuplicatePolicy::First);
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_json() {
        assert!(Config::from_json("not json").is_err());
    }

    #[test]
    fn test_reconnect_delay_roundtrip() {
        let config = SourceConfig::new("x.sqlite").with_reconnect_delay(Duration::from_millis(250));
        assert_eq!(config.reconnect_delay(), Duration::from_millis(250));
    }
}
