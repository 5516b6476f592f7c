//! Configuration for the attendance service.

use crate::core::{gap_threshold_from_secs, EngineConfig, IntervalPolicy, DEFAULT_GAP_THRESHOLD_SECS};
use crate::store::RecordMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the attendance service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum silence between sightings of one presence interval
    #[serde(rename = "gap_threshold_secs", with = "duration_serde")]
    pub gap_threshold: Duration,

    /// Whether merged intervals are clipped to the session window
    pub interval_policy: IntervalPolicy,

    /// Whether recomputation replaces or accumulates records
    pub record_mode: RecordMode,

    /// Path for the store snapshot and audit log
    pub data_path: PathBuf,

    /// HTTP listener settings
    pub server: ServerSettings,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proximity-attendance");

        Self {
            gap_threshold: Duration::from_secs(DEFAULT_GAP_THRESHOLD_SECS),
            interval_policy: IntervalPolicy::default(),
            record_mode: RecordMode::default(),
            data_path: data_dir,
            server: ServerSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            config.engine_config()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proximity-attendance")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Override listener settings from `HOST` and `PORT` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| ConfigError::Parse(format!("Invalid PORT '{port}': {e}")))?;
        }
        Ok(())
    }

    /// Path of the persisted store snapshot.
    pub fn store_path(&self) -> PathBuf {
        self.data_path.join("store.json")
    }

    /// Path of the persisted audit counters.
    pub fn audit_path(&self) -> PathBuf {
        self.data_path.join("audit.json")
    }

    /// Engine parameters derived from this configuration.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let secs = self.gap_threshold.as_secs();
        let gap_threshold = gap_threshold_from_secs(secs)
            .ok_or_else(|| ConfigError::Parse(format!("gap_threshold_secs {secs} is out of range")))?;
        Ok(EngineConfig {
            gap_threshold,
            interval_policy: self.interval_policy,
        })
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gap_threshold, Duration::from_secs(300));
        assert_eq!(config.interval_policy, IntervalPolicy::ClipToWindow);
        assert_eq!(config.record_mode, RecordMode::Upsert);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_engine_config_conversion() {
        let config = Config {
            gap_threshold: Duration::from_secs(120),
            interval_policy: IntervalPolicy::Unclipped,
            ..Config::default()
        };
        let engine = config.engine_config().unwrap();
        assert_eq!(engine.gap_threshold, chrono::Duration::minutes(2));
        assert_eq!(engine.interval_policy, IntervalPolicy::Unclipped);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "gap_threshold_secs": 60, "record_mode": "append" }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.gap_threshold, Duration::from_secs(60));
        assert_eq!(config.record_mode, RecordMode::Append);
        assert_eq!(config.interval_policy, IntervalPolicy::ClipToWindow);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.gap_threshold, Duration::from_secs(300));
    }

    #[test]
    fn test_out_of_range_gap_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        for secs in ["10000000000000000", "18446744073709551615"] {
            std::fs::write(&path, format!(r#"{{ "gap_threshold_secs": {secs} }}"#)).unwrap();
            assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
        }

        let config = Config {
            gap_threshold: Duration::from_secs(u64::MAX),
            ..Config::default()
        };
        assert!(matches!(config.engine_config(), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
