//! Configuration module for meterlog
//!
//! This module handles application configuration including:
//! - The settings consumed by the acquisition core ([`settings`])
//! - Persistence of the whole [`AppConfig`] as JSON
//! - Parsing the flat key/value form used by scripts and the command line
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.hxyulin.meterlog/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.meterlog/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.meterlog\`
//!
//! # Files
//!
//! - `config.json` - Last used configuration
//! - `logs/` - Rolling log files
//!
//! # Example
//!
//! ```ignore
//! use meterlog::config::AppConfig;
//!
//! let mut config = AppConfig::load_or_default();
//! config.acquisition.interval_ms = 100;
//! config.save_default()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{MeterLogError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.meterlog";

/// Configuration filename
pub const CONFIG_FILE: &str = "config.json";

/// Log directory name inside the app data directory
pub const LOG_DIR: &str = "logs";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        MeterLogError::Configuration("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            MeterLogError::Configuration(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

/// Get the log directory
pub fn log_dir() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(LOG_DIR))
}

// ==================== App Config ====================

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    #[serde(default)]
    pub report: ReportOptions,

    #[serde(default)]
    pub view: ViewConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub device: DeviceConfig,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate everything the core consumes
    pub fn validate(&self) -> Result<()> {
        self.acquisition.validate()?;
        self.view.validate()
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MeterLogError::Configuration(format!("Failed to read {:?}: {}", path, e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            MeterLogError::Configuration(format!("Failed to parse {:?}: {}", path, e))
        })
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load configuration, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to a configuration file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            MeterLogError::Configuration(format!("Failed to serialize configuration: {}", e))
        })?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            MeterLogError::Configuration(format!("Failed to write configuration: {}", e))
        })
    }

    /// Save to the default location
    pub fn save_default(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save(dir.join(CONFIG_FILE))
    }

    /// Apply flat `key=value` settings on top of this configuration
    ///
    /// Unknown keys belong to other collaborators and are ignored.
    pub fn apply_pairs<'a, I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in pairs {
            let value = value.trim();
            match key.trim() {
                "interval_ms" => self.acquisition.interval_ms = parse_value(key, value)?,
                "max_points" => self.acquisition.max_points = parse_value(key, value)?,
                "persist" => self.acquisition.persist = parse_bool(key, value)?,
                "include_stats" => self.report.include_stats = parse_bool(key, value)?,
                "include_chart" => self.report.include_chart = parse_bool(key, value)?,
                "scroll_window_seconds" => {
                    self.view.scroll_window_seconds = parse_value(key, value)?
                }
                "prefix" => self.output.prefix = value.to_string(),
                "suffix" => {
                    self.output.suffix = match value {
                        "timestamp" => FileSuffix::Timestamp,
                        "counter" => FileSuffix::Counter,
                        other => {
                            return Err(MeterLogError::Configuration(format!(
                                "suffix must be 'timestamp' or 'counter', got '{}'",
                                other
                            )))
                        }
                    }
                }
                "directory" => self.output.directory = PathBuf::from(value),
                other => tracing::debug!("Ignoring configuration key '{}'", other),
            }
        }
        Ok(())
    }

    /// Build a configuration from flat `key=value` settings
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        config.apply_pairs(pairs)?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        MeterLogError::Configuration(format!("Invalid value '{}' for '{}'", value, key))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(MeterLogError::Configuration(format!(
            "Invalid boolean '{}' for '{}'",
            value, key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.acquisition.interval_ms = 250;
        config.output.suffix = FileSuffix::Counter;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"acquisition":{"interval_ms":100,"max_points":5,"persist":false}}"#)
                .unwrap();
        assert_eq!(parsed.acquisition.interval_ms, 100);
        assert!(!parsed.acquisition.persist);
        assert_eq!(parsed.report, ReportOptions::default());
    }

    #[test]
    fn test_from_pairs() {
        let config = AppConfig::from_pairs([
            ("interval_ms", "100"),
            ("max_points", "5"),
            ("persist", "yes"),
            ("include_chart", "false"),
            ("scroll_window_seconds", "10"),
            ("suffix", "counter"),
            ("language", "de"),
        ])
        .unwrap();

        assert_eq!(config.acquisition.interval_ms, 100);
        assert_eq!(config.acquisition.max_points, 5);
        assert!(config.acquisition.persist);
        assert!(!config.report.include_chart);
        assert_eq!(config.output.suffix, FileSuffix::Counter);
    }

    #[test]
    fn test_from_pairs_rejects_short_interval() {
        let err = AppConfig::from_pairs([("interval_ms", "20")]).unwrap_err();
        assert!(matches!(err, MeterLogError::Configuration(_)));
    }

    #[test]
    fn test_from_pairs_rejects_garbage() {
        assert!(AppConfig::from_pairs([("max_points", "-3")]).is_err());
        assert!(AppConfig::from_pairs([("persist", "maybe")]).is_err());
        assert!(AppConfig::from_pairs([("suffix", "random")]).is_err());
    }
}
