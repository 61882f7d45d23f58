//! Configuration for tempo.
//!
//! Settings come from three layers, later layers winning: built-in
//! defaults, an optional `tempo.toml`, and the environment
//! (`CALBRIDGE_BASE`, `OLLAMA_BASE`, `OLLAMA_MODEL`, `TIMEZONE`).
//! CLI flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tempo")
                .join("tempo.db"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Base URL of the calendar bridge process.
    pub calbridge_base: String,

    /// Base URL of the local model server.
    pub ollama_base: String,

    /// Model name used for every pipeline stage.
    pub ollama_model: String,

    /// IANA timezone the user schedules in.
    pub timezone: String,

    /// Database settings.
    pub database: DatabaseConfig,

    /// First hour of the daily work window (inclusive).
    pub work_start_hour: u32,

    /// Last hour of the daily work window (exclusive).
    pub work_end_hour: u32,

    /// Title of the calendar whose events never count as busy time.
    pub holiday_calendar: String,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            calbridge_base: "http://127.0.0.1:8765".to_string(),
            ollama_base: "http://localhost:11434".to_string(),
            ollama_model: "qwen2.5:14b-instruct-q4_K_M".to_string(),
            timezone: "America/New_York".to_string(),
            database: DatabaseConfig::default(),
            work_start_hour: 6,
            work_end_hour: 23,
            holiday_calendar: "Holidays".to_string(),
        }
    }
}

impl TempoConfig {
    /// Load configuration from an optional TOML file, then the environment.
    ///
    /// A missing file is not an error; a present-but-invalid file is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| CoreError::Config(format!("failed to read {}: {e}", p.display())))?;
                toml::from_str(&text)
                    .map_err(|e| CoreError::Config(format!("invalid {}: {e}", p.display())))?
            }
            Some(p) => {
                return Err(CoreError::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            None => {
                let default_path = PathBuf::from("tempo.toml");
                if default_path.exists() {
                    let text = std::fs::read_to_string(&default_path)
                        .map_err(|e| CoreError::Config(format!("failed to read tempo.toml: {e}")))?;
                    toml::from_str(&text)
                        .map_err(|e| CoreError::Config(format!("invalid tempo.toml: {e}")))?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay environment variables onto the current values.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("CALBRIDGE_BASE") {
            self.calbridge_base = v;
        }
        if let Ok(v) = std::env::var("OLLAMA_BASE") {
            self.ollama_base = v;
        }
        if let Ok(v) = std::env::var("OLLAMA_MODEL") {
            self.ollama_model = v;
        }
        if let Ok(v) = std::env::var("TIMEZONE") {
            self.timezone = v;
        }
    }

    /// Resolve the configured timezone name.
    pub fn tz(&self) -> Result<Tz> {
        Tz::from_str(&self.timezone)
            .map_err(|_| CoreError::InvalidTimezone(self.timezone.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = TempoConfig::default();
        assert_eq!(config.work_start_hour, 6);
        assert_eq!(config.work_end_hour, 23);
        assert_eq!(config.holiday_calendar, "Holidays");
        assert!(config.tz().is_ok());
    }

    #[test]
    fn bad_timezone_is_reported() {
        let config = TempoConfig {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.tz(), Err(CoreError::InvalidTimezone(_))));
    }

    #[test]
    fn toml_round_trip() {
        let config = TempoConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: TempoConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.calbridge_base, config.calbridge_base);
        assert_eq!(back.timezone, config.timezone);
    }
}
