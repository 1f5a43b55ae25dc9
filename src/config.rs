//! Configuration management for Talos
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Runtime-tunable behavior (thresholds,
//! timers, schedules) does not live here; that is owned by the settings
//! store so the GUI can change it while the driver runs.

use crate::error::{Result, TalosError};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device instance for D-Bus service naming
    pub device_instance: u32,

    /// Require D-Bus to be available; fail fast on startup if unavailable
    #[serde(default = "default_true")]
    pub require_dbus: bool,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Relay / remote switch configuration
    pub relay: RelayConfig,

    /// Path of the JSON file backing the settings store
    pub settings_file: String,

    /// Tick interval in milliseconds
    pub tick_interval_ms: u64,

    /// Timezone for test-run and quiet-hours calendar arithmetic
    pub timezone: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (or directory for the rolling appender)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Relay / remote switch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// D-Bus service publishing the relay
    pub service: String,

    /// Object path of the relay state item
    pub path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/var/log/talos".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            service: "com.victronenergy.system".to_string(),
            path: "/Relay/0/State".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_instance: 0,
            require_dbus: true,
            logging: LoggingConfig::default(),
            relay: RelayConfig::default(),
            settings_file: "/data/talos_settings.json".to_string(),
            tick_interval_ms: 1000,
            timezone: "UTC".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration with validation
    pub fn load() -> Result<Self> {
        // Try to load from default locations
        let default_paths = [
            "talos_config.yaml",
            "/data/talos_config.yaml",
            "/etc/talos/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(TalosError::validation(
                "tick_interval_ms",
                "Must be greater than 0",
            ));
        }

        if self.settings_file.is_empty() {
            return Err(TalosError::validation(
                "settings_file",
                "Path cannot be empty",
            ));
        }

        if self.relay.service.is_empty() || self.relay.path.is_empty() {
            return Err(TalosError::validation(
                "relay",
                "Service and path cannot be empty",
            ));
        }

        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(TalosError::validation(
                "timezone",
                "Not a recognized IANA timezone name",
            ));
        }

        Ok(())
    }

    /// Resolve the configured timezone
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}
