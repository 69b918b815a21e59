//! Configuration management for Fiacre
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{FiacreError, Result};
use serde::Deserialize;
use std::path::Path;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server binding configuration
    pub http: HttpConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// SQLite database configuration
    pub database: DatabaseConfig,

    /// Vehicle API endpoints and OAuth client configuration
    pub tesla: TeslaConfig,

    /// Derived-statistics tuning
    pub stats: StatsConfig,

    /// IANA timezone used to bucket snapshots into calendar days
    pub timezone: String,

    /// Secret used to derive the credential encryption key.
    /// Overridable via the FIACRE_SECRET_KEY environment variable.
    pub secret_key: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Basic-auth password protecting the metrics endpoint; no auth when unset
    pub metrics_secret: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level name, case-insensitive (TRACE through ERROR)
    pub level: String,

    /// Log file location; its directory receives the rotated files
    pub file: String,

    /// Rotated files kept before pruning
    pub backup_count: u32,

    /// Mirror log lines to stdout
    pub console_output: bool,

    /// Emit JSON lines instead of plain text
    pub json_format: bool,
}

/// SQLite database configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the database file
    pub path: String,
}

/// Vehicle API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TeslaConfig {
    /// OAuth authorization host
    pub auth_host: String,

    /// Owner API host
    pub api_host: String,

    /// OAuth client id for the owner API token exchange
    pub client_id: String,

    /// OAuth client secret for the owner API token exchange
    pub client_secret: String,

    /// Whether routine polls may wake sleeping vehicles
    #[serde(default = "default_true")]
    pub allow_wakeup: bool,
}

/// Derived-statistics tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Conversion factor from rated-range kilometers to battery energy.
    /// An approximation that drifts from vehicle to vehicle; tune per fleet.
    pub range_wh_per_km: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8123,
            metrics_secret: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/fiacre.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "fiacre.db".to_string(),
        }
    }
}

impl Default for TeslaConfig {
    fn default() -> Self {
        Self {
            auth_host: "https://auth.tesla.com".to_string(),
            api_host: "https://owner-api.teslamotors.com".to_string(),
            client_id: "e4a9949fcfa04068f59abb5a658f2bac0a3428e4652315490b659d5ab3f35a9e"
                .to_string(),
            client_secret: "c75f14bbadc8bee3a7594412c31416f8300256d7668ea7e6e7f06727bfb9d220"
                .to_string(),
            allow_wakeup: true,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            range_wh_per_km: 190.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
            tesla: TeslaConfig::default(),
            stats: StatsConfig::default(),
            timezone: "UTC".to_string(),
            secret_key: String::new(),
        }
    }
}

impl Config {
    /// Locations probed by [`Config::load`], in order
    pub const PROBE_PATHS: [&'static str; 3] = [
        "fiacre_config.yaml",
        "/data/fiacre_config.yaml",
        "/etc/fiacre/config.yaml",
    ];

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Load configuration from the first probe path that exists, or defaults
    /// when none does
    pub fn load() -> Result<Self> {
        match Self::PROBE_PATHS.iter().find(|p| Path::new(p).exists()) {
            Some(path) => Self::from_file(path),
            None => Ok(Config::default()),
        }
    }

    /// Resolve the credential encryption secret, preferring the environment
    pub fn effective_secret_key(&self) -> Option<String> {
        if let Ok(value) = std::env::var("FIACRE_SECRET_KEY")
            && !value.is_empty()
        {
            return Some(value);
        }
        if self.secret_key.is_empty() {
            None
        } else {
            Some(self.secret_key.clone())
        }
    }

    /// Parse the configured rollup timezone
    pub fn rollup_timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| FiacreError::validation("timezone", "not a valid IANA timezone name"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.http.host.is_empty() {
            return Err(FiacreError::validation(
                "http.host",
                "Bind address cannot be empty",
            ));
        }

        if self.http.port == 0 {
            return Err(FiacreError::validation(
                "http.port",
                "Port must be greater than 0",
            ));
        }

        if self.database.path.is_empty() {
            return Err(FiacreError::validation(
                "database.path",
                "Database path cannot be empty",
            ));
        }

        if self.tesla.auth_host.is_empty() || self.tesla.api_host.is_empty() {
            return Err(FiacreError::validation(
                "tesla",
                "API hosts cannot be empty",
            ));
        }

        if self.tesla.client_id.is_empty() || self.tesla.client_secret.is_empty() {
            return Err(FiacreError::validation(
                "tesla",
                "OAuth client id and secret must be set",
            ));
        }

        if self.stats.range_wh_per_km <= 0.0 {
            return Err(FiacreError::validation(
                "stats.range_wh_per_km",
                "Must be positive",
            ));
        }

        self.rollup_timezone()?;

        Ok(())
    }
}
