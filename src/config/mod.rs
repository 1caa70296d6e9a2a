//! Configuration management for dbshell
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::pool::BackendKind;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "DBSHELL_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection pool configuration
    #[serde(default)]
    pub pool: PoolConfig,

    /// Display configuration
    #[serde(default)]
    pub display: DisplayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named connection profiles
    #[serde(default)]
    pub connections: Vec<ConnectionProfile>,
}

/// Connection pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Idle time in seconds after which a pooled connection is evicted
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl: u64,

    /// Interval in seconds between idle sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,

    /// Connection establishment timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Number of connection attempts before giving up
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

/// Display and output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Border style of SQL result tables
    #[serde(default = "default_table_style")]
    pub table_style: TableStyle,
}

/// Available SQL table styles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TableStyle {
    /// `+---+` borders like the mysql client
    Ascii,
    /// psql-style header rule only
    Psql,
    /// Unicode box drawing
    Modern,
    /// Unicode box drawing with rounded corners
    Rounded,
    /// Markdown pipe table
    Markdown,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// A named connection the resolver can hand out
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionProfile {
    /// Identifier callers use to refer to this connection
    pub id: String,

    /// Backend dialect
    pub backend: BackendKind,

    /// Server host
    pub host: String,

    /// Server port; the backend default is used when absent
    #[serde(default)]
    pub port: Option<u16>,

    /// Username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Database selected when a session starts
    #[serde(default)]
    pub database: Option<String>,
}

// Default value functions
fn default_idle_ttl() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_table_style() -> TableStyle {
    TableStyle::Ascii
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_ttl: default_idle_ttl(),
            sweep_interval: default_sweep_interval(),
            connect_timeout: default_connect_timeout(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            table_style: default_table_style(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration with file and environment precedence
    ///
    /// Uses `path` when given, otherwise the default path if it exists,
    /// otherwise defaults. Environment overrides are applied last.
    ///
    /// # Returns
    /// * `Result<Config>` - Merged configuration or error
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides
    ///
    /// Recognized variables: `DBSHELL_POOL_IDLE_TTL`, `DBSHELL_POOL_SWEEP_INTERVAL`,
    /// `DBSHELL_POOL_CONNECT_TIMEOUT`, `DBSHELL_POOL_RETRY_ATTEMPTS`,
    /// `DBSHELL_LOG_LEVEL`.
    ///
    /// # Arguments
    /// * `lookup` - Variable lookup, `std::env::var` outside tests
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |name: &str| -> Result<Option<u64>> {
            let key = format!("{ENV_PREFIX}{name}");
            match lookup(&key) {
                Some(value) => value.trim().parse::<u64>().map(Some).map_err(|_| {
                    ConfigError::InvalidValue {
                        field: key.clone(),
                        value,
                    }
                    .into()
                }),
                None => Ok(None),
            }
        };

        if let Some(v) = number("POOL_IDLE_TTL")? {
            self.pool.idle_ttl = v;
        }
        if let Some(v) = number("POOL_SWEEP_INTERVAL")? {
            self.pool.sweep_interval = v;
        }
        if let Some(v) = number("POOL_CONNECT_TIMEOUT")? {
            self.pool.connect_timeout = v;
        }
        if let Some(v) = number("POOL_RETRY_ATTEMPTS")? {
            self.pool.retry_attempts =
                u32::try_from(v).map_err(|_| ConfigError::InvalidValue {
                    field: format!("{ENV_PREFIX}POOL_RETRY_ATTEMPTS"),
                    value: v.to_string(),
                })?;
        }

        let level_key = format!("{ENV_PREFIX}LOG_LEVEL");
        if let Some(level) = lookup(&level_key) {
            self.logging.level = LogLevel::parse(&level).ok_or(ConfigError::InvalidValue {
                field: level_key,
                value: level,
            })?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dbshell")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("pool.idle_ttl", self.pool.idle_ttl),
            ("pool.sweep_interval", self.pool.sweep_interval),
            ("pool.connect_timeout", self.pool.connect_timeout),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                }
                .into());
            }
        }

        let mut seen = HashSet::new();
        for profile in &self.connections {
            if profile.id.trim().is_empty() {
                return Err(ConfigError::MissingField("connections.id".to_string()).into());
            }
            if profile.host.trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "connections.{}.host",
                    profile.id
                ))
                .into());
            }
            if !seen.insert(profile.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "connections.id".to_string(),
                    value: profile.id.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Look up a connection profile by id
    pub fn profile(&self, id: &str) -> Option<&ConnectionProfile> {
        self.connections.iter().find(|p| p.id == id)
    }
}

impl PoolConfig {
    /// Get idle TTL as Duration
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl)
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

impl ConnectionProfile {
    /// Port to connect to, falling back to the backend default
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or_else(|| self.backend.default_port())
    }
}

impl LogLevel {
    /// Parse a level name, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
