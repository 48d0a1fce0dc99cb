//! Configuration management for splunk-export
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
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::{ConfigError, Result};
use crate::export::options::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, OutputFormat};

/// Environment variable holding the management URL
pub const ENV_URL: &str = "SPLUNK_URL";
/// Environment variable holding the API token
pub const ENV_TOKEN: &str = "SPLUNK_TOKEN";
/// Environment variable toggling certificate verification
pub const ENV_INSECURE: &str = "SPLUNK_INSECURE";
/// Environment variable holding the page size
pub const ENV_PAGE_SIZE: &str = "SPLUNK_EXPORT_PAGE_SIZE";

const REDACTED: &str = "********";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Export defaults
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Management endpoint, e.g. `https://splunk.example.com:8089`
    #[serde(default = "default_url")]
    pub url: String,

    /// API token sent with the `Splunk` authorization scheme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Accept invalid TLS certificates
    #[serde(default)]
    pub insecure: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Defaults for export runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Result cap; 0 exports everything
    #[serde(default)]
    pub max_results: u64,

    /// Format used when neither `--format` nor the output extension decides
    #[serde(default)]
    pub format: OutputFormat,

    /// Default earliest time bound
    #[serde(default = "default_earliest")]
    pub earliest: String,

    /// Default latest time bound
    #[serde(default = "default_latest")]
    pub latest: String,

    /// Draw a progress bar on stderr
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default)]
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

// Default value functions
fn default_url() -> String {
    "https://localhost:8089".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn default_earliest() -> String {
    "-24h".to_string()
}

fn default_latest() -> String {
    "now".to_string()
}

fn default_show_progress() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_results: 0,
            format: OutputFormat::default(),
            earliest: default_earliest(),
            latest: default_latest(),
            show_progress: default_show_progress(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Arguments
    /// * `path` - Config file, or `None` for the default location
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        debug!("Loaded config file {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using a variable lookup
    ///
    /// Empty values are ignored.
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable, if set
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_URL) {
            self.connection.url = url;
        }
        if let Some(token) = get(ENV_TOKEN) {
            self.connection.token = Some(token);
        }
        if let Some(raw) = get(ENV_INSECURE) {
            self.connection.insecure = parse_bool(ENV_INSECURE, &raw)?;
        }
        if let Some(raw) = get(ENV_PAGE_SIZE) {
            self.export.page_size = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: ENV_PAGE_SIZE.to_string(),
                value: raw.clone(),
            })?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - `~/.splunk-export/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".splunk-export")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        self.connection.validate_url()?;

        if self.connection.timeout == 0 {
            return Err(invalid("connection.timeout", "0"));
        }
        if self.export.page_size == 0 || self.export.page_size > MAX_PAGE_SIZE {
            return Err(invalid(
                "export.page_size",
                &self.export.page_size.to_string(),
            ));
        }
        Ok(())
    }

    /// Render as TOML with the token masked
    pub fn to_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.connection.token.is_some() {
            shown.connection.token = Some(REDACTED.to_string());
        }
        toml::to_string_pretty(&shown).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Get request timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout)
    }
}

impl ConnectionConfig {
    /// Check the URL parses and uses http or https
    ///
    /// # Returns
    /// * `Result<()>` - Ok if URL is valid, error otherwise
    pub fn validate_url(&self) -> Result<()> {
        match Url::parse(self.url.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
                Ok(())
            }
            _ => Err(invalid("connection.url", &self.url)),
        }
    }
}

impl LogLevel {
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

fn invalid(field: &str, value: &str) -> crate::error::ExportError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

fn parse_bool(field: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(field, raw)),
    }
}
