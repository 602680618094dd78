//! Configuration management for the LogView daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/logview/config.toml`.
//!
//! A loaded configuration is validated once at startup and then shared
//! read-only (behind an `Arc`) with every component.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("base_path does not exist: {0}")]
    BasePathMissing(PathBuf),

    #[error("base_path is not a directory: {0}")]
    BasePathNotDirectory(PathBuf),

    #[error("group name must not be empty")]
    EmptyGroupName,

    #[error("group names must be unique, found duplicate: {0}")]
    DuplicateGroup(String),

    #[error("invalid regex pattern for group {group}: {reason}")]
    InvalidPattern { group: String, reason: String },

    #[error("page sizes must satisfy 0 < default_page_size <= max_page_size, got default={default} max={max}")]
    InvalidPageSize { default: usize, max: usize },

    #[error("max_file_size must be greater than 0, got {0}")]
    InvalidMaxFileSize(u64),

    #[error("tail_check_interval_ms must be greater than 0, got {0}")]
    InvalidTailInterval(u64),

    #[error("tail_buffer_size must be greater than 0, got {0}")]
    InvalidTailBufferSize(usize),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("auth_header must not be empty")]
    EmptyAuthHeader,
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the LogView daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP listener and served root.
    pub server: ServerConfig,

    /// Numeric limits for reading and tailing.
    pub limits: LimitsConfig,

    /// Pattern matching behaviour for groups.
    pub access: AccessConfig,

    /// Cross-origin settings for browser clients.
    pub cors: CorsConfig,

    /// File groups with access control.
    pub groups: Vec<GroupConfig>,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to bind to.
    pub port: u16,

    /// Directory all served paths are anchored to.
    pub base_path: PathBuf,

    /// HTTP header carrying the already-authenticated username.
    pub auth_header: String,
}

/// Limits applied by the file service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size served by paging and download (bytes).
    pub max_file_size: u64,

    /// Lines per page when the caller does not ask for a size.
    pub default_page_size: usize,

    /// Upper bound for a requested page size.
    pub max_page_size: usize,

    /// Delay between polls of an idle tailed file (milliseconds).
    pub tail_check_interval_ms: u64,

    /// Read buffer capacity for tail sessions (bytes).
    pub tail_buffer_size: usize,
}

/// How group patterns are matched against root-relative paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Pattern must match at the start of the path; trailing text may remain.
    #[default]
    Prefix,
    /// Pattern must match the entire path.
    Full,
}

/// Access-control settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AccessConfig {
    pub match_mode: MatchMode,
}

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub allow_credentials: bool,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
}

/// A file group: a regex over root-relative paths and the users it admits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupConfig {
    /// Unique group name.
    pub name: String,

    /// Regular expression matched against paths relative to `base_path`.
    pub pattern: String,

    /// Users authorized for this group.
    #[serde(default)]
    pub users: Vec<String>,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            base_path: PathBuf::from("/var/log"),
            auth_header: "X-User".to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024, // 100MB
            default_page_size: 1000,
            max_page_size: 10_000,
            tail_check_interval_ms: 1000,
            tail_buffer_size: 1024,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_credentials: true,
            allow_methods: vec!["*".to_string()],
            allow_headers: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    /// Address string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl LimitsConfig {
    pub fn tail_check_interval(&self) -> Duration {
        Duration::from_millis(self.tail_check_interval_ms)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("logview")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - LOGVIEW_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - LOGVIEW_BASE_PATH: Override the served root directory
    /// - LOGVIEW_AUTH_HEADER: Override the identity header name
    /// - LOGVIEW_PORT: Override the listening port
    pub fn apply_env_overrides(&mut self) {
        if let Some(level) = non_empty_env("LOGVIEW_LOG_LEVEL") {
            tracing::info!("Overriding log_level from environment: {}", level);
            self.daemon.log_level = level;
        }

        if let Some(base_path) = non_empty_env("LOGVIEW_BASE_PATH") {
            tracing::info!("Overriding base_path from environment: {}", base_path);
            self.server.base_path = PathBuf::from(base_path);
        }

        if let Some(header) = non_empty_env("LOGVIEW_AUTH_HEADER") {
            tracing::info!("Overriding auth_header from environment: {}", header);
            self.server.auth_header = header;
        }

        if let Some(port) = non_empty_env("LOGVIEW_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Overriding port from environment: {}", port);
                    self.server.port = port;
                }
                Err(e) => tracing::warn!("Ignoring invalid LOGVIEW_PORT {:?}: {}", port, e),
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// The served root must exist and be a directory, every group pattern
    /// must compile, and group names must be unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_path = &self.server.base_path;
        if !base_path.exists() {
            return Err(ConfigError::BasePathMissing(base_path.clone()));
        }
        if !base_path.is_dir() {
            return Err(ConfigError::BasePathNotDirectory(base_path.clone()));
        }

        if self.server.auth_header.trim().is_empty() {
            return Err(ConfigError::EmptyAuthHeader);
        }

        let limits = &self.limits;
        if limits.default_page_size == 0
            || limits.max_page_size == 0
            || limits.default_page_size > limits.max_page_size
        {
            return Err(ConfigError::InvalidPageSize {
                default: limits.default_page_size,
                max: limits.max_page_size,
            });
        }
        if limits.max_file_size == 0 {
            return Err(ConfigError::InvalidMaxFileSize(limits.max_file_size));
        }
        if limits.tail_check_interval_ms == 0 {
            return Err(ConfigError::InvalidTailInterval(limits.tail_check_interval_ms));
        }
        if limits.tail_buffer_size == 0 {
            return Err(ConfigError::InvalidTailBufferSize(limits.tail_buffer_size));
        }

        validate_groups(&self.groups)?;

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Group names must be non-empty and unique; patterns must compile.
pub(crate) fn validate_groups(groups: &[GroupConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for group in groups {
        if group.name.trim().is_empty() {
            return Err(ConfigError::EmptyGroupName);
        }
        if !seen.insert(group.name.as_str()) {
            return Err(ConfigError::DuplicateGroup(group.name.clone()));
        }
        regex::Regex::new(&group.pattern).map_err(|e| ConfigError::InvalidPattern {
            group: group.name.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
