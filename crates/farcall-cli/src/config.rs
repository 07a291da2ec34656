//! CLI configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/farcall/config.toml` by default. Command-line flags override
//! the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use farcall_core::tracing::{TracingConfig, TracingOutputFormat};

/// Configuration for the farcall CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Path to the socket. Defaults to the runtime directory.
    pub socket_path: Option<PathBuf>,

    /// Service name to expose or connect to.
    pub service: String,

    /// Maximum concurrent connections accepted by `serve`.
    pub max_connections: usize,

    /// Logging settings.
    pub logging: LoggingSettings,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            service: farcall_core::DEFAULT_SERVICE.to_string(),
            max_connections: 100,
            logging: LoggingSettings::default(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level for farcall targets: `error`, `warn`, `info`, `debug` or `trace`.
    pub level: String,

    /// Output format: `pretty`, `compact` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl LoggingSettings {
    /// Builds the tracing configuration for these settings.
    pub fn to_tracing_config(&self) -> Result<TracingConfig, String> {
        let level = self
            .level
            .parse()
            .map_err(|_| format!("unknown log level: {}", self.level))?;
        let format = TracingOutputFormat::parse(&self.format)
            .ok_or_else(|| format!("unknown log format: {}", self.format))?;
        Ok(TracingConfig::default().with_level(level).with_format(format))
    }
}

impl CliConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("farcall")
    }

    /// Socket path: the flag if given, then the file, then the default.
    pub fn resolve_socket_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.socket_path.clone())
            .unwrap_or_else(farcall_core::default_socket_path)
    }

    /// Service name: the flag if given, then the file.
    pub fn resolve_service<'a>(&'a self, flag: Option<&'a str>) -> &'a str {
        flag.unwrap_or(&self.service)
    }
}
