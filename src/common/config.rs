//! Configuration file handling

use serde::Deserialize;
use std::path::Path;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Callback listener defaults
    #[serde(default)]
    pub callback: ListenerDefaults,
}

/// Outbound HTTP settings
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Timeout for a single request/response exchange
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

/// Callback listener defaults, in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct ListenerDefaults {
    /// Callback wait used when a suite leaves `max_wait_seconds` at 0
    #[serde(default = "default_max_wait")]
    pub default_max_wait_secs: u64,

    /// Bound on the graceful shutdown of the listener
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ListenerDefaults {
    fn default() -> Self {
        Self {
            default_max_wait_secs: default_max_wait(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_max_wait() -> u64 {
    5
}
fn default_shutdown_timeout() -> u64 {
    3
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
