//! Daemon configuration.
//!
//! Configuration is optional: with no file the daemon runs on defaults. The
//! `EDSYNC_SOCKET` environment variable overrides the socket path either way,
//! which is what the editor adapters set when pointing at a non-default
//! daemon.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/edsyncd.sock";

/// Default pairing window in milliseconds
pub const DEFAULT_PAIRING_WINDOW_MS: u64 = 200;

/// Environment variable overriding the socket path.
pub const SOCKET_ENV_VAR: &str = "EDSYNC_SOCKET";

/// Daemon configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path of the Unix socket the daemon listens on.
    pub socket_path: PathBuf,

    /// How long a remove is held back waiting for its matching insert,
    /// in milliseconds.
    pub pairing_window_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            pairing_window_ms: DEFAULT_PAIRING_WINDOW_MS,
        }
    }
}

impl Config {
    /// Loads configuration from an optional file, then applies environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Ok(socket) = env::var(SOCKET_ENV_VAR) {
            config.socket_path = PathBuf::from(socket);
        }

        Ok(config)
    }

    /// Parses configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    pub fn pairing_window(&self) -> Duration {
        Duration::from_millis(self.pairing_window_ms)
    }
}

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config file {path}: {error}")]
    Parse { path: PathBuf, error: String },
}
