//! Configuration for the davgate server
//!
//! Handles loading and validating server configuration from TOML files
//! and the environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::logging::LogLevel;

/// Environment variable overriding the storage root.
pub const ROOT_ENV: &str = "DAVGATE_ROOT";

/// Environment variable overriding the log level.
pub const LOG_ENV: &str = "DAVGATE_LOG";

/// Which lock manager backs the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    /// Locks live in process memory and vanish on exit
    #[default]
    Memory,
    /// Locks are persisted to a table file shared between processes
    File,
}

/// Lock manager configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockConfig {
    /// Backend selection
    #[serde(default)]
    pub backend: LockBackend,

    /// Directory holding the lock table for the file backend
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level of emitted events
    #[serde(default)]
    pub level: LogLevel,
}

/// Copy/move configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum nesting of a recursive copy before it fails
    #[serde(default = "default_max_copy_recursion")]
    pub max_copy_recursion: usize,
}

fn default_max_copy_recursion() -> usize {
    1000
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_copy_recursion: default_max_copy_recursion(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Storage root directory
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Lock manager configuration
    #[serde(default)]
    pub locks: LockConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Copy/move configuration
    #[serde(default)]
    pub transfer: TransferConfig,
}

fn default_root() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            locks: LockConfig::default(),
            logging: LoggingConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a file
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to a TOML file. A missing file is not an
    ///   error; the defaults are used instead.
    ///
    /// # Returns
    ///
    /// * `Ok(ServerConfig)` - The validated configuration.
    /// * `Err(ConfigError)` - The file could not be read, parsed or validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = ServerConfig::default();

        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());

            if !path.exists() {
                warn!("Configuration file not found: {}", path.display());
            } else {
                let content = fs::read_to_string(path).map_err(|e| {
                    ConfigError::Load(format!("{}: {}", path.display(), e))
                })?;
                config = Self::from_toml(&content)?;
            }
        } else {
            info!("No configuration file specified, using defaults");
        }

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text without validating it.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment overrides on top of the loaded values.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(root) = env::var(ROOT_ENV) {
            if !root.is_empty() {
                self.root = PathBuf::from(root);
            }
        }

        if let Ok(level) = env::var(LOG_ENV) {
            self.logging.level = level
                .parse()
                .map_err(|e: String| ConfigError::Invalid(format!("{}: {}", LOG_ENV, e)))?;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("Storage root cannot be empty".to_string()));
        }

        if self.locks.backend == LockBackend::File && self.locks.directory.is_none() {
            return Err(ConfigError::Invalid(
                "File lock backend requires a directory".to_string(),
            ));
        }

        if self.locks.backend == LockBackend::Memory && self.locks.directory.is_some() {
            warn!("Lock directory is ignored by the memory backend");
        }

        if self.transfer.max_copy_recursion == 0 {
            return Err(ConfigError::Invalid(
                "Copy recursion ceiling cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}
