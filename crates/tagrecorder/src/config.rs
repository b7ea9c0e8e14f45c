//! Configuration management for tagrecorder.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "tagrecorder";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "tags.db";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "TAGRECORDER_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `TAGRECORDER_`, sections split on `__`)
/// 2. TOML config file at `~/.config/tagrecorder/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reader configuration.
    pub reader: ReaderConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Display configuration.
    pub display: DisplayConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Reader-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Path to the vendor driver library.
    /// Defaults to the platform library name next to the executable.
    pub library_path: Option<PathBuf>,
    /// Index of the USB device to open.
    pub device_index: u32,
    /// Interval between tag buffer polls in milliseconds.
    pub poll_interval_ms: u64,
    /// Identifier recorded with every tag this reader first sees.
    pub reader_id: String,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/tagrecorder/tags.db`
    pub database_path: Option<PathBuf>,
}

/// Live display configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Interval between display refreshes in milliseconds.
    pub refresh_interval_ms: u64,
    /// Maximum rows kept in each panel.
    pub max_rows: usize,
    /// Clear the terminal before each redraw.
    pub clear_screen: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append log output to this file in addition to stderr.
    pub file: Option<PathBuf>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            library_path: None, // Resolved next to the executable at runtime
            device_index: 0,
            poll_interval_ms: 100,
            reader_id: "default".to_string(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 100,
            max_rows: 500,
            clear_screen: true,
        }
    }
}

impl Config {
    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.reader.poll_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "poll_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.reader.reader_id.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "reader_id cannot be empty".to_string(),
            });
        }

        if self.display.refresh_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "refresh_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.display.max_rows == 0 {
            return Err(Error::ConfigValidation {
                message: "max_rows must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the driver library path, resolving defaults if not set.
    ///
    /// The default is the platform library name in the directory holding the
    /// running executable, falling back to the working directory.
    #[must_use]
    pub fn library_path(&self) -> PathBuf {
        self.reader.library_path.clone().unwrap_or_else(|| {
            let dir = std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("."));
            dir.join(tagrecorder_swhid::library_file_name())
        })
    }

    /// Get the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.reader.poll_interval_ms)
    }

    /// Get the display refresh interval as a Duration.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.display.refresh_interval_ms)
    }
}
