//! Configuration file handling for `~/.tilestudio/config.ini`.
//!
//! Every key is optional; missing keys keep their defaults. Parsing lives in
//! [`parser`] and serialization in [`writer`].

mod parser;
mod writer;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use crate::compose::{DEFAULT_JPEG_QUALITY, DEFAULT_WORKERS};
use crate::fetch::{DEFAULT_CACHE_MAX_AGE, DEFAULT_GRID_MAX_AGE};
use crate::ledger::DEFAULT_LEDGER_CAPACITY;
use crate::request::DEFAULT_PIXEL_LIMIT;
use crate::service::ServiceConfig;

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "tilestudio.log";

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub bind: SocketAddr,
}

/// `[tiles]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSettings {
    pub cache_max_age: u64,
    pub grid_max_age: u64,
}

/// `[static]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSettings {
    pub pixel_limit: u64,
    pub workers: usize,
    pub jpeg_quality: u8,
}

/// `[ledger]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    pub capacity: usize,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

/// Complete user configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub server: ServerSettings,
    pub tiles: TileSettings,
    pub static_maps: StaticSettings,
    pub ledger: LedgerSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            },
            tiles: TileSettings {
                cache_max_age: DEFAULT_CACHE_MAX_AGE,
                grid_max_age: DEFAULT_GRID_MAX_AGE,
            },
            static_maps: StaticSettings {
                pixel_limit: DEFAULT_PIXEL_LIMIT,
                workers: DEFAULT_WORKERS,
                jpeg_quality: DEFAULT_JPEG_QUALITY,
            },
            ledger: LedgerSettings {
                capacity: DEFAULT_LEDGER_CAPACITY,
            },
            logging: LoggingSettings {
                directory: config_directory().join("logs"),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}

impl ConfigFile {
    /// Load configuration from the default path (~/.tilestudio/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        parser::parse_ini(&ini)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Create the default config file if it doesn't exist.
    ///
    /// Returns the path to the config file.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }

    /// Pipeline tunables derived from this file.
    pub fn to_service_config(&self) -> ServiceConfig {
        ServiceConfig::default()
            .with_cache_max_age(self.tiles.cache_max_age)
            .with_grid_max_age(self.tiles.grid_max_age)
            .with_pixel_limit(self.static_maps.pixel_limit)
            .with_workers(self.static_maps.workers)
            .with_jpeg_quality(self.static_maps.jpeg_quality)
            .with_ledger_capacity(self.ledger.capacity)
    }
}

/// Get the path to the config directory (~/.tilestudio).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tilestudio")
}

/// Get the path to the config file (~/.tilestudio/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}
