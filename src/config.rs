//! # Configuration Management Module
//!
//! Persistent settings stored in platform-appropriate locations.
//! Handles loading, saving, and providing defaults for configuration options.
//!
//! ## Settings
//! - `device_address`: Last device address that connected successfully
//! - `device_port`: Websocket port used when the address carries none
//! - `enable_autoconnect`: Connect to `device_address` at start-up
//! - `analysis_url`: Endpoint of the ECG analysis service
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/ecg-leads/config.toml
//! - Linux: ~/.config/ecg-leads/config.toml
//! - Windows: %APPDATA%\ecg-leads\config.toml

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Port the acquisition firmware serves its websocket on
pub const DEFAULT_DEVICE_PORT: u16 = 81;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device_address: Option<String>,
    pub device_port: u16,
    pub enable_autoconnect: bool,
    pub analysis_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_address: None,
            device_port: DEFAULT_DEVICE_PORT,
            enable_autoconnect: false,
            analysis_url: "http://127.0.0.1:8000/api/analyze".to_string(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ecg-leads")
            .join("config.toml")
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::default_path())
    }

    /// Load config from `path`, or write and return the default if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str(&contents).map_err(ConfigError::ParseFailed)?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    /// Websocket URL for a user-entered device address.
    ///
    /// Full `ws://`/`wss://` URLs pass through, `host:port` keeps its port and
    /// a bare host gets `device_port`.
    pub fn endpoint_url(&self, address: &str) -> String {
        let address = address.trim();
        if address.starts_with("ws://") || address.starts_with("wss://") {
            address.to_string()
        } else if address.contains(':') {
            format!("ws://{}", address)
        } else {
            format!("ws://{}:{}", address, self.device_port)
        }
    }
}
