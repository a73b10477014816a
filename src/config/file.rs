//! Configuration file loading
//!
//! Handles loading configuration from TOML files.

use crate::config::Config;
use crate::error::ConfigError;

use std::path::{Path, PathBuf};

/// Configuration file handler
pub struct ConfigFile;

impl ConfigFile {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load the first default location that exists
    ///
    /// A file that exists but does not parse is an error rather than being
    /// skipped in favour of the next location.
    pub fn load_default() -> Result<Option<Config>, ConfigError> {
        for path in Self::default_paths() {
            if path.exists() {
                return Self::load(&path).map(Some);
            }
        }
        Ok(None)
    }

    /// Default configuration file paths in search order
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System-wide config
        paths.push(PathBuf::from("/etc/leoctl/config.toml"));

        // User config
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("leoctl").join("config.toml"));
        }

        // Current directory
        paths.push(PathBuf::from("leoctl.toml"));

        paths
    }

    /// Serialize `config` as TOML
    pub fn to_toml(config: &Config) -> Result<String, ConfigError> {
        toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            message: e.to_string(),
        })
    }
}
