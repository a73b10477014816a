//! Configuration builder
//!
//! Merges configuration from files and CLI arguments.

use crate::config::{Config, ConfigFile};
use crate::error::ConfigError;

/// Builder for merging configuration sources
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Load configuration from `path`, or from the default locations
    ///
    /// An explicit path that cannot be read is an error. Missing default
    /// files are not.
    pub fn with_file(mut self, path: Option<&str>) -> Result<Self, ConfigError> {
        let file_config = match path {
            Some(path) => Some(ConfigFile::load(path)?),
            None => ConfigFile::load_default()?,
        };

        if let Some(cfg) = file_config {
            self.config = cfg;
        }

        Ok(self)
    }

    /// Override with CLI verbose flag
    pub fn with_verbose(mut self, verbose: Option<bool>) -> Self {
        if let Some(v) = verbose {
            self.config.general.verbose = v;
        }
        self
    }

    /// Override with CLI I2C bus
    pub fn with_bus(mut self, bus: Option<u8>) -> Self {
        if let Some(b) = bus {
            self.config.device.i2c_bus = b;
        }
        self
    }

    /// Override with CLI target address
    pub fn with_address(mut self, address: Option<u16>) -> Self {
        if let Some(a) = address {
            self.config.device.address = a;
        }
        self
    }

    /// Override with CLI bifurcation
    pub fn with_bifurcation(mut self, bifurcation: Option<String>) -> Self {
        if let Some(b) = bifurcation {
            self.config.device.bifurcation = b;
        }
        self
    }

    /// Override with CLI mailbox timeout
    pub fn with_timeout_ms(mut self, timeout: Option<u64>) -> Self {
        if let Some(t) = timeout {
            self.config.mailbox.timeout_ms = t;
        }
        self
    }

    /// Override with CLI retry count
    pub fn with_retries(mut self, retries: Option<u32>) -> Self {
        if let Some(r) = retries {
            self.config.mailbox.retries = r;
        }
        self
    }

    /// Override with CLI poll interval
    pub fn with_poll_interval_ms(mut self, interval: Option<u64>) -> Self {
        if let Some(i) = interval {
            self.config.link.poll_interval_ms = i;
        }
        self
    }

    /// Validate and return the final configuration
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert!(!config.general.verbose);
        assert_eq!(config.device.address, 0x40);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConfigBuilder::new()
            .with_verbose(Some(true))
            .with_bus(Some(3))
            .with_address(Some(0x51))
            .with_bifurcation(Some("2x8".to_string()))
            .with_retries(Some(0))
            .with_poll_interval_ms(None)
            .build()
            .unwrap();

        assert!(config.general.verbose);
        assert_eq!(config.device.i2c_bus, 3);
        assert_eq!(config.device.address, 0x51);
        assert_eq!(config.mailbox.retries, 0);
        assert_eq!(config.link.poll_interval_ms, 500);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[device]\ni2c_bus = 2\naddress = 0x30").unwrap();

        let config = ConfigBuilder::new()
            .with_file(file.path().to_str())
            .unwrap()
            .with_bus(Some(9))
            .build()
            .unwrap();
        assert_eq!(config.device.i2c_bus, 9);
        assert_eq!(config.device.address, 0x30);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        assert!(matches!(
            ConfigBuilder::new().with_file(Some("/nonexistent/leoctl.toml")),
            Err(ConfigError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_override_fails_build() {
        let result = ConfigBuilder::new().with_address(Some(0x02)).build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
