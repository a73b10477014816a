//! Configuration system
//!
//! Handles TOML config file parsing, CLI argument merging and validation.

pub mod builder;
pub mod file;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use crate::device::{DeviceAddress, DeviceOptions};
use crate::error::ConfigError;
use crate::link::Bifurcation;
use crate::mailbox::RetryPolicy;
use crate::services::MonitorConfig;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lowest non-reserved 7-bit I2C address
const FIRST_TARGET_ADDRESS: u16 = 0x08;
/// Highest non-reserved 7-bit I2C address
const LAST_TARGET_ADDRESS: u16 = 0x77;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Controller location and lane layout
    pub device: DeviceConfig,
    /// Mailbox timing
    pub mailbox: MailboxConfig,
    /// Link monitoring
    pub link: LinkSettings,
    /// Event log reading
    pub events: EventsConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,
}

/// Controller location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// I2C adapter number (`/dev/i2c-N`)
    pub i2c_bus: u8,
    /// 7-bit target address
    pub address: u16,
    /// Lane bifurcation, "1x16" or "2x8"
    pub bifurcation: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 0,
            address: 0x40,
            bifurcation: Bifurcation::X16.to_string(),
        }
    }
}

/// Mailbox retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    pub timeout_ms: u64,
    pub retries: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            timeout_ms: policy.timeout.as_millis() as u64,
            retries: policy.retries,
            backoff_ms: policy.backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
        }
    }
}

impl MailboxConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            retries: self.retries,
            backoff: Duration::from_millis(self.backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Link monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Link polled by `link status` and `link watch`; every link when unset
    pub index: Option<usize>,
    /// Interval between polls in `link watch`
    pub poll_interval_ms: u64,
    /// LTSSM history entries kept per link
    pub history_capacity: usize,
    /// DIMM temperature (°C) that `link watch --dimm` reports as overheat
    pub dimm_alert_c: f32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            index: None,
            poll_interval_ms: 500,
            history_capacity: 64,
            dimm_alert_c: MonitorConfig::DEFAULT_DIMM_ALERT_C,
        }
    }
}

/// Event log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Event records kept in the host-side journal
    pub journal_capacity: usize,
    /// Most pages fetched by one read
    pub max_pages: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            journal_capacity: 256,
            max_pages: 16,
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

impl Config {
    /// Check every value the device layer cannot accept
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bifurcation()?;
        self.device_address()?;
        if self.link.history_capacity == 0 {
            return Err(invalid("link.history_capacity", "must be at least 1"));
        }
        if !self.link.dimm_alert_c.is_finite() {
            return Err(invalid("link.dimm_alert_c", "must be a finite temperature"));
        }
        if self.events.journal_capacity == 0 {
            return Err(invalid("events.journal_capacity", "must be at least 1"));
        }
        if self.events.max_pages == 0 {
            return Err(invalid("events.max_pages", "must be at least 1"));
        }
        if self.mailbox.timeout_ms == 0 {
            return Err(invalid("mailbox.timeout_ms", "must be greater than 0"));
        }
        if self.mailbox.max_backoff_ms < self.mailbox.backoff_ms {
            return Err(invalid(
                "mailbox.max_backoff_ms",
                format!("must be at least backoff_ms ({})", self.mailbox.backoff_ms),
            ));
        }
        Ok(())
    }

    pub fn bifurcation(&self) -> Result<Bifurcation, ConfigError> {
        self.device.bifurcation.parse()
    }

    /// Bus address, rejecting 10-bit and reserved addresses
    pub fn device_address(&self) -> Result<DeviceAddress, ConfigError> {
        let address = self.device.address;
        if address > 0x7f {
            return Err(invalid(
                "device.address",
                format!("{:#x} is a 10-bit address", address),
            ));
        }
        if !(FIRST_TARGET_ADDRESS..=LAST_TARGET_ADDRESS).contains(&address) {
            return Err(invalid(
                "device.address",
                format!("{:#04x} is reserved", address),
            ));
        }
        Ok(DeviceAddress::new(self.device.i2c_bus, address as u8))
    }

    pub fn device_options(&self) -> Result<DeviceOptions, ConfigError> {
        Ok(DeviceOptions {
            bifurcation: self.bifurcation()?,
            retry: self.mailbox.to_policy(),
            history_capacity: self.link.history_capacity,
            journal_capacity: self.events.journal_capacity,
            max_event_pages: self.events.max_pages,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.link.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.device_address().unwrap(), DeviceAddress::new(0, 0x40));
        assert_eq!(config.bifurcation().unwrap(), Bifurcation::X16);
        assert_eq!(config.mailbox.to_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_zero_history_capacity_rejected() {
        let mut config = Config::default();
        config.link.history_capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "link.history_capacity"
        ));
    }

    #[test]
    fn test_reserved_and_ten_bit_addresses_rejected() {
        let mut config = Config::default();
        for address in [0x00, 0x07, 0x78, 0x7f, 0x80, 0x3ff] {
            config.device.address = address;
            assert!(config.validate().is_err(), "address {:#x}", address);
        }
        config.device.address = 0x08;
        assert!(config.validate().is_ok());
        config.device.address = 0x77;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_bifurcation_rejected() {
        let mut config = Config::default();
        config.device.bifurcation = "4x4".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
        config.device.bifurcation = "2x8".to_string();
        assert_eq!(
            config.device_options().unwrap().bifurcation,
            Bifurcation::X8X8
        );
    }

    #[test]
    fn test_default_config_writes_only_read_keys() {
        let text = toml::to_string(&Config::default()).unwrap();
        assert!(text.contains("i2c_bus"));
        assert!(text.contains("dimm_alert_c = 110.0"));
        assert!(!text.contains("controller_index"));
    }

    #[test]
    fn test_non_finite_alert_threshold_rejected() {
        let mut config = Config::default();
        config.link.dimm_alert_c = f32::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "link.dimm_alert_c"
        ));
    }

    #[test]
    fn test_backoff_bounds() {
        let mut config = Config::default();
        config.mailbox.backoff_ms = 500;
        config.mailbox.max_backoff_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [device]
            i2c_bus = 4
            bifurcation = "2x8"

            [link]
            history_capacity = 8
            dimm_alert_c = 95.5
            "#,
        )
        .unwrap();
        assert_eq!(config.device.i2c_bus, 4);
        assert_eq!(config.device.address, 0x40);
        assert_eq!(config.link.history_capacity, 8);
        assert_eq!(config.link.dimm_alert_c, 95.5);
        assert_eq!(config.events.max_pages, 16);
        config.validate().unwrap();
    }
}
