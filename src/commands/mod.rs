//! Command handlers
//!
//! Each command handler orchestrates the execution of a CLI command.

pub mod events;
pub mod info;
pub mod link;
pub mod ping;
pub mod poison;
pub mod ppr;
pub mod scrub;
pub mod telemetry;

pub use events::run_events;
pub use info::run_info;
pub use link::run_link;
pub use ping::run_ping;
pub use poison::run_poison;
pub use ppr::run_ppr;
pub use scrub::run_scrub;
pub use telemetry::run_telemetry;

use crate::cli::Cli;
use crate::config::{Config, ConfigBuilder};
use crate::device::Device;
use crate::error::Result;
use crate::transport::Transport;

/// Device handle used by every command
pub type CliDevice = Device<Box<dyn Transport>>;

/// Merge the configuration file with command-line overrides
pub fn load_config(cli: &Cli) -> Result<Config> {
    let config = ConfigBuilder::new()
        .with_file(cli.config.as_deref())?
        .with_verbose(cli.verbose.then_some(true))
        .with_bus(cli.bus)
        .with_address(cli.address)
        .with_bifurcation(cli.bifurcation.clone())
        .with_timeout_ms(cli.timeout_ms)
        .with_retries(cli.retries)
        .build()?;
    Ok(config)
}

/// Open the configured controller
pub fn open_device(config: &Config, simulate: bool) -> Result<CliDevice> {
    let address = config.device_address()?;
    let options = config.device_options()?;
    let transport = open_transport(config, simulate)?;
    Ok(Device::open(address, transport, options)?)
}

fn open_transport(config: &Config, simulate: bool) -> Result<Box<dyn Transport>> {
    if simulate {
        return simulated_transport();
    }
    hardware_transport(config)
}

#[cfg(any(test, feature = "mock"))]
fn simulated_transport() -> Result<Box<dyn Transport>> {
    let (transport, _handle) = crate::mock::MockTransport::demo();
    log::info!("Using simulated controller");
    Ok(Box::new(transport))
}

#[cfg(not(any(test, feature = "mock")))]
fn simulated_transport() -> Result<Box<dyn Transport>> {
    Err(crate::error::AppError::Unsupported(
        "--simulate requires a build with the 'mock' feature".to_string(),
    ))
}

#[cfg(target_os = "linux")]
fn hardware_transport(config: &Config) -> Result<Box<dyn Transport>> {
    let address = config.device_address()?;
    let transport = crate::transport::I2cDevTransport::open(address.bus, address.address)?;
    Ok(Box::new(transport))
}

#[cfg(not(target_os = "linux"))]
fn hardware_transport(_config: &Config) -> Result<Box<dyn Transport>> {
    Err(crate::error::AppError::Unsupported(
        "the i2c-dev transport is only available on Linux".to_string(),
    ))
}

/// Load the configuration and open the device in one step
pub fn connect(cli: &Cli) -> Result<(Config, CliDevice)> {
    let config = load_config(cli)?;
    let device = open_device(&config, cli.simulate)?;
    Ok((config, device))
}
