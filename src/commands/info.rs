//! Info command implementation
//!
//! Shows the firmware version, a fresh poll of every link and the mailbox
//! counters.

use crate::cli::output::{print_output, DeviceInfo};
use crate::cli::Cli;
use crate::commands::{connect, CliDevice};
use crate::error::Result;

pub(crate) fn device_info(device: &mut CliDevice) -> Result<DeviceInfo> {
    let firmware = device.firmware_version()?;
    device.poll_links()?;
    let links = device.links().iter().map(|link| link.status()).collect();
    Ok(DeviceInfo {
        device: device.address(),
        transport: device.engine().with_transport(|t| t.describe()),
        firmware,
        links,
        mailbox: device.mailbox_stats(),
    })
}

/// Execute the info command
pub fn run_info(cli: &Cli) -> Result<()> {
    let (_config, mut device) = connect(cli)?;
    let info = device_info(&mut device)?;
    print_output(&info, cli.format)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::output::TableDisplay;
    use crate::commands::tests::simulated;

    #[test]
    fn test_info_reports_firmware_and_links() {
        let mut device = simulated();
        let info = device_info(&mut device).unwrap();
        assert_eq!(info.transport, "simulated controller");
        assert_eq!(info.links.len(), 1);
        assert!(info.mailbox.completed >= 2);

        let table = info.to_table();
        assert!(table.contains("Firmware: 1.2 build 417"));
        assert!(table.contains("Link 0"));
    }
}
