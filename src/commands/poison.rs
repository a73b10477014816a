//! Poison command implementation

use crate::cli::args::{PoisonArgs, PoisonCommands};
use crate::cli::output::{print_output, Message, PoisonReport};
use crate::cli::Cli;
use crate::commands::{connect, CliDevice};
use crate::error::Result;

pub(crate) fn list_poison(device: &mut CliDevice, dpa: u64, range: Option<u64>) -> Result<PoisonReport> {
    let range = range.unwrap_or(u64::MAX - dpa);
    let list = device.poison_list(dpa, range)?;
    Ok(PoisonReport {
        device: device.address(),
        list,
    })
}

/// Execute a poison subcommand
pub fn run_poison(args: &PoisonArgs, cli: &Cli) -> Result<()> {
    let (_config, mut device) = connect(cli)?;

    match &args.command {
        PoisonCommands::List { dpa, range } => {
            let report = list_poison(&mut device, *dpa, *range)?;
            print_output(&report, cli.format)?;
        }
        PoisonCommands::Inject { dpa } => {
            device.inject_poison(*dpa)?;
            print_output(
                &Message::new(format!("Poison injected at {:#x}", dpa)),
                cli.format,
            )?;
        }
        PoisonCommands::Clear { dpa } => {
            device.clear_poison(*dpa)?;
            print_output(
                &Message::new(format!("Poison cleared at {:#x}", dpa)),
                cli.format,
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::simulated;
    use crate::error::{AppError, DeviceError};

    #[test]
    fn test_list_whole_device() {
        let mut device = simulated();
        let report = list_poison(&mut device, 0, None).unwrap();
        assert_eq!(report.list.records.len(), 1);
    }

    #[test]
    fn test_inject_then_list_range() {
        let mut device = simulated();
        device.inject_poison(0x8_0000).unwrap();
        let report = list_poison(&mut device, 0x8_0000, Some(0x40)).unwrap();
        assert_eq!(report.list.records.len(), 1);
        assert_eq!(report.list.records[0].dpa, 0x8_0000);

        device.clear_poison(0x8_0000).unwrap();
        let report = list_poison(&mut device, 0x8_0000, Some(0x40)).unwrap();
        assert!(report.list.records.is_empty());
    }

    #[test]
    fn test_unaligned_list_rejected() {
        let mut device = simulated();
        assert!(matches!(
            list_poison(&mut device, 0x41, None),
            Err(AppError::Device(DeviceError::InvalidArgument(_)))
        ));
    }
}
