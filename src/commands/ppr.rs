//! Soft post-package repair command

use crate::cli::args::PprArgs;
use crate::cli::output::{print_output, RepairOutcome};
use crate::cli::Cli;
use crate::commands::{connect, CliDevice};
use crate::error::Result;
use crate::telemetry::{PprType, RepairRecord};

fn repair_request(args: &PprArgs) -> RepairRecord {
    RepairRecord {
        channel: args.channel,
        rank: args.rank,
        bank: args.bank,
        bank_group: args.bank_group,
        row: args.row,
        cid: args.cid,
        ppr_type: PprType::Soft,
        nibble_mask: args.nibble_mask,
        ..Default::default()
    }
}

pub(crate) fn soft_ppr(device: &mut CliDevice, args: &PprArgs) -> Result<RepairOutcome> {
    let record = device.run_soft_ppr(&repair_request(args))?;
    if record.succeeded() {
        log::info!(
            "Soft PPR on channel {} row {:#x} succeeded",
            record.channel,
            record.row
        );
    } else {
        log::warn!(
            "Soft PPR on channel {} row {:#x} returned status {}",
            record.channel,
            record.row,
            record.status
        );
    }
    Ok(RepairOutcome {
        device: device.address(),
        succeeded: record.succeeded(),
        record,
    })
}

/// Execute the ppr command
pub fn run_ppr(args: &PprArgs, cli: &Cli) -> Result<()> {
    let (_config, mut device) = connect(cli)?;
    let outcome = soft_ppr(&mut device, args)?;
    print_output(&outcome, cli.format)?;
    Ok(())
}
