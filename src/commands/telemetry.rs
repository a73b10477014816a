//! Telemetry command implementation
//!
//! Reads one record. Kinds with a dedicated mailbox command go through the
//! typed accessor so their extra checks apply. Everything else uses the
//! generic telemetry read.

use crate::cli::args::TelemetryArgs;
use crate::cli::output::{print_output, RecordView};
use crate::cli::Cli;
use crate::commands::{connect, CliDevice};
use crate::error::{AppError, Result};
use crate::telemetry::{RecordKind, TelemetryRecord};

/// Skip the last 64 bytes of DPA space so the range never wraps
const FULL_RANGE: u64 = u64::MAX & !0x3f;

pub(crate) fn read_record(device: &mut CliDevice, args: &TelemetryArgs) -> Result<RecordView> {
    let index = args.index;
    let record = match args.kind {
        RecordKind::DimmThermal => device.dimm_thermal(index)?.into(),
        RecordKind::SpdInfo => device.spd_info(index)?.into(),
        RecordKind::DdrPhyMargins => device.ddr_phy_margins(index, args.margin)?.into(),
        RecordKind::ErrInfo => device.err_info()?.into(),
        RecordKind::PersistentData => device.persistent_data(args.id)?.into(),
        RecordKind::ScrubConfig => device.scrub_config()?.into(),
        RecordKind::PoisonList => TelemetryRecord::PoisonList(device.poison_list(0, FULL_RANGE)?),
        RecordKind::EventLogPage => {
            return Err(AppError::Unsupported(
                "event records are read with `leoctl events get`".to_string(),
            ))
        }
        RecordKind::RepairList => {
            return Err(AppError::Unsupported(
                "repair outcomes are returned by `leoctl ppr`".to_string(),
            ))
        }
        kind => device.read_telemetry(kind, index)?,
    };

    Ok(RecordView {
        device: device.address(),
        index,
        record,
    })
}

/// Execute the telemetry command
pub fn run_telemetry(args: &TelemetryArgs, cli: &Cli) -> Result<()> {
    let (_config, mut device) = connect(cli)?;
    let view = read_record(&mut device, args)?;
    print_output(&view, cli.format)?;
    Ok(())
}
