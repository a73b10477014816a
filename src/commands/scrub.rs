//! Scrub command implementation

use crate::cli::args::{ScrubArgs, ScrubCommands};
use crate::cli::output::{print_output, RecordView};
use crate::cli::Cli;
use crate::commands::connect;
use crate::error::Result;

/// Execute a scrub subcommand
pub fn run_scrub(args: &ScrubArgs, cli: &Cli) -> Result<()> {
    let (_config, mut device) = connect(cli)?;

    match args.command {
        ScrubCommands::Show => {
            let config = device.scrub_config()?;
            let view = RecordView {
                device: device.address(),
                index: 0,
                record: config.into(),
            };
            print_output(&view, cli.format)?;
        }
    }

    Ok(())
}
