//! leoctl - Leo CXL memory controller management tool
//!
//! A command-line tool for reading link state, telemetry, event logs and
//! RAS data from Leo controllers over the I2C sideband mailbox.

use clap::Parser;
use leoctl::cli::args::{generate_completions, Cli, Commands};
use leoctl::commands::{
    run_events, run_info, run_link, run_ping, run_poison, run_ppr, run_scrub, run_telemetry,
};
use leoctl::error::{AppError, DeviceError, ProtocolError, TransportError};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Set log level based on verbose flag
    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    // Run the appropriate command
    let result = run(&cli);

    if let Err(e) = result {
        log::error!("{}", e);
        print_error(&e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), AppError> {
    match &cli.command {
        Commands::Ping(args) => run_ping(args, cli),

        Commands::Info => run_info(cli),

        Commands::Link(args) => run_link(args, cli),

        Commands::Telemetry(args) => run_telemetry(args, cli),

        Commands::Events(args) => run_events(args, cli),

        Commands::Poison(args) => run_poison(args, cli),

        Commands::Ppr(args) => run_ppr(args, cli),

        Commands::Scrub(args) => run_scrub(args, cli),

        Commands::Completions { shell } => {
            generate_completions(*shell);
            Ok(())
        }
    }
}

fn print_error(err: &AppError) {
    eprintln!("Error: {}", err);

    // Print helpful hints for common errors
    match err {
        AppError::Transport(TransportError::Io(_)) => {
            eprintln!();
            eprintln!("Hint: Make sure the i2c-dev module is loaded and that you can");
            eprintln!("      open /dev/i2c-N (try sudo or the i2c group).");
        }
        AppError::Device(DeviceError::Protocol(ProtocolError::Transport {
            source: TransportError::Nack,
            ..
        })) => {
            eprintln!();
            eprintln!("Hint: Nothing acknowledged the target address.");
            eprintln!("      Check --bus and --address, e.g. with 'i2cdetect -y N'.");
        }
        AppError::Device(DeviceError::Protocol(ProtocolError::Timeout { .. })) => {
            eprintln!();
            eprintln!("Hint: The firmware did not answer. Try a larger --timeout-ms.");
        }
        _ => {}
    }
}
