//! Ping command implementation

use crate::cli::args::PingArgs;
use crate::cli::output::{print_output, PingReport};
use crate::cli::Cli;
use crate::commands::{connect, CliDevice};
use crate::error::Result;

fn echo_payload(size: u16) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

pub(crate) fn ping_report(device: &CliDevice, args: &PingArgs) -> Result<PingReport> {
    let payload = echo_payload(args.size);
    let mut rtts = Vec::with_capacity(args.count as usize);
    for seq in 0..args.count {
        let rtt = device.ping(&payload)?;
        log::debug!("ping seq={} rtt={:?}", seq, rtt);
        rtts.push(rtt);
    }
    Ok(PingReport::new(device.address(), payload.len(), &rtts))
}

/// Execute the ping command
pub fn run_ping(args: &PingArgs, cli: &Cli) -> Result<()> {
    let (_config, device) = connect(cli)?;
    let report = ping_report(&device, args)?;
    print_output(&report, cli.format)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::simulated;

    #[test]
    fn test_ping_collects_each_round_trip() {
        let device = simulated();
        let report = ping_report(&device, &PingArgs { count: 3, size: 300 }).unwrap();
        assert_eq!(report.round_trips_us.len(), 3);
        assert_eq!(report.payload_bytes, 300);
    }

    #[test]
    fn test_echo_payload_pattern() {
        let payload = echo_payload(260);
        assert_eq!(payload[250], 250);
        assert_eq!(payload[251], 0);
    }
}
