//! Link command implementation
//!
//! `status` polls once and prints the link table. `watch` runs the link
//! monitor and prints one line per transition or temperature alert.

use crate::cli::args::{LinkArgs, LinkCommands, OutputFormat};
use crate::cli::output::{print_output, LinkReport, WatchLine};
use crate::cli::Cli;
use crate::commands::{connect, CliDevice};
use crate::error::Result;
use crate::services::{LinkMonitor, MonitorConfig};

use std::time::Duration;

/// Execute a link subcommand
pub fn run_link(args: &LinkArgs, cli: &Cli) -> Result<()> {
    let (config, mut device) = connect(cli)?;

    match &args.command {
        LinkCommands::Status { link, history } => {
            let report = link_report(&mut device, link.or(config.link.index), *history)?;
            print_output(&report, cli.format)?;
        }
        LinkCommands::Watch {
            interval_ms,
            count,
            dimms,
            alert_c,
        } => {
            let interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.poll_interval());
            let monitor = LinkMonitor::new(MonitorConfig {
                interval,
                max_ticks: *count,
                links: config.link.index.into_iter().collect(),
                dimms: dimms.clone(),
                dimm_alert_c: alert_c.unwrap_or(config.link.dimm_alert_c),
                ..Default::default()
            });
            watch(&monitor, &mut device, cli.format)?;
        }
    }

    Ok(())
}

pub(crate) fn link_report(
    device: &mut CliDevice,
    link: Option<usize>,
    history: bool,
) -> Result<LinkReport> {
    let indices: Vec<usize> = match link {
        Some(index) => vec![index],
        None => (0..device.links().len()).collect(),
    };

    let mut links = Vec::with_capacity(indices.len());
    let mut histories = Vec::with_capacity(indices.len());
    for index in indices {
        device.poll_link(index)?;
        links.push(device.link(index)?.status());
        if history {
            histories.push(device.ltssm_history(index)?);
        }
    }

    Ok(LinkReport {
        device: device.address(),
        links,
        history: history.then_some(histories),
    })
}

fn watch(monitor: &LinkMonitor, device: &mut CliDevice, format: OutputFormat) -> Result<()> {
    let address = device.address();
    log::info!(
        "Watching {} every {:?}",
        address,
        monitor.config().interval
    );
    monitor.run(device, |event| {
        let line = WatchLine {
            device: address,
            event: event.clone(),
        };
        if let Err(e) = print_output(&line, format) {
            log::warn!("Failed to write monitor event: {}", e);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::simulated;
    use crate::link::LtssmState;

    #[test]
    fn test_status_polls_requested_link() {
        let mut device = simulated();
        let report = link_report(&mut device, Some(0), true).unwrap();
        assert_eq!(report.links.len(), 1);
        assert_eq!(report.links[0].state, LtssmState::ProtocolReset0);
        let history = report.history.unwrap();
        assert_eq!(history[0].len(), 1);
    }

    #[test]
    fn test_status_history_accumulates() {
        let mut device = simulated();
        link_report(&mut device, None, false).unwrap();
        link_report(&mut device, None, false).unwrap();
        let report = link_report(&mut device, None, true).unwrap();
        let states: Vec<_> = report.history.unwrap()[0]
            .iter()
            .map(|e| e.state)
            .collect();
        assert_eq!(
            states,
            vec![
                LtssmState::ProtocolReset0,
                LtssmState::DetectOrDeskew,
                LtssmState::EqP2_0
            ]
        );
    }

    #[test]
    fn test_status_unknown_link() {
        let mut device = simulated();
        assert!(link_report(&mut device, Some(3), false).is_err());
    }
}
