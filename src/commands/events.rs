//! Events command implementation

use crate::cli::args::{EventsArgs, EventsCommands};
use crate::cli::output::{print_output, EventList, Message};
use crate::cli::Cli;
use crate::commands::{connect, CliDevice};
use crate::device::JournalEntry;
use crate::error::Result;
use crate::events::{ClearSelector, EventLogKind};

pub(crate) fn read_events(device: &mut CliDevice, log: Option<EventLogKind>) -> Result<EventList> {
    let logs = match log {
        Some(log) => vec![log],
        None => EventLogKind::ALL.to_vec(),
    };

    let mut records = Vec::new();
    for log in logs {
        for entry in device.event_records(log)? {
            records.push(JournalEntry { log, entry });
        }
    }

    Ok(EventList {
        device: device.address(),
        records,
    })
}

pub(crate) fn clear_events(
    device: &mut CliDevice,
    log: EventLogKind,
    handles: &[u16],
    all: bool,
) -> Result<Message> {
    let selector = if all {
        ClearSelector::All
    } else {
        ClearSelector::Handles(handles.to_vec())
    };
    device.clear_event_records(log, selector)?;

    let message = if all {
        format!("Cleared every record in the {} log", log)
    } else {
        format!("Cleared {} record(s) from the {} log", handles.len(), log)
    };
    log::info!("{}", message);
    Ok(Message::new(message))
}

/// Execute an events subcommand
pub fn run_events(args: &EventsArgs, cli: &Cli) -> Result<()> {
    let (_config, mut device) = connect(cli)?;

    match &args.command {
        EventsCommands::Get { log } => {
            let list = read_events(&mut device, *log)?;
            print_output(&list, cli.format)?;
        }
        EventsCommands::Clear { log, handles, all } => {
            let message = clear_events(&mut device, *log, handles, *all)?;
            print_output(&message, cli.format)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::simulated;

    #[test]
    fn test_get_all_logs() {
        let mut device = simulated();
        let list = read_events(&mut device, None).unwrap();
        assert_eq!(list.records.len(), 2);
        assert!(list
            .records
            .iter()
            .all(|r| r.log == EventLogKind::Warning));
    }

    #[test]
    fn test_get_single_empty_log() {
        let mut device = simulated();
        let list = read_events(&mut device, Some(EventLogKind::Fatal)).unwrap();
        assert!(list.records.is_empty());
    }

    #[test]
    fn test_clear_handle_then_read() {
        let mut device = simulated();
        clear_events(&mut device, EventLogKind::Warning, &[1], false).unwrap();
        let list = read_events(&mut device, Some(EventLogKind::Warning)).unwrap();
        let handles: Vec<u16> = list.records.iter().map(|r| r.entry.handle).collect();
        assert_eq!(handles, vec![2]);
    }

    #[test]
    fn test_clear_all() {
        let mut device = simulated();
        let message = clear_events(&mut device, EventLogKind::Warning, &[], true).unwrap();
        assert!(message.message.contains("every record"));
        assert!(read_events(&mut device, None).unwrap().records.is_empty());
    }

    #[test]
    fn test_clear_unknown_handle_fails() {
        let mut device = simulated();
        assert!(clear_events(&mut device, EventLogKind::Warning, &[77], false).is_err());
    }
}
