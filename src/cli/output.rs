//! Output formatting utilities
//!
//! Provides table and JSON output formatting for CLI commands.

use crate::cli::args::OutputFormat;
use crate::device::{DeviceAddress, FirmwareVersion, JournalEntry};
use crate::link::{LinkStatus, LtssmEntry};
use crate::mailbox::MailboxStats;
use crate::services::MonitorEvent;
use crate::telemetry::{PoisonList, RepairRecord, TelemetryRecord};

use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use std::time::Duration;

/// Format and print output based on the selected format
pub fn print_output<T: Serialize + TableDisplay>(data: &T, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match format {
        OutputFormat::Table => {
            writeln!(handle, "{}", data.to_table())?;
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
            writeln!(handle, "{}", json)?;
        }
        OutputFormat::Compact => {
            writeln!(handle, "{}", data.to_compact())?;
        }
    }

    Ok(())
}

/// Trait for types that can be displayed as a table
pub trait TableDisplay {
    /// Format as a table string
    fn to_table(&self) -> String;

    /// Format as a compact single line
    fn to_compact(&self) -> String {
        self.to_table().trim_end().replace('\n', " | ")
    }
}

/// Render a JSON value as `path: value` lines
fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                flatten(&join(key), inner, out);
            }
        }
        Value::Array(items) if items.iter().any(|v| v.is_object()) => {
            for (i, inner) in items.iter().enumerate() {
                flatten(&join(&i.to_string()), inner, out);
            }
        }
        Value::Array(items) => {
            let joined = items
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            out.push((prefix.to_string(), format!("[{}]", joined)));
        }
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        Value::Null => out.push((prefix.to_string(), "-".to_string())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

fn key_value_table<T: Serialize>(data: &T, indent: &str) -> String {
    let value = serde_json::to_value(data).unwrap_or(Value::Null);
    let mut rows = Vec::new();
    flatten("", &value, &mut rows);
    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(k, v)| format!("{}{:<width$}  {}\n", indent, k, v, width = width))
        .collect()
}

/// Ping results
#[derive(Debug, Clone, Serialize)]
pub struct PingReport {
    pub device: DeviceAddress,
    pub payload_bytes: usize,
    pub round_trips_us: Vec<u64>,
}

impl PingReport {
    pub fn new(device: DeviceAddress, payload_bytes: usize, rtts: &[Duration]) -> Self {
        Self {
            device,
            payload_bytes,
            round_trips_us: rtts.iter().map(|d| d.as_micros() as u64).collect(),
        }
    }

    fn average_us(&self) -> u64 {
        if self.round_trips_us.is_empty() {
            return 0;
        }
        self.round_trips_us.iter().sum::<u64>() / self.round_trips_us.len() as u64
    }
}

impl TableDisplay for PingReport {
    fn to_table(&self) -> String {
        let mut output = format!("[{}] {} byte echo\n", self.device, self.payload_bytes);
        for (seq, rtt) in self.round_trips_us.iter().enumerate() {
            output.push_str(&format!("  seq={} time={}us\n", seq, rtt));
        }
        let min = self.round_trips_us.iter().min().copied().unwrap_or(0);
        let max = self.round_trips_us.iter().max().copied().unwrap_or(0);
        output.push_str(&format!(
            "  min/avg/max = {}/{}/{} us",
            min,
            self.average_us(),
            max
        ));
        output
    }

    fn to_compact(&self) -> String {
        format!("{} ok avg={}us", self.device, self.average_us())
    }
}

/// Device overview
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub device: DeviceAddress,
    pub transport: String,
    pub firmware: FirmwareVersion,
    pub links: Vec<LinkStatus>,
    pub mailbox: MailboxStats,
}

fn link_line(link: &LinkStatus) -> String {
    let mut line = format!(
        "Link {}: {} (lanes {}-{}, max x{})",
        link.index,
        link.state,
        link.start_lane,
        u16::from(link.start_lane) + u16::from(link.max_width) - 1,
        link.max_width
    );
    if let Some(reg) = &link.register {
        if reg.dll_active {
            line.push_str(&format!(", Gen{} x{}", reg.generation, reg.width));
        } else if reg.training {
            line.push_str(", training");
        }
    }
    if link.recovery_count > 0 {
        line.push_str(&format!(", {} recoveries", link.recovery_count));
    }
    let worst_height = link.margins.iter().map(|m| m.margin.eye_height).min();
    let worst_width = link.margins.iter().map(|m| m.margin.eye_width).min();
    if let (Some(height), Some(width)) = (worst_height, worst_width) {
        line.push_str(&format!(", min eye {}h/{}w", height, width));
    }
    line
}

impl TableDisplay for DeviceInfo {
    fn to_table(&self) -> String {
        let mut output = format!("[{}] Leo via {}\n", self.device, self.transport);
        output.push_str(&format!("  Firmware: {}\n", self.firmware));
        for link in &self.links {
            output.push_str(&format!("  {}\n", link_line(link)));
        }
        output.push_str(&format!(
            "  Mailbox: {} ok, {} failed, {} retries, {} late frames dropped",
            self.mailbox.completed, self.mailbox.failed, self.mailbox.retries, self.mailbox.discarded
        ));
        if self.mailbox.malformed_notifications > 0 {
            output.push_str(&format!(
                ", {} corrupt notifications",
                self.mailbox.malformed_notifications
            ));
        }
        output
    }

    fn to_compact(&self) -> String {
        let states = self
            .links
            .iter()
            .map(|l| format!("L{}={}", l.index, l.state))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} fw {} {}", self.device, self.firmware, states)
    }
}

/// Link status with optional history
#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub device: DeviceAddress,
    pub links: Vec<LinkStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Vec<LtssmEntry>>>,
}

fn history_line(entry: &LtssmEntry) -> String {
    match entry.device_timestamp {
        Some(ts) => format!("#{} {} @{}", entry.sequence, entry.state, ts),
        None => format!("#{} {}", entry.sequence, entry.state),
    }
}

impl TableDisplay for LinkReport {
    fn to_table(&self) -> String {
        let mut output = format!("[{}]\n", self.device);
        for (i, link) in self.links.iter().enumerate() {
            output.push_str(&format!("  {}\n", link_line(link)));
            if let Some(reg) = &link.register {
                output.push_str(&format!("    Control/Status: {:#010x}\n", reg.raw));
            }
            if let Some(history) = self.history.as_ref().and_then(|h| h.get(i)) {
                for entry in history {
                    output.push_str(&format!("    {}\n", history_line(entry)));
                }
            }
        }
        output
    }

    fn to_compact(&self) -> String {
        self.links
            .iter()
            .map(|l| format!("L{}={}", l.index, l.state))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One decoded record
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub device: DeviceAddress,
    pub index: u8,
    #[serde(flatten)]
    pub record: TelemetryRecord,
}

impl TableDisplay for RecordView {
    fn to_table(&self) -> String {
        let mut output = format!(
            "[{}] {} #{}\n",
            self.device,
            self.record.kind(),
            self.index
        );
        output.push_str(&key_value_table(&self.record, "  "));
        output
    }

    fn to_compact(&self) -> String {
        let value = serde_json::to_value(&self.record).unwrap_or(Value::Null);
        let mut rows = Vec::new();
        flatten("", &value, &mut rows);
        rows.iter()
            .filter(|(k, _)| k != "kind")
            .map(|(k, v)| format!("{}={}", k.trim_start_matches("record."), v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Event records grouped for display
#[derive(Debug, Clone, Serialize)]
pub struct EventList {
    pub device: DeviceAddress,
    pub records: Vec<JournalEntry>,
}

impl TableDisplay for EventList {
    fn to_table(&self) -> String {
        let mut output = format!("[{}] {} event record(s)\n", self.device, self.records.len());
        for record in &self.records {
            let entry = &record.entry;
            output.push_str(&format!(
                "  {:<7} handle {:>5}  t={}  {}",
                record.log.to_string(),
                entry.handle,
                entry.timestamp,
                entry.category.name()
            ));
            if let Some(dpa) = entry.category.dpa() {
                output.push_str(&format!("  dpa={:#x}", dpa));
            }
            if entry.flags.maintenance_needed {
                output.push_str("  [maintenance]");
            }
            output.push('\n');
        }
        output
    }

    fn to_compact(&self) -> String {
        self.records
            .iter()
            .map(|r| format!("{}:{}", r.log, r.entry.handle))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Poison list display
#[derive(Debug, Clone, Serialize)]
pub struct PoisonReport {
    pub device: DeviceAddress,
    pub list: PoisonList,
}

impl TableDisplay for PoisonReport {
    fn to_table(&self) -> String {
        let mut output = format!(
            "[{}] {} poisoned range(s)\n",
            self.device,
            self.list.records.len()
        );
        for record in &self.list.records {
            output.push_str(&format!(
                "  {:#014x}  x{} cache lines  ({})\n",
                record.dpa, record.length, record.source
            ));
        }
        if self.list.more_records {
            output.push_str("  (more records not shown)\n");
        }
        if self.list.overflow {
            output.push_str(&format!(
                "  List overflowed at {}\n",
                self.list.overflow_timestamp
            ));
        }
        if self.list.scan_in_progress {
            output.push_str("  Media scan in progress\n");
        }
        output
    }

    fn to_compact(&self) -> String {
        self.list
            .records
            .iter()
            .map(|r| format!("{:#x}", r.dpa))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Soft PPR outcome
#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub device: DeviceAddress,
    pub succeeded: bool,
    pub record: RepairRecord,
}

impl TableDisplay for RepairOutcome {
    fn to_table(&self) -> String {
        let r = &self.record;
        format!(
            "[{}] Soft PPR {}\n  Channel {} rank {} bank group {} bank {} row {:#x} (status {})",
            self.device,
            if self.succeeded { "succeeded" } else { "failed" },
            r.channel,
            r.rank,
            r.bank_group,
            r.bank,
            r.row,
            r.status
        )
    }
}

/// One monitor event, printed as it happens
#[derive(Debug, Clone, Serialize)]
pub struct WatchLine {
    pub device: DeviceAddress,
    #[serde(flatten)]
    pub event: MonitorEvent,
}

impl TableDisplay for WatchLine {
    fn to_table(&self) -> String {
        match &self.event {
            MonitorEvent::Transition { link, entry } => {
                format!("[{}] link {} {}", self.device, link, history_line(entry))
            }
            MonitorEvent::Overheat {
                dimm,
                celsius,
                threshold,
            } => format!(
                "[{}] DIMM {} at {:.2}°C exceeds {:.1}°C",
                self.device, dimm, celsius, threshold
            ),
        }
    }
}

/// Simple message output
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message: String,
}

impl TableDisplay for Message {
    fn to_table(&self) -> String {
        self.message.clone()
    }
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
