//! CLI argument definitions using clap derive
//!
//! Defines all command-line arguments and subcommands.

use crate::events::EventLogKind;
use crate::telemetry::{MarginKind, RecordKind};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Sideband management tool for Leo CXL memory controllers
///
/// Talks to the controller mailbox over I2C to read link state, telemetry,
/// event logs and RAS data.
#[derive(Parser, Debug)]
#[command(name = "leoctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "LEOCTL_CONFIG")]
    pub config: Option<String>,

    /// I2C adapter number (/dev/i2c-N)
    #[arg(short, long, global = true)]
    pub bus: Option<u8>,

    /// 7-bit target address (decimal or 0x-prefixed hex)
    #[arg(short, long, global = true, value_parser = parse_u16)]
    pub address: Option<u16>,

    /// Lane bifurcation (1x16 or 2x8)
    #[arg(long, global = true)]
    pub bifurcation: Option<String>,

    /// Mailbox timeout per attempt in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Mailbox retries after the first attempt
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Run against the built-in simulated controller
    #[arg(long, global = true)]
    pub simulate: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the firmware answers and measure round-trip time
    Ping(PingArgs),

    /// Show firmware version and link summary
    Info,

    /// Link state and LTSSM history
    Link(LinkArgs),

    /// Read one telemetry record
    Telemetry(TelemetryArgs),

    /// Read or clear the device event logs
    Events(EventsArgs),

    /// Media poison list management
    Poison(PoisonArgs),

    /// Run a soft post-package repair
    Ppr(PprArgs),

    /// Patrol scrub settings
    Scrub(ScrubArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the ping command
#[derive(Parser, Debug)]
pub struct PingArgs {
    /// Number of pings to send
    #[arg(short = 'n', long, default_value = "1")]
    pub count: u32,

    /// Echo payload size in bytes
    #[arg(long, default_value = "8", value_parser = clap::value_parser!(u16).range(0..=1024))]
    pub size: u16,
}

/// Arguments for link commands
#[derive(Parser, Debug)]
pub struct LinkArgs {
    #[command(subcommand)]
    pub command: LinkCommands,
}

/// Link subcommands
#[derive(Subcommand, Debug)]
pub enum LinkCommands {
    /// Poll link state once and show it
    Status {
        /// Link index; every link when omitted
        #[arg(short, long)]
        link: Option<usize>,

        /// Also show the LTSSM history
        #[arg(long)]
        history: bool,
    },

    /// Poll link state continuously and print transitions
    Watch {
        /// Poll interval in milliseconds
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Stop after this many polls
        #[arg(long)]
        count: Option<u64>,

        /// DIMM to check against the temperature alert threshold
        #[arg(long = "dimm")]
        dimms: Vec<u8>,

        /// Overheat threshold in °C for the watched DIMMs
        #[arg(long)]
        alert_c: Option<f32>,
    },
}

/// Arguments for the telemetry command
#[derive(Parser, Debug)]
pub struct TelemetryArgs {
    /// Record kind (ddr, cxl-stats, cxl, datapath, dimm-thermal, spd, margins,
    /// throttle, err-info, persistent, scrub)
    pub kind: RecordKind,

    /// Channel, link or DIMM index the record belongs to
    #[arg(short, long, default_value = "0")]
    pub index: u8,

    /// Margin group for `margins` (rx-tx, cs-ca, qcs-qca)
    #[arg(long, default_value = "rx-tx")]
    pub margin: MarginKind,

    /// Counter id for `persistent`
    #[arg(long, default_value = "1")]
    pub id: u32,
}

/// Arguments for event log commands
#[derive(Parser, Debug)]
pub struct EventsArgs {
    #[command(subcommand)]
    pub command: EventsCommands,
}

/// Event log subcommands
#[derive(Subcommand, Debug)]
pub enum EventsCommands {
    /// Read records from one log, or from all four
    Get {
        /// Log to read (info, warn, failure, fatal)
        #[arg(short, long)]
        log: Option<EventLogKind>,
    },

    /// Clear records from a log
    Clear {
        /// Log to clear (info, warn, failure, fatal)
        #[arg(short, long)]
        log: EventLogKind,

        /// Record handle to clear; repeatable
        #[arg(long = "handle", value_parser = parse_u16, required_unless_present = "all")]
        handles: Vec<u16>,

        /// Clear every record in the log
        #[arg(long, conflicts_with = "handles")]
        all: bool,
    },
}

/// Arguments for poison commands
#[derive(Parser, Debug)]
pub struct PoisonArgs {
    #[command(subcommand)]
    pub command: PoisonCommands,
}

/// Poison subcommands
#[derive(Subcommand, Debug)]
pub enum PoisonCommands {
    /// List poisoned addresses in a DPA range
    List {
        /// Start of the range
        #[arg(long, default_value = "0", value_parser = parse_u64)]
        dpa: u64,

        /// Length of the range in bytes; the whole device when omitted
        #[arg(long, value_parser = parse_u64)]
        range: Option<u64>,
    },

    /// Mark a 64-byte aligned DPA as poisoned
    Inject {
        #[arg(value_parser = parse_u64)]
        dpa: u64,
    },

    /// Clear poison from a 64-byte aligned DPA
    Clear {
        #[arg(value_parser = parse_u64)]
        dpa: u64,
    },
}

/// Arguments for the ppr command
#[derive(Parser, Debug)]
pub struct PprArgs {
    #[arg(long)]
    pub channel: u8,

    #[arg(long, default_value = "0")]
    pub rank: u8,

    #[arg(long, default_value = "0")]
    pub bank_group: u8,

    #[arg(long, default_value = "0")]
    pub bank: u8,

    #[arg(long, value_parser = parse_u32)]
    pub row: u32,

    /// Chip id for 3DS DIMMs
    #[arg(long, default_value = "0")]
    pub cid: u8,

    /// Failing nibbles
    #[arg(long, default_value = "0", value_parser = parse_u32)]
    pub nibble_mask: u32,
}

/// Arguments for scrub commands
#[derive(Parser, Debug)]
pub struct ScrubArgs {
    #[command(subcommand)]
    pub command: ScrubCommands,
}

/// Scrub subcommands
#[derive(Subcommand, Debug)]
pub enum ScrubCommands {
    /// Show the scrub engine settings
    Show,
}

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for machine parsing
    Json,
    /// Compact single-line format
    Compact,
}

fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("'{}' is not a number: {}", s, e))
}

/// Parse a decimal or 0x-prefixed hex value
pub fn parse_u64(s: &str) -> Result<u64, String> {
    parse_number(s)
}

pub fn parse_u32(s: &str) -> Result<u32, String> {
    let value = parse_number(s)?;
    u32::try_from(value).map_err(|_| format!("{} does not fit in 32 bits", s))
}

pub fn parse_u16(s: &str) -> Result<u16, String> {
    let value = parse_number(s)?;
    u16::try_from(value).map_err(|_| format!("{} does not fit in 16 bits", s))
}

/// Generate shell completions and print to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
