use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use walkmat_session::{DeviceMode, OverflowPolicy, SegmentOrder};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod capture;
pub mod config;
pub mod ports;
pub mod probe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports on this host, or find the one with a live board.
    Ports(PortsArgs),
    /// Check that a board is streaming sensor blocks on a port.
    Probe(ProbeArgs),
    /// Connect to one to three boards and print combined frames.
    Capture(CaptureArgs),
    /// Write a session config file.
    Config(ConfigArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Ports(args) => ports::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Capture(args) => capture::run(args, format),
        Command::Config(args) => config::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Session settings shared by `capture` and `config`.
#[derive(Args, Debug, Default)]
pub struct SessionArgs {
    /// Serial ports (or capture files with --replay), in device id order.
    #[arg(num_args = 1..=3, value_name = "PORT")]
    pub ports: Vec<String>,
    /// Device mode (single, dual, triple). Default: from the port count.
    #[arg(long)]
    pub mode: Option<DeviceMode>,
    /// Walkway segment placement, e.g. 2,0,1 (triple mode only).
    #[arg(long, value_name = "A,B,C")]
    pub segment_order: Option<SegmentOrder>,
    /// Serial baud rate.
    #[arg(long)]
    pub baud: Option<u32>,
    /// Combined frames buffered for the consumer.
    #[arg(long)]
    pub queue_capacity: Option<usize>,
    /// What to do when the consumer falls behind (block, drop-oldest).
    #[arg(long)]
    pub overflow: Option<OverflowPolicy>,
    /// Skip the liveness test before opening each port.
    #[arg(long)]
    pub no_probe: bool,
    /// One port carries all three walkway segments back to back (32x96).
    #[arg(long)]
    pub walkway: bool,
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {
    /// Test each port and print the first one streaming data (exit 30 if none).
    #[arg(long)]
    pub find: bool,
    /// Serial baud rate used with --find.
    #[arg(long, requires = "find")]
    pub baud: Option<u32>,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Serial port (or capture file with --replay).
    pub port: String,
    /// How long to look for a sensor block (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub window: String,
    /// Serial baud rate.
    #[arg(long)]
    pub baud: Option<u32>,
    /// Treat the port name as a capture file.
    #[arg(long)]
    pub replay: bool,
}

#[derive(Args, Debug)]
pub struct CaptureArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    /// Load the session from a config file instead of PORT arguments.
    #[arg(long, value_name = "PATH", conflicts_with = "ports")]
    pub config: Option<PathBuf>,
    /// Treat port names as capture files.
    #[arg(long)]
    pub replay: bool,
    /// Exit after N combined frames.
    #[arg(long)]
    pub count: Option<u64>,
    /// Exit after this long (e.g. 30s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
    /// Include each frame's bytes as hex.
    #[arg(long)]
    pub hex: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Where to write the config file.
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: PathBuf,
    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a `--window` or `--duration` value: a number followed by `ms`,
/// `s` or `m`. A bare number is seconds and fractions are allowed (`1.5s`).
pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let text = input.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);

    let nanos_per_unit: f64 = match unit.trim() {
        "ms" => 1e6,
        "" | "s" => 1e9,
        "m" => 60e9,
        other => {
            return Err(CliError::new(
                USAGE,
                format!("unknown unit '{other}' in duration '{text}' (use ms, s or m)"),
            ))
        }
    };
    let value: f64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("'{text}' is not a duration")))?;

    let nanos = (value * nanos_per_unit).round();
    if nanos < 1.0 {
        return Err(CliError::new(USAGE, format!("duration '{text}' must be positive")));
    }
    if nanos >= u64::MAX as f64 {
        return Err(CliError::new(USAGE, format!("duration '{text}' is too long")));
    }
    Ok(Duration::from_nanos(nanos as u64))
}
