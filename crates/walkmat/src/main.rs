mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "walkmat", version, about = "Pressure walkway capture CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_capture_subcommand() {
        let cli = Cli::try_parse_from([
            "walkmat",
            "capture",
            "COM3",
            "COM4",
            "COM5",
            "--segment-order",
            "2,0,1",
            "--count",
            "10",
        ])
        .expect("capture args should parse");

        match cli.command {
            Command::Capture(args) => {
                assert_eq!(args.session.ports, vec!["COM3", "COM4", "COM5"]);
                assert_eq!(args.count, Some(10));
                assert_eq!(
                    args.session.segment_order.map(|o| o.as_array()),
                    Some([2, 0, 1])
                );
            }
            other => panic!("expected capture, got {other:?}"),
        }
    }

    #[test]
    fn rejects_ports_together_with_config() {
        let err = Cli::try_parse_from([
            "walkmat",
            "capture",
            "COM3",
            "--config",
            "/tmp/walkmat.json",
        ])
        .expect_err("ports and --config should conflict");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_invalid_segment_order() {
        let err = Cli::try_parse_from([
            "walkmat",
            "capture",
            "a",
            "b",
            "c",
            "--segment-order",
            "0,0,1",
        ])
        .expect_err("duplicate segment should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_probe_subcommand() {
        let cli = Cli::try_parse_from(["walkmat", "probe", "/dev/ttyUSB0", "--window", "500ms"])
            .expect("probe args should parse");
        assert!(matches!(cli.command, Command::Probe(_)));
    }
}
