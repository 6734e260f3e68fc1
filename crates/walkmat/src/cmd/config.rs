use serde::Serialize;
use walkmat_session::{DeviceMode, SessionConfig};

use crate::cmd::{ConfigArgs, SessionArgs};
use crate::exit::{session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct ConfigWritten<'a> {
    path: String,
    mode: DeviceMode,
    ports: Vec<&'a str>,
    segment_order: String,
    walkway: bool,
}

pub fn run(args: ConfigArgs, format: OutputFormat) -> CliResult<i32> {
    let config = build_session_config(&args.session)?;
    config
        .save(&args.output)
        .map_err(|err| session_error("config write failed", err))?;

    let written = ConfigWritten {
        path: args.output.display().to_string(),
        mode: config.mode,
        ports: config.ports.iter().map(|p| p.port_name.as_str()).collect(),
        segment_order: config.segment_order.to_string(),
        walkway: config.walkway,
    };
    match format {
        OutputFormat::Json => print_json(&written),
        _ => println!(
            "wrote {} ({} mode, ports: {})",
            written.path,
            written.mode,
            written.ports.join(", ")
        ),
    }
    Ok(SUCCESS)
}

/// Turn command-line session settings into a validated config. Ports get
/// device ids 0, 1, 2 in the order given.
pub(crate) fn build_session_config(args: &SessionArgs) -> CliResult<SessionConfig> {
    if args.ports.is_empty() {
        return Err(CliError::new(USAGE, "at least one port is required"));
    }
    let mode = match args.mode {
        Some(mode) => mode,
        None => DeviceMode::from_device_count(args.ports.len()).ok_or_else(|| {
            CliError::new(
                USAGE,
                format!("expected 1 to 3 ports, got {}", args.ports.len()),
            )
        })?,
    };

    let mut config = SessionConfig::for_ports(mode, args.ports.iter().cloned());
    apply_overrides(&mut config, args);
    config
        .validate()
        .map_err(|err| session_error("invalid session", err))?;
    Ok(config)
}

/// Apply the optional flags on top of a loaded or freshly built config.
pub(crate) fn apply_overrides(config: &mut SessionConfig, args: &SessionArgs) {
    if let Some(order) = args.segment_order {
        config.segment_order = order;
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(capacity) = args.queue_capacity {
        config.queue_capacity = capacity;
    }
    if let Some(policy) = args.overflow {
        config.overflow_policy = policy;
    }
    if args.no_probe {
        config.probe_before_connect = false;
    }
    if args.walkway {
        config.walkway = true;
        config.array_size = config.expected_array_size();
    }
}
