use serde::Serialize;
use walkmat_session::{check_sensor_block, probe_port, ProbeReport, ProbeSettings, SensorBlockCheck};
use walkmat_transport::{LinkSettings, PortOpener, ReplayOpener, SerialOpener};

use crate::cmd::{parse_duration, ProbeArgs};
use crate::exit::{session_error, CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct ProbeOutput<'a> {
    port: &'a str,
    alive: bool,
    bytes_received: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    sensor_block: Option<&'a SensorBlockCheck>,
    ok: bool,
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let window = parse_duration(&args.window)?;
    let opener: Box<dyn PortOpener> = if args.replay {
        Box::new(ReplayOpener::default())
    } else {
        Box::new(SerialOpener)
    };
    let mut link = LinkSettings::default();
    if let Some(baud) = args.baud {
        link.baud_rate = baud;
    }

    let report = probe_port(opener.as_ref(), &args.port, &link, &ProbeSettings::default())
        .map_err(|err| session_error("probe failed", err))?;

    // A silent port is not worth the block check window.
    let check = if report.alive {
        Some(
            check_sensor_block(opener.as_ref(), &args.port, &link, window)
                .map_err(|err| session_error("sensor block check failed", err))?,
        )
    } else {
        None
    };

    let ok = report.alive && check.as_ref().is_some_and(|c| c.valid);
    print_probe(&report, check.as_ref(), ok, format);

    Ok(if ok { SUCCESS } else { HEALTH_CHECK_FAILED })
}

fn print_probe(
    report: &ProbeReport,
    check: Option<&SensorBlockCheck>,
    ok: bool,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(&ProbeOutput {
            port: &report.port,
            alive: report.alive,
            bytes_received: report.bytes_received,
            sensor_block: check,
            ok,
        }),
        _ => {
            println!(
                "{}: {} ({} bytes in liveness sample)",
                report.port,
                if report.alive { "alive" } else { "silent" },
                report.bytes_received
            );
            if let Some(check) = check {
                println!(
                    "sensor block: {} (header={}, body={} bytes, nonzero={}, {:?})",
                    if check.valid { "valid" } else { "not found" },
                    check.header_seen,
                    check.body_len,
                    check.nonzero,
                    check.elapsed
                );
            }
        }
    }
}
