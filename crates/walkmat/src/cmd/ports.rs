use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use walkmat_session::{find_working_port, ProbeSettings};
use walkmat_transport::{list_ports, LinkSettings, PortInfo, SerialOpener};

use crate::cmd::PortsArgs;
use crate::exit::{transport_error, CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct PortEntry<'a> {
    name: &'a str,
    description: &'a str,
    hwid: &'a str,
}

impl<'a> From<&'a PortInfo> for PortEntry<'a> {
    fn from(info: &'a PortInfo) -> Self {
        Self {
            name: &info.name,
            description: &info.description,
            hwid: &info.hwid,
        }
    }
}

#[derive(Serialize)]
struct WorkingPort<'a> {
    candidates: usize,
    working_port: Option<&'a str>,
}

pub fn run(args: PortsArgs, format: OutputFormat) -> CliResult<i32> {
    let ports = list_ports().map_err(|err| transport_error("port enumeration failed", err))?;
    tracing::debug!(count = ports.len(), "enumerated serial ports");

    if args.find {
        return report_working_port(&ports, &args, format);
    }

    match format {
        OutputFormat::Json => {
            let entries: Vec<PortEntry<'_>> = ports.iter().map(PortEntry::from).collect();
            print_json(&entries);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "DESCRIPTION", "HWID"]);
            for port in &ports {
                table.add_row(vec![
                    port.name.clone(),
                    port.description.clone(),
                    port.hwid.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for port in &ports {
                println!("{}\t{}\t{}", port.name, port.description, port.hwid);
            }
        }
    }

    Ok(SUCCESS)
}

/// Test each enumerated port in turn and print the first live one.
fn report_working_port(
    ports: &[PortInfo],
    args: &PortsArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    let mut link = LinkSettings::default();
    if let Some(baud) = args.baud {
        link.baud_rate = baud;
    }
    let found = find_working_port(
        &SerialOpener,
        ports.iter().map(|p| p.name.as_str()),
        &link,
        &ProbeSettings::default(),
    );

    match format {
        OutputFormat::Json => print_json(&WorkingPort {
            candidates: ports.len(),
            working_port: found.as_deref(),
        }),
        _ => match &found {
            Some(port) => println!("{port}"),
            None => eprintln!("no working port among {} candidates", ports.len()),
        },
    }

    Ok(if found.is_some() {
        SUCCESS
    } else {
        HEALTH_CHECK_FAILED
    })
}
