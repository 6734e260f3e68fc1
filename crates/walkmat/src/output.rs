use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use walkmat_frame::{render_hex, with_terminator};
use walkmat_matrix::{FrameStatistics, TransformStatus};
use walkmat_session::{CombinedFrame, DeviceId, DeviceStatus};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CombinedFrameOutput<'a> {
    frame_number: u64,
    timestamp_ms: u128,
    array_size: String,
    source_devices: &'a [DeviceId],
    per_device_status: &'a BTreeMap<DeviceId, TransformStatus>,
    statistics: FrameStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    hex: Option<String>,
}

/// Print one combined frame. `hex` adds the frame bytes rendered with the
/// display terminator.
pub fn print_combined(frame: &CombinedFrame, format: OutputFormat, hex: bool) {
    let stats = frame.statistics();
    let hex_dump = hex.then(|| render_hex(&with_terminator(&frame.data)));

    match format {
        OutputFormat::Json => {
            let out = CombinedFrameOutput {
                frame_number: frame.frame_number,
                timestamp_ms: unix_millis(frame.timestamp),
                array_size: frame.array_size().to_string(),
                source_devices: &frame.source_devices,
                per_device_status: &frame.per_device_status,
                statistics: stats,
                hex: hex_dump,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "FRAME", "DEVICES", "SIZE", "MAX", "MEAN", "STD", "NONZERO", "STATUS",
                ])
                .add_row(vec![
                    frame.frame_number.to_string(),
                    device_list(&frame.source_devices),
                    frame.array_size().to_string(),
                    stats.max.to_string(),
                    format!("{:.2}", stats.mean),
                    format!("{:.2}", stats.std),
                    stats.nonzero_count.to_string(),
                    status_summary(frame),
                ]);
            println!("{table}");
            if let Some(hex) = hex_dump {
                println!("{hex}");
            }
        }
        OutputFormat::Pretty => {
            println!(
                "frame={} devices={} size={} max={} mean={:.2} nonzero={}/{} status={}",
                frame.frame_number,
                device_list(&frame.source_devices),
                frame.array_size(),
                stats.max,
                stats.mean,
                stats.nonzero_count,
                stats.total_points,
                status_summary(frame)
            );
            if let Some(hex) = hex_dump {
                println!("{hex}");
            }
        }
        OutputFormat::Raw => print_raw(&frame.data),
    }
}

/// Print per-device counters at the end of a capture.
pub fn print_device_status(status: &BTreeMap<DeviceId, DeviceStatus>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(status),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "DEVICE",
                    "PORT",
                    "CONNECTED",
                    "FRAMES",
                    "MERGED",
                    "SUPERSEDED",
                    "DISCARDED",
                ]);
            for (id, s) in status {
                table.add_row(vec![
                    id.to_string(),
                    s.port.clone(),
                    s.connected.to_string(),
                    s.frame_count.to_string(),
                    s.frames_merged.to_string(),
                    s.frames_superseded.to_string(),
                    s.bytes_discarded.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (id, s) in status {
                println!(
                    "device={id} port={} connected={} frames={} merged={} superseded={}",
                    s.port, s.connected, s.frame_count, s.frames_merged, s.frames_superseded
                );
            }
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn device_list(ids: &[DeviceId]) -> String {
    ids.iter()
        .map(DeviceId::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn status_summary(frame: &CombinedFrame) -> String {
    let degraded = frame.degraded_devices();
    if degraded.is_empty() {
        "ok".to_string()
    } else {
        format!("degraded({})", device_list(&degraded))
    }
}

fn unix_millis(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
