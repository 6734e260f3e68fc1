//! Port discovery helpers: enumeration lives in `walkmat-transport`; this
//! module answers "is a board actually streaming on this port?".

use std::io::{ErrorKind, Read};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};
use walkmat_frame::{find_header, HEADER_SIZE};
use walkmat_matrix::BLOCK_LEN;
use walkmat_transport::{LinkSettings, PortOpener, SensorStream};

use crate::error::Result;

/// Body bytes inspected when a full block has not arrived yet.
const PARTIAL_SAMPLE_LEN: usize = 100;

/// Non-zero samples a partial body needs to count as live sensor data.
const PARTIAL_MIN_NONZERO: usize = 10;

/// Liveness test parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Wait after opening before sampling.
    pub settle: Duration,
    /// Bytes requested.
    pub sample_len: usize,
    /// The probe succeeds when strictly more bytes than this arrive.
    pub min_bytes: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(100),
            sample_len: 50,
            min_bytes: 10,
        }
    }
}

/// Result of a liveness test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub port: String,
    pub bytes_received: usize,
    pub alive: bool,
}

/// Open `port`, wait for it to settle, read a short sample and close it.
///
/// Errors only when the port cannot be opened; a silent port yields a
/// report with `alive == false`.
pub fn probe_port(
    opener: &dyn PortOpener,
    port: &str,
    link: &LinkSettings,
    settings: &ProbeSettings,
) -> Result<ProbeReport> {
    let mut stream = opener.open(port, link)?;
    thread::sleep(settings.settle);

    let mut sample = vec![0u8; settings.sample_len];
    let deadline = Instant::now() + link.read_timeout;
    let mut filled = 0;
    while filled < sample.len() && Instant::now() < deadline {
        match read_some(&mut stream, &mut sample[filled..]) {
            Some(0) | None => break,
            Some(n) => filled += n,
        }
    }

    let report = ProbeReport {
        port: port.to_string(),
        bytes_received: filled,
        alive: filled > settings.min_bytes,
    };
    debug!(port, bytes = filled, alive = report.alive, "probe finished");
    Ok(report)
}

/// Probe `ports` in order and return the first one with a live board.
///
/// Ports that fail to open are skipped.
pub fn find_working_port<I, S>(
    opener: &dyn PortOpener,
    ports: I,
    link: &LinkSettings,
    settings: &ProbeSettings,
) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for port in ports {
        let port = port.as_ref();
        match probe_port(opener, port, link, settings) {
            Ok(report) if report.alive => {
                info!(port, bytes = report.bytes_received, "found working port");
                return Some(report.port);
            }
            Ok(_) => {}
            Err(err) => debug!(port, error = %err, "skipping port"),
        }
    }
    None
}

/// What [`check_sensor_block`] saw on a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorBlockCheck {
    pub port: String,
    pub header_seen: bool,
    /// Body bytes after the first header when the check finished.
    pub body_len: usize,
    /// Non-zero samples among the inspected body bytes.
    pub nonzero: usize,
    /// A full block arrived, or enough live data to expect one.
    pub valid: bool,
    pub elapsed: Duration,
}

/// Read from `port` for up to `window`, looking for a header followed by
/// a full 1024-byte block, or at least 100 body bytes of which more than
/// 10 are non-zero.
pub fn check_sensor_block(
    opener: &dyn PortOpener,
    port: &str,
    link: &LinkSettings,
    window: Duration,
) -> Result<SensorBlockCheck> {
    let mut stream = opener.open(port, link)?;
    let started = Instant::now();
    let mut buf = Vec::with_capacity(2 * BLOCK_LEN);
    let mut chunk = vec![0u8; 2 * BLOCK_LEN];
    let mut check = SensorBlockCheck {
        port: port.to_string(),
        header_seen: false,
        body_len: 0,
        nonzero: 0,
        valid: false,
        elapsed: Duration::ZERO,
    };

    while started.elapsed() < window {
        match read_some(&mut stream, &mut chunk) {
            Some(0) => break,
            Some(n) => buf.extend_from_slice(&chunk[..n]),
            None => continue,
        }

        let Some(idx) = find_header(&buf) else {
            continue;
        };
        let body = &buf[idx + HEADER_SIZE..];
        check.header_seen = true;
        check.body_len = body.len();

        if body.len() >= BLOCK_LEN {
            check.nonzero = count_nonzero(&body[..BLOCK_LEN]);
            check.valid = true;
            break;
        }
        if body.len() >= PARTIAL_SAMPLE_LEN {
            check.nonzero = count_nonzero(&body[..PARTIAL_SAMPLE_LEN]);
            if check.nonzero > PARTIAL_MIN_NONZERO {
                check.valid = true;
                break;
            }
        }
    }

    check.elapsed = started.elapsed();
    debug!(port, valid = check.valid, body_len = check.body_len, "sensor block check finished");
    Ok(check)
}

/// One read; `None` on timeout or a transient error.
fn read_some(stream: &mut SensorStream, buf: &mut [u8]) -> Option<usize> {
    match stream.read(buf) {
        Ok(n) => Some(n),
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ) =>
        {
            None
        }
        Err(err) => {
            debug!(port = stream.port_name(), error = %err, "read failed");
            Some(0)
        }
    }
}

fn count_nonzero(data: &[u8]) -> usize {
    data.iter().filter(|&&b| b != 0).count()
}
