use std::fs::File;
use std::io::Read;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{LinkSettings, PortOpener, SensorStream};

/// One header plus a 1024-byte block: a single board frame on the wire.
const DEFAULT_REPLAY_CHUNK: usize = 1028;

/// Opens capture files as if they were serial ports.
///
/// The port name is a filesystem path. Bytes are handed out in chunks with
/// a fixed pause before each read, so a recorded stream arrives at roughly
/// board speed instead of all at once. End of file closes the link.
#[derive(Debug, Clone, Copy)]
pub struct ReplayOpener {
    chunk_size: usize,
    pace: Duration,
}

impl Default for ReplayOpener {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_REPLAY_CHUNK,
            pace: Duration::from_millis(5),
        }
    }
}

impl ReplayOpener {
    pub fn new(chunk_size: usize, pace: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            pace,
        }
    }
}

impl PortOpener for ReplayOpener {
    fn open(&self, port_name: &str, _settings: &LinkSettings) -> Result<SensorStream> {
        let file = File::open(port_name).map_err(|source| TransportError::Open {
            port: port_name.to_string(),
            source,
        })?;
        debug!(path = port_name, chunk = self.chunk_size, "opened capture for replay");
        Ok(SensorStream::from_reader(
            port_name,
            ReplayLink {
                file,
                chunk_size: self.chunk_size,
                pace: self.pace,
            },
        ))
    }

    fn transport_name(&self) -> &'static str {
        "replay"
    }
}

struct ReplayLink {
    file: File,
    chunk_size: usize,
    pace: Duration,
}

impl Read for ReplayLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.pace.is_zero() {
            std::thread::sleep(self.pace);
        }
        let n = buf.len().min(self.chunk_size);
        self.file.read(&mut buf[..n])
    }
}
