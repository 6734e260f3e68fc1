use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, TransportError};
use crate::traits::{LinkSettings, PortOpener, SensorStream};

/// Bytes handed out per read unless a port overrides it.
const DEFAULT_CHUNK_SIZE: usize = 2000;

/// Longest an idle in-memory link sleeps before reporting a timeout.
const MAX_IDLE_WAIT: Duration = Duration::from_millis(5);

/// Opens scripted in-memory links.
///
/// Each registered port replays its byte script in chunks and then idles
/// like a quiet serial line (reads time out). Unregistered names fail to
/// open with `NotFound`. The opener tracks how many links are currently
/// open, which makes rollback behaviour observable.
#[derive(Clone, Default)]
pub struct MemoryOpener {
    ports: Arc<Mutex<HashMap<String, Script>>>,
    open_handles: Arc<AtomicUsize>,
    total_opens: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct Script {
    data: Arc<Vec<u8>>,
    chunk_size: usize,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a port that streams `data` in default-sized chunks.
    pub fn with_port(self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert_port(name, data, DEFAULT_CHUNK_SIZE);
        self
    }

    /// Register a port that streams `data` at most `chunk_size` bytes per read.
    pub fn with_chunked_port(
        self,
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
        chunk_size: usize,
    ) -> Self {
        self.insert_port(name, data, chunk_size);
        self
    }

    /// Register or replace a port script.
    pub fn insert_port(&self, name: impl Into<String>, data: impl Into<Vec<u8>>, chunk_size: usize) {
        let script = Script {
            data: Arc::new(data.into()),
            chunk_size: chunk_size.max(1),
        };
        if let Ok(mut ports) = self.ports.lock() {
            ports.insert(name.into(), script);
        }
    }

    /// Links opened by this opener and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Successful opens over the opener's lifetime.
    pub fn total_opens(&self) -> usize {
        self.total_opens.load(Ordering::SeqCst)
    }
}

impl PortOpener for MemoryOpener {
    fn open(&self, port_name: &str, settings: &LinkSettings) -> Result<SensorStream> {
        let script = self
            .ports
            .lock()
            .ok()
            .and_then(|ports| ports.get(port_name).cloned())
            .ok_or_else(|| TransportError::Open {
                port: port_name.to_string(),
                source: std::io::Error::new(ErrorKind::NotFound, "no such in-memory port"),
            })?;

        self.open_handles.fetch_add(1, Ordering::SeqCst);
        self.total_opens.fetch_add(1, Ordering::SeqCst);

        let link = MemoryLink {
            script,
            pos: 0,
            idle_wait: settings.read_timeout.min(MAX_IDLE_WAIT),
            open_handles: Arc::clone(&self.open_handles),
        };
        Ok(SensorStream::from_reader(port_name, link))
    }

    fn transport_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryLink {
    script: Script,
    pos: usize,
    idle_wait: Duration,
    open_handles: Arc<AtomicUsize>,
}

impl Read for MemoryLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.script.data.len() - self.pos;
        if remaining == 0 {
            std::thread::sleep(self.idle_wait);
            return Err(std::io::Error::from(ErrorKind::TimedOut));
        }
        let n = remaining.min(buf.len()).min(self.script.chunk_size);
        buf[..n].copy_from_slice(&self.script.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}
