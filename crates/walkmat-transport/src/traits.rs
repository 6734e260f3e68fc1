use std::io::Read;
use std::time::Duration;

use crate::error::Result;

/// Baud rate the pressure boards stream at.
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

/// Default per-read timeout for serial links.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Line settings applied when a link is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Serial baud rate. Ignored by non-serial links.
    pub baud_rate: u32,
    /// Upper bound on a single blocking read.
    pub read_timeout: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Opens sensor links by port name.
///
/// The session layer only ever talks to this trait, so the same
/// connect/rollback logic drives real serial ports, replayed captures and
/// scripted in-memory links.
pub trait PortOpener: Send + Sync {
    /// Open `port_name` with the given line settings.
    fn open(&self, port_name: &str, settings: &LinkSettings) -> Result<SensorStream>;

    /// Opener name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

/// A connected sensor link. Implements `Read`.
///
/// Reads block for at most the configured read timeout; an idle link
/// reports `ErrorKind::TimedOut` (or `WouldBlock`) rather than `Ok(0)`.
/// `Ok(0)` means the link is gone.
pub struct SensorStream {
    port_name: String,
    inner: SensorStreamInner,
}

enum SensorStreamInner {
    Serial(Box<dyn serialport::SerialPort>),
    Reader(Box<dyn Read + Send>),
}

impl Read for SensorStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SensorStreamInner::Serial(port) => port.read(buf),
            SensorStreamInner::Reader(reader) => reader.read(buf),
        }
    }
}

impl SensorStream {
    /// Wrap an opened serial port.
    pub(crate) fn from_serial(port_name: &str, port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            port_name: port_name.to_string(),
            inner: SensorStreamInner::Serial(port),
        }
    }

    /// Wrap any byte source as a sensor link.
    pub fn from_reader(port_name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            port_name: port_name.into(),
            inner: SensorStreamInner::Reader(Box::new(reader)),
        }
    }

    /// Name of the port this stream was opened on.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Link kind for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            SensorStreamInner::Serial(_) => "serial",
            SensorStreamInner::Reader(_) => "reader",
        }
    }

    /// Update the per-read timeout. No-op for non-serial links.
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        match &mut self.inner {
            SensorStreamInner::Serial(port) => port
                .set_timeout(timeout)
                .map_err(|err| std::io::Error::from(err).into()),
            SensorStreamInner::Reader(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for SensorStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorStream")
            .field("port", &self.port_name)
            .field("type", &self.kind())
            .finish()
    }
}
