use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::warn;
use walkmat_transport::SensorStream;

use crate::codec::{decode_frame, trim_buffer, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Counters kept by a [`FrameReader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Complete frames handed to the caller.
    pub frames_decoded: u64,
    /// Raw bytes received from the link.
    pub bytes_read: u64,
    /// Bytes thrown away by the high-water-mark valve.
    pub bytes_discarded: u64,
}

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads and split headers internally; callers always get
/// complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    chunk: Vec<u8>,
    config: FrameConfig,
    stats: ReaderStats,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            chunk: vec![0u8; config.read_chunk_size.max(1)],
            config,
            stats: ReaderStats::default(),
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// A read timeout on the link surfaces as `FrameError::Io` with kind
    /// `TimedOut` or `WouldBlock`; buffered bytes are kept, so calling again
    /// resumes where the stream left off. Returns
    /// `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.poll_frame()? {
                return Ok(frame);
            }
        }
    }

    /// Decode a buffered frame, or perform at most one read from the link.
    ///
    /// `Ok(None)` means a read returned bytes that did not complete a frame.
    /// Callers that must notice a shutdown request on a link that keeps
    /// streaming unframed bytes loop on this instead of [`read_frame`].
    ///
    /// [`read_frame`]: Self::read_frame
    pub fn poll_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = decode_frame(&mut self.buf) {
            self.stats.frames_decoded += 1;
            return Ok(Some(frame));
        }

        let dropped = trim_buffer(
            &mut self.buf,
            self.config.high_water_mark,
            self.config.retain_on_overflow,
        );
        if dropped > 0 {
            self.stats.bytes_discarded += dropped as u64;
            warn!(
                dropped,
                high_water_mark = self.config.high_water_mark,
                "frame buffer overflow; discarded unresolved bytes"
            );
        }

        let read = loop {
            match self.inner.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        };
        if read == 0 {
            return Err(FrameError::ConnectionClosed);
        }

        self.stats.bytes_read += read as u64;
        self.buf.extend_from_slice(&self.chunk[..read]);

        match decode_frame(&mut self.buf) {
            Some(frame) => {
                self.stats.frames_decoded += 1;
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Bytes currently buffered and not yet resolved into a frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Counters since construction.
    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<SensorStream> {
    /// Create a frame reader for a sensor link and apply the read timeout
    /// from config.
    pub fn with_config_link(mut inner: SensorStream, config: FrameConfig) -> Result<Self> {
        if let Some(timeout) = config.read_timeout {
            inner
                .set_read_timeout(timeout)
                .map_err(transport_to_frame_error)?;
        }
        Ok(Self::with_config(inner, config))
    }
}

fn transport_to_frame_error(err: walkmat_transport::TransportError) -> FrameError {
    match err {
        walkmat_transport::TransportError::Io(io)
        | walkmat_transport::TransportError::Enumerate(io) => FrameError::Io(io),
        walkmat_transport::TransportError::Open { source, .. } => FrameError::Io(source),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::*;
    use crate::codec::HEADER;

    fn wire(bodies: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for body in bodies {
            out.extend_from_slice(&HEADER);
            out.extend_from_slice(body);
        }
        out.extend_from_slice(&HEADER);
        out
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"hello"])));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.content.as_ref(), b"hello");
        assert_eq!(reader.stats().frames_decoded, 1);
    }

    #[test]
    fn read_multiple_frames() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"one", b"two", b"three"])));

        assert_eq!(reader.read_frame().unwrap().content.as_ref(), b"one");
        assert_eq!(reader.read_frame().unwrap().content.as_ref(), b"two");
        assert_eq!(reader.read_frame().unwrap().content.as_ref(), b"three");
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn read_sensor_sized_frames() {
        let block = vec![0x2Au8; 1024];
        let mut reader = FrameReader::new(Cursor::new(wire(&[&block, &block])));

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.len(), 1024);
        assert_eq!(frame.content.as_ref(), block.as_slice());
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[b"slow"]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.content.as_ref(), b"slow");
    }

    #[test]
    fn poll_returns_after_each_unframed_read() {
        let mut reader = FrameReader::new(EndlessNoise { reads: 0 });

        for _ in 0..50 {
            assert!(reader.poll_frame().unwrap().is_none());
        }
        assert_eq!(reader.get_ref().reads, 50);
        assert_eq!(reader.stats().bytes_read, 50 * 64);
        // Headerless bytes are dropped down to a possible split header.
        assert!(reader.buffered_len() < HEADER.len());
    }

    #[test]
    fn poll_yields_frame_completed_by_a_read() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"abc"])));

        let frame = reader.poll_frame().unwrap().expect("one read holds the whole frame");
        assert_eq!(frame.content.as_ref(), b"abc");
        assert!(matches!(
            reader.poll_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    /// Never ends, never contains a header.
    struct EndlessNoise {
        reads: usize,
    }

    impl Read for EndlessNoise {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            let n = buf.len().min(64);
            buf[..n].fill(0x42);
            Ok(n)
        }
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn incomplete_trailing_frame_is_not_emitted() {
        let mut bytes = HEADER.to_vec();
        bytes.extend_from_slice(b"never-terminated");

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert_eq!(reader.buffered_len(), HEADER.len() + 16);
    }

    #[test]
    fn overflow_valve_bounds_buffer() {
        let cfg = FrameConfig {
            high_water_mark: 64,
            retain_on_overflow: 8,
            read_chunk_size: 32,
            ..FrameConfig::default()
        };
        // A header followed by a body that never terminates.
        let mut bytes = HEADER.to_vec();
        bytes.extend(std::iter::repeat(0x11u8).take(200));

        let mut reader = FrameReader::with_config(Cursor::new(bytes), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));

        let stats = reader.stats();
        assert!(stats.bytes_discarded > 0);
        assert!(reader.buffered_len() <= 64 + 32);
        assert_eq!(stats.bytes_read, 204);
    }

    #[test]
    fn frames_resume_after_overflow() {
        let cfg = FrameConfig {
            high_water_mark: 64,
            retain_on_overflow: 8,
            read_chunk_size: 16,
            ..FrameConfig::default()
        };
        let mut bytes = vec![0x11u8; 300];
        bytes.extend_from_slice(&wire(&[b"after"]));

        let mut reader = FrameReader::with_config(Cursor::new(bytes), cfg);
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.content.as_ref(), b"after");
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn timeout_propagates_and_reader_resumes() {
        let reader = TimeoutBetweenHalves {
            halves: [wire(&[b"ok"])[..5].to_vec(), wire(&[b"ok"])[5..].to_vec()],
            state: 0,
        };
        let mut framed = FrameReader::new(reader);

        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::TimedOut));

        let frame = framed.read_frame().unwrap();
        assert_eq!(frame.content.as_ref(), b"ok");
    }

    struct TimeoutBetweenHalves {
        halves: [Vec<u8>; 2],
        state: u8,
    }

    impl Read for TimeoutBetweenHalves {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let state = self.state;
            self.state = self.state.saturating_add(1);
            let half = match state {
                0 => &self.halves[0],
                1 => return Err(std::io::Error::from(ErrorKind::TimedOut)),
                2 => &self.halves[1],
                _ => return Ok(0),
            };
            buf[..half.len()].copy_from_slice(half);
            Ok(half.len())
        }
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            state: 0,
            bytes: wire(&[b"ok"]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().unwrap();

        assert_eq!(frame.content.as_ref(), b"ok");
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn applies_read_timeout_for_sensor_link() {
        let stream = SensorStream::from_reader("mem0", Cursor::new(wire(&[b"link"])));
        let cfg = FrameConfig {
            read_timeout: Some(Duration::from_millis(10)),
            ..FrameConfig::default()
        };

        let mut reader = FrameReader::with_config_link(stream, cfg).unwrap();
        assert_eq!(reader.read_frame().unwrap().content.as_ref(), b"link");
        assert_eq!(reader.get_ref().port_name(), "mem0");
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = FrameReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.config().high_water_mark, 5000);
        let _inner = reader.into_inner();
    }
}
