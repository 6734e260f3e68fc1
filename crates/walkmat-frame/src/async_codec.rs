use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::codec::{decode_frame, trim_buffer, Frame, FrameConfig};
use crate::error::FrameError;

/// `tokio_util` decoder for header-delimited sensor streams.
///
/// Applies the same buffering rules as [`crate::FrameReader`], so an async
/// serial stream wrapped in `FramedRead` yields identical frames.
#[derive(Debug, Clone, Default)]
pub struct HeaderCodec {
    config: FrameConfig,
    bytes_discarded: u64,
}

impl HeaderCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            bytes_discarded: 0,
        }
    }

    /// Bytes thrown away by the high-water-mark valve.
    pub fn bytes_discarded(&self) -> u64 {
        self.bytes_discarded
    }
}

impl Decoder for HeaderCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if let Some(frame) = decode_frame(src) {
            return Ok(Some(frame));
        }
        let dropped = trim_buffer(
            src,
            self.config.high_water_mark,
            self.config.retain_on_overflow,
        );
        if dropped > 0 {
            self.bytes_discarded += dropped as u64;
            warn!(dropped, "frame buffer overflow; discarded unresolved bytes");
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // A trailing frame without a closing header is never complete.
                src.clear();
                Ok(None)
            }
        }
    }
}
