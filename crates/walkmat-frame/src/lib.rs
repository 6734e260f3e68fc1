//! Header-delimited frame recovery for pressure-board byte streams.
//!
//! Boards stream frames back to back with no length field:
//! - A 4-byte header `AA 55 03 99` marks the start of every frame
//! - The body runs until the next header (1024 bytes for a 32×32 board)
//!
//! A frame is only complete once the following header has been seen, so
//! decoders buffer until then. Split headers survive across reads.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;

#[cfg(feature = "async")]
pub use async_codec::HeaderCodec;
pub use codec::{
    decode_frame, extract_frame, find_header, render_hex, trim_buffer, with_terminator, Frame,
    FrameConfig, DEFAULT_HIGH_WATER_MARK, DEFAULT_RETAIN_ON_OVERFLOW, HEADER, HEADER_SIZE,
    TERMINATOR,
};
pub use error::{FrameError, Result};
pub use reader::{FrameReader, ReaderStats};
