use bytes::{Buf, Bytes, BytesMut};

/// Frame header: `AA 55 03 99`.
pub const HEADER: [u8; 4] = [0xAA, 0x55, 0x03, 0x99];

/// Header length in bytes.
pub const HEADER_SIZE: usize = HEADER.len();

/// Display-only terminator appended when rendering a frame.
///
/// Not part of the wire format; decoders never look for it.
pub const TERMINATOR: [u8; 2] = [0xFF, 0xFF];

/// Buffered bytes beyond which an unresolved buffer is truncated.
pub const DEFAULT_HIGH_WATER_MARK: usize = 5000;

/// Trailing bytes kept when the high-water mark is exceeded.
pub const DEFAULT_RETAIN_ON_OVERFLOW: usize = 500;

/// Default number of bytes requested per read.
pub const DEFAULT_READ_CHUNK: usize = 2000;

/// Bytes kept when no header is present: a header may be split across reads.
const SPLIT_HEADER_TAIL: usize = HEADER_SIZE - 1;

/// A frame recovered from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Bytes between this frame's header and the next one.
    pub content: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Bytes this frame occupied on the wire (header + content).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.content.len()
    }
}

/// Index of the first header in `buf`, if any.
pub fn find_header(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_SIZE).position(|w| w == HEADER)
}

/// Split out the frame whose header starts at `header_index`.
///
/// Returns the content after the header and the index of the next header.
/// When no next header is buffered yet, the content runs to the end of
/// `buf` and the index is `None`: the frame is not complete and the caller
/// must keep the whole buffer.
pub fn extract_frame(buf: &[u8], header_index: usize) -> (&[u8], Option<usize>) {
    let content_start = (header_index + HEADER_SIZE).min(buf.len());
    match find_header(&buf[content_start..]) {
        Some(offset) => {
            let next = content_start + offset;
            (&buf[content_start..next], Some(next))
        }
        None => (&buf[content_start..], None),
    }
}

/// Decode the next complete frame from a buffer.
///
/// Returns `None` when the buffer holds no complete frame yet. Along the
/// way the buffer is normalised:
/// - with no header present, only the last 3 bytes are kept
/// - bytes before the first header are dropped
/// - empty frames (adjacent headers) are skipped
///
/// On success the frame's header and content are consumed; the buffer then
/// starts at the next header.
pub fn decode_frame(src: &mut BytesMut) -> Option<Frame> {
    loop {
        if src.len() < HEADER_SIZE {
            return None;
        }

        let Some(start) = find_header(src) else {
            let excess = src.len().saturating_sub(SPLIT_HEADER_TAIL);
            src.advance(excess);
            return None;
        };

        if start > 0 {
            src.advance(start);
        }

        let next = extract_frame(src, 0).1?;

        src.advance(HEADER_SIZE);
        let content = src.split_to(next - HEADER_SIZE).freeze();
        if content.is_empty() {
            continue;
        }
        return Some(Frame { content });
    }
}

/// Drop all but the trailing `retain` bytes once `buf` exceeds
/// `high_water_mark`. Returns how many bytes were discarded.
///
/// This is deliberate data loss: it bounds memory when a link streams
/// bytes that never resolve into frames.
pub fn trim_buffer(buf: &mut BytesMut, high_water_mark: usize, retain: usize) -> usize {
    if buf.len() <= high_water_mark {
        return 0;
    }
    let dropped = buf.len() - retain.min(buf.len());
    buf.advance(dropped);
    dropped
}

/// Copy of `content` with the display terminator appended.
pub fn with_terminator(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + TERMINATOR.len());
    out.extend_from_slice(content);
    out.extend_from_slice(&TERMINATOR);
    out
}

/// Space-separated upper-case hex, e.g. `AA 55 03 99`.
pub fn render_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Configuration for frame recovery.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Buffer size above which unresolved bytes are truncated. Default: 5000.
    pub high_water_mark: usize,
    /// Trailing bytes kept on truncation. Default: 500.
    pub retain_on_overflow: usize,
    /// Bytes requested per read. Default: 2000.
    pub read_chunk_size: usize,
    /// Read timeout applied to the link, if any.
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            retain_on_overflow: DEFAULT_RETAIN_ON_OVERFLOW,
            read_chunk_size: DEFAULT_READ_CHUNK,
            read_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(bodies: &[&[u8]]) -> BytesMut {
        let mut buf = BytesMut::new();
        for body in bodies {
            buf.extend_from_slice(&HEADER);
            buf.extend_from_slice(body);
        }
        buf
    }

    fn drain(buf: &mut BytesMut) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(frame) = decode_frame(buf) {
            out.push(frame.content.to_vec());
        }
        out
    }

    #[test]
    fn test_find_header() {
        assert_eq!(find_header(&[0xAA, 0x55, 0x03, 0x99]), Some(0));
        assert_eq!(find_header(&[0x00, 0x01, 0xAA, 0x55, 0x03, 0x99, 0x07]), Some(2));
        assert_eq!(find_header(&[0xAA, 0x55, 0x03]), None);
        assert_eq!(find_header(&[]), None);
    }

    #[test]
    fn test_extract_frame_with_next_header() {
        let buf = wire(&[b"abc", b"de"]);
        let (content, next) = extract_frame(&buf, 0);
        assert_eq!(content, b"abc");
        assert_eq!(next, Some(HEADER_SIZE + 3));
    }

    #[test]
    fn test_extract_frame_without_next_header() {
        let buf = wire(&[b"partial"]);
        let (content, next) = extract_frame(&buf, 0);
        assert_eq!(content, b"partial");
        assert_eq!(next, None);
    }

    #[test]
    fn test_decode_recovers_bodies_in_order() {
        let bodies: [&[u8]; 4] = [b"first", &[0u8; 1024], b"x", b"last"];
        let mut buf = wire(&bodies);
        // Terminating header so the last body is complete.
        buf.extend_from_slice(&HEADER);

        let decoded = drain(&mut buf);
        let expected: Vec<Vec<u8>> = bodies.iter().map(|b| b.to_vec()).collect();
        assert_eq!(decoded, expected);
        assert_eq!(&buf[..], &HEADER);
    }

    #[test]
    fn test_last_frame_waits_for_next_header() {
        let mut buf = wire(&[b"one", b"two"]);
        assert_eq!(drain(&mut buf), vec![b"one".to_vec()]);

        // The incomplete frame stays buffered, header included.
        assert_eq!(&buf[..HEADER_SIZE], &HEADER);
        assert_eq!(&buf[HEADER_SIZE..], b"two");
    }

    #[test]
    fn test_split_header_across_reads() {
        let mut buf = wire(&[b"body"]);
        buf.extend_from_slice(&HEADER[..2]);
        assert!(decode_frame(&mut buf).is_none());

        buf.extend_from_slice(&HEADER[2..]);
        buf.extend_from_slice(b"next");
        let frame = decode_frame(&mut buf).unwrap();
        assert_eq!(frame.content.as_ref(), b"body");
    }

    #[test]
    fn test_headerless_buffer_keeps_three_bytes() {
        let mut buf = BytesMut::from(&[0x01, 0x02, 0x03, 0x04, 0xAA, 0x55, 0x03][..]);
        assert!(decode_frame(&mut buf).is_none());
        assert_eq!(&buf[..], &[0xAA, 0x55, 0x03]);

        buf.extend_from_slice(&[0x99, 0x10, 0x11]);
        buf.extend_from_slice(&HEADER);
        let frame = decode_frame(&mut buf).unwrap();
        assert_eq!(frame.content.as_ref(), &[0x10, 0x11]);
    }

    #[test]
    fn test_noise_before_first_header_is_dropped() {
        let mut buf = BytesMut::from(&b"garbage"[..]);
        buf.extend_from_slice(&wire(&[b"payload"]));
        buf.extend_from_slice(&HEADER);

        let frame = decode_frame(&mut buf).unwrap();
        assert_eq!(frame.content.as_ref(), b"payload");
    }

    #[test]
    fn test_adjacent_headers_are_skipped() {
        let mut buf = wire(&[b"", b"", b"data"]);
        buf.extend_from_slice(&HEADER);
        assert_eq!(drain(&mut buf), vec![b"data".to_vec()]);
    }

    #[test]
    fn test_short_buffer_needs_more_data() {
        let mut buf = BytesMut::from(&[0xAA, 0x55][..]);
        assert!(decode_frame(&mut buf).is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_trim_buffer_below_mark_is_noop() {
        let mut buf = BytesMut::from(&[0u8; 100][..]);
        assert_eq!(trim_buffer(&mut buf, 100, 10), 0);
        assert_eq!(buf.len(), 100);
    }

    #[test]
    fn test_trim_buffer_keeps_tail() {
        let data: Vec<u8> = (0..=255u8).cycle().take(6000).collect();
        let mut buf = BytesMut::from(&data[..]);

        let dropped = trim_buffer(&mut buf, 5000, 500);
        assert_eq!(dropped, 5500);
        assert_eq!(&buf[..], &data[5500..]);
    }

    #[test]
    fn test_trim_buffer_retain_larger_than_buffer() {
        let mut buf = BytesMut::from(&[1u8; 20][..]);
        assert_eq!(trim_buffer(&mut buf, 10, 50), 0);
        assert_eq!(buf.len(), 20);
    }

    #[test]
    fn test_with_terminator_and_hex() {
        let rendered = with_terminator(&[0x01, 0xAB]);
        assert_eq!(rendered, vec![0x01, 0xAB, 0xFF, 0xFF]);
        assert_eq!(render_hex(&rendered), "01 AB FF FF");
        assert_eq!(render_hex(&HEADER), "AA 55 03 99");
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new(Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 4);
        assert_eq!(frame.len(), 4);
        assert!(!frame.is_empty());
    }
}
