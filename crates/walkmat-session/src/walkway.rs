//! Single-port walkway grouping.
//!
//! Some walkways multiplex all three segments over one port: the board sends
//! three consecutive 1024-byte blocks per scan. [`WalkwayAccumulator`] sits
//! between the frame reader and the store and publishes one 3072-byte
//! payload per scan, which the merger splits back into segments.

use bytes::{Bytes, BytesMut};
use walkmat_matrix::BLOCK_LEN;

/// Blocks per walkway scan.
pub const WALKWAY_SEGMENTS: usize = 3;

/// Groups consecutive full sensor blocks into one payload.
#[derive(Debug)]
pub struct WalkwayAccumulator {
    segments: usize,
    collected: usize,
    buf: BytesMut,
}

impl Default for WalkwayAccumulator {
    fn default() -> Self {
        Self::new(WALKWAY_SEGMENTS)
    }
}

impl WalkwayAccumulator {
    pub fn new(segments: usize) -> Self {
        let segments = segments.max(1);
        Self {
            segments,
            collected: 0,
            buf: BytesMut::with_capacity(segments * BLOCK_LEN),
        }
    }

    /// Feed one decoded frame. Returns a payload ready to publish.
    ///
    /// Full blocks are held until a scan is complete. Any other length is
    /// returned unchanged and leaves a partial scan in place.
    pub fn push(&mut self, frame: Bytes) -> Option<Bytes> {
        if frame.len() != BLOCK_LEN {
            return Some(frame);
        }
        self.buf.extend_from_slice(&frame);
        self.collected += 1;
        if self.collected < self.segments {
            return None;
        }
        self.collected = 0;
        Some(self.buf.split().freeze())
    }

    /// Blocks held for the current scan.
    pub fn pending(&self) -> usize {
        self.collected
    }

    /// Drop a partial scan.
    pub fn reset(&mut self) {
        self.collected = 0;
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(fill: u8) -> Bytes {
        Bytes::from(vec![fill; BLOCK_LEN])
    }

    #[test]
    fn three_blocks_make_one_scan() {
        let mut acc = WalkwayAccumulator::default();

        assert!(acc.push(block(1)).is_none());
        assert!(acc.push(block(2)).is_none());
        assert_eq!(acc.pending(), 2);

        let scan = acc.push(block(3)).expect("third block completes the scan");
        assert_eq!(scan.len(), 3 * BLOCK_LEN);
        assert_eq!(
            [scan[0], scan[BLOCK_LEN], scan[2 * BLOCK_LEN]],
            [1, 2, 3]
        );
        assert_eq!(acc.pending(), 0);

        assert!(acc.push(block(4)).is_none());
    }

    #[test]
    fn odd_sized_frames_pass_through_without_breaking_the_scan() {
        let mut acc = WalkwayAccumulator::default();
        acc.push(block(1));

        let short = Bytes::from_static(&[9, 9, 9]);
        assert_eq!(acc.push(short.clone()), Some(short));
        assert_eq!(acc.pending(), 1);

        acc.push(block(2));
        let scan = acc.push(block(3)).unwrap();
        assert_eq!(scan[0], 1);
    }

    #[test]
    fn reset_discards_partial_scan() {
        let mut acc = WalkwayAccumulator::default();
        acc.push(block(1));
        acc.reset();

        acc.push(block(5));
        acc.push(block(6));
        let scan = acc.push(block(7)).unwrap();
        assert_eq!(scan[0], 5);
    }
}
