//! The JQ row reorder.
//!
//! Boards scan their rows in a different order than they are laid out on
//! the mat. Every 32×32 block is put back in physical order by:
//!
//! 1. mirroring the first 15 rows: pairs (0,14) (1,13) … (6,8); row 7 is
//!    the midpoint and stays in place
//! 2. rotating the row list so rows 15..32 come first, then rows 0..15
//!
//! The result is bit-exact for a given input; existing calibration data
//! depends on it.

use serde::Serialize;

use crate::error::{MatrixError, Result};

/// Rows per board block.
pub const SENSOR_ROWS: usize = 32;

/// Columns per board block.
pub const SENSOR_COLS: usize = 32;

/// Bytes per board block.
pub const BLOCK_LEN: usize = SENSOR_ROWS * SENSOR_COLS;

/// Rows covered by the mirror step.
const MIRROR_SPAN: usize = 15;

/// Row pairs swapped by the mirror step.
const MIRROR_PAIRS: usize = 7;

/// Swap rows `(i, 14 - i)` for `i` in `0..7` of a row-major matrix with
/// `cols` columns. Row 7 is untouched.
pub fn mirror_rows(data: &mut [u8], cols: usize) {
    if cols == 0 || data.len() < MIRROR_SPAN * cols {
        return;
    }
    for i in 0..MIRROR_PAIRS {
        let j = MIRROR_SPAN - 1 - i;
        let (head, tail) = data.split_at_mut(j * cols);
        head[i * cols..(i + 1) * cols].swap_with_slice(&mut tail[..cols]);
    }
}

/// Rotate the row list left by `k`: rows `k..` first, then rows `..k`.
pub fn rotate_rows(data: &mut [u8], cols: usize, k: usize) {
    if data.is_empty() || cols == 0 {
        return;
    }
    let rows = data.len() / cols;
    data.rotate_left((k % rows.max(1)) * cols);
}

/// Apply the JQ reorder to one 1024-byte block.
pub fn jq_transform(block: &[u8]) -> Result<[u8; BLOCK_LEN]> {
    let input: &[u8; BLOCK_LEN] = block.try_into().map_err(|_| MatrixError::BlockLength {
        len: block.len(),
        expected: BLOCK_LEN,
    })?;

    let mut out = *input;
    mirror_rows(&mut out, SENSOR_COLS);
    rotate_rows(&mut out, SENSOR_COLS, MIRROR_SPAN);
    Ok(out)
}

/// Outcome of transforming one device block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransformStatus {
    /// The JQ reorder was applied.
    Applied,
    /// The block was passed through untransformed.
    Degraded { reason: String },
}

impl TransformStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, TransformStatus::Degraded { .. })
    }
}

impl std::fmt::Display for TransformStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformStatus::Applied => write!(f, "applied"),
            TransformStatus::Degraded { reason } => write!(f, "degraded: {reason}"),
        }
    }
}

/// Transformed block, or the original bytes plus a status explaining why
/// the transform was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    pub data: Vec<u8>,
    pub status: TransformStatus,
}

impl TransformResult {
    pub fn is_degraded(&self) -> bool {
        self.status.is_degraded()
    }
}

/// Transform `block`, falling back to a copy of the input on error.
pub fn transform_or_passthrough(block: &[u8]) -> TransformResult {
    match jq_transform(block) {
        Ok(out) => TransformResult {
            data: out.to_vec(),
            status: TransformStatus::Applied,
        },
        Err(err) => TransformResult {
            data: block.to_vec(),
            status: TransformStatus::Degraded {
                reason: err.to_string(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Block whose every sample in row `r` equals `r`.
    fn row_indexed_block() -> Vec<u8> {
        (0..SENSOR_ROWS)
            .flat_map(|r| std::iter::repeat(r as u8).take(SENSOR_COLS))
            .collect()
    }

    fn row_values(data: &[u8]) -> Vec<u8> {
        data.chunks(SENSOR_COLS).map(|row| row[0]).collect()
    }

    fn pseudo_random_block(seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..BLOCK_LEN)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    #[test]
    fn golden_row_order() {
        let out = jq_transform(&row_indexed_block()).unwrap();
        let rows = row_values(&out);

        let expected: Vec<u8> = (15..32u8).chain((0..15u8).rev()).collect();
        assert_eq!(rows, expected);
        assert_eq!(rows[17], 14);
        assert_eq!(rows[31], 0);
    }

    #[test]
    fn mirror_leaves_midpoint_row_in_place() {
        let mut data = row_indexed_block();
        mirror_rows(&mut data, SENSOR_COLS);
        let rows = row_values(&data);

        assert_eq!(&rows[..15], &[14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);
        assert_eq!(rows[7], 7);
        assert_eq!(&rows[15..], &(15..32u8).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn mirror_twice_is_identity() {
        let original = pseudo_random_block(7);
        let mut data = original.clone();
        mirror_rows(&mut data, SENSOR_COLS);
        assert_ne!(data, original);
        mirror_rows(&mut data, SENSOR_COLS);
        assert_eq!(data, original);
    }

    #[test]
    fn rotate_by_15_then_17_is_identity() {
        let original = pseudo_random_block(99);
        let mut data = original.clone();
        rotate_rows(&mut data, SENSOR_COLS, 15);
        assert_ne!(data, original);
        rotate_rows(&mut data, SENSOR_COLS, 17);
        assert_eq!(data, original);
    }

    #[test]
    fn transform_preserves_row_contents() {
        let input = pseudo_random_block(3);
        let out = jq_transform(&input).unwrap();

        // Output row 0 is input row 15; output row 17 is input row 14.
        assert_eq!(&out[..SENSOR_COLS], &input[15 * SENSOR_COLS..16 * SENSOR_COLS]);
        assert_eq!(
            &out[17 * SENSOR_COLS..18 * SENSOR_COLS],
            &input[14 * SENSOR_COLS..15 * SENSOR_COLS]
        );
        // Row 7 lands at 17 + (14 - 7) = 24 unchanged.
        assert_eq!(
            &out[24 * SENSOR_COLS..25 * SENSOR_COLS],
            &input[7 * SENSOR_COLS..8 * SENSOR_COLS]
        );
    }

    #[test]
    fn transform_is_deterministic() {
        let input = pseudo_random_block(42);
        assert_eq!(jq_transform(&input).unwrap(), jq_transform(&input).unwrap());
    }

    #[test]
    fn double_transform_is_not_identity() {
        let input = pseudo_random_block(5);
        let twice = jq_transform(&jq_transform(&input).unwrap()).unwrap();
        assert_ne!(twice.to_vec(), input);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = jq_transform(&[0u8; 1000]).unwrap_err();
        assert_eq!(
            err,
            MatrixError::BlockLength {
                len: 1000,
                expected: BLOCK_LEN
            }
        );
    }

    #[test]
    fn passthrough_on_wrong_length() {
        let input = vec![9u8; 512];
        let result = transform_or_passthrough(&input);

        assert!(result.is_degraded());
        assert_eq!(result.data, input);
        assert!(result.status.to_string().contains("512"));
    }

    #[test]
    fn passthrough_applies_on_full_block() {
        let input = row_indexed_block();
        let result = transform_or_passthrough(&input);

        assert_eq!(result.status, TransformStatus::Applied);
        assert_eq!(result.data, jq_transform(&input).unwrap().to_vec());
    }

    #[test]
    fn status_serializes_with_tag() {
        let json = serde_json::to_string(&TransformStatus::Degraded {
            reason: "short".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"status":"degraded","reason":"short"}"#);
    }
}
