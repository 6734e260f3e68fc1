use tracing::debug;

use crate::matrix::{ArraySize, Matrix};
use crate::prepare::{prepare_data, Adjustment};
use crate::stats::FrameStatistics;
use crate::transform::{
    transform_or_passthrough, TransformStatus, BLOCK_LEN, SENSOR_COLS, SENSOR_ROWS,
};

/// A raw payload turned into a display-ready matrix.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub matrix: Matrix,
    /// How the payload was resized to the array.
    pub adjustment: Adjustment,
    pub statistics: FrameStatistics,
    /// Whether the JQ reorder was applied.
    pub jq_applied: bool,
}

/// Turns payloads into matrices of a fixed array size.
///
/// Pipeline: resize to the array → JQ reorder (only for a single 32×32
/// board, and only when enabled) → reshape → statistics.
#[derive(Debug, Clone, Copy)]
pub struct FrameProcessor {
    size: ArraySize,
    jq_enabled: bool,
}

impl FrameProcessor {
    pub fn new(size: ArraySize, jq_enabled: bool) -> Self {
        Self { size, jq_enabled }
    }

    pub fn size(&self) -> ArraySize {
        self.size
    }

    pub fn set_size(&mut self, size: ArraySize) {
        self.size = size;
    }

    pub fn process(&self, raw: &[u8]) -> ProcessedFrame {
        let prepared = prepare_data(raw, self.size.total_points());
        if prepared.adjustment.lost_data() {
            debug!(note = %prepared.adjustment, "payload trimmed to array size");
        }

        let single_board = self.size == ArraySize::new(SENSOR_ROWS, SENSOR_COLS);
        let (data, jq_applied) = if self.jq_enabled && single_board {
            let result = transform_or_passthrough(&prepared.data);
            let applied = result.status == TransformStatus::Applied;
            (result.data, applied)
        } else {
            (prepared.data, false)
        };

        // Both branches keep the prepared length.
        let matrix = Matrix::from_sized(self.size, data);
        let statistics = matrix.statistics();

        ProcessedFrame {
            matrix,
            adjustment: prepared.adjustment,
            statistics,
            jq_applied,
        }
    }
}

impl Default for FrameProcessor {
    fn default() -> Self {
        Self::new(ArraySize::new(SENSOR_ROWS, SENSOR_COLS), true)
    }
}

/// Turn one device payload into its 32×32 merge block.
///
/// A full block gets the JQ reorder. Anything else is passed through
/// untransformed and resized to a block, and the status says why.
pub fn sensor_block_matrix(raw: &[u8]) -> (Matrix, TransformStatus) {
    let result = transform_or_passthrough(raw);
    let size = ArraySize::new(SENSOR_ROWS, SENSOR_COLS);
    match result.status {
        TransformStatus::Applied => (Matrix::from_sized(size, result.data), TransformStatus::Applied),
        TransformStatus::Degraded { reason } => {
            let prepared = prepare_data(&result.data, BLOCK_LEN);
            let status = TransformStatus::Degraded {
                reason: format!("{reason}; {}", prepared.note()),
            };
            (Matrix::from_sized(size, prepared.data), status)
        }
    }
}
