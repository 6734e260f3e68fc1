//! Pressure-array data handling.
//!
//! - [`transform`] — the JQ row reorder applied to every 32×32 board block
//! - [`prepare`] — pad/trim raw payloads to an expected length
//! - [`matrix`] — `ndarray`-backed byte matrices and horizontal concatenation
//! - [`stats`] — summary statistics over a matrix
//! - [`processor`] — prepare → transform → reshape → statistics in one step

pub mod error;
pub mod matrix;
pub mod prepare;
pub mod processor;
pub mod stats;
pub mod transform;

pub use error::{MatrixError, Result};
pub use matrix::{ArraySize, Matrix};
pub use prepare::{prepare_data, Adjustment, Prepared};
pub use processor::{sensor_block_matrix, FrameProcessor, ProcessedFrame};
pub use stats::FrameStatistics;
pub use transform::{
    jq_transform, mirror_rows, rotate_rows, transform_or_passthrough, TransformResult,
    TransformStatus, BLOCK_LEN, SENSOR_COLS, SENSOR_ROWS,
};
