use ndarray::{concatenate, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{MatrixError, Result};
use crate::stats::FrameStatistics;

/// Rows × columns of a pressure array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArraySize {
    pub rows: usize,
    pub cols: usize,
}

impl ArraySize {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Samples in the array.
    pub const fn total_points(&self) -> usize {
        self.rows * self.cols
    }
}

impl std::fmt::Display for ArraySize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

impl std::str::FromStr for ArraySize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (rows, cols) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("array size must look like 32x64, got {s:?}"))?;
        let rows = rows
            .trim()
            .parse()
            .map_err(|_| format!("invalid row count in {s:?}"))?;
        let cols = cols
            .trim()
            .parse()
            .map_err(|_| format!("invalid column count in {s:?}"))?;
        Ok(Self { rows, cols })
    }
}

/// Pressure samples laid out as rows × columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    data: Array2<u8>,
}

impl Matrix {
    /// Reshape `data` into `rows × cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<u8>) -> Result<Self> {
        let len = data.len();
        let data = Array2::from_shape_vec((rows, cols), data)
            .map_err(|_| MatrixError::Shape { len, rows, cols })?;
        Ok(Self { data })
    }

    /// Reshape `data` into `size`, zero-filling or cutting at the end when
    /// the length is off.
    pub(crate) fn from_sized(size: ArraySize, mut data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), size.total_points());
        data.resize(size.total_points(), 0);
        let shape = (size.rows, size.cols);
        let data = Array2::from_shape_vec(shape, data).unwrap_or_else(|_| Array2::zeros(shape));
        Self { data }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn size(&self) -> ArraySize {
        ArraySize::new(self.rows(), self.cols())
    }

    /// Row `r`. Panics when out of range.
    pub fn row(&self, r: usize) -> ArrayView1<'_, u8> {
        self.data.row(r)
    }

    /// Sample at `(r, c)`, if in range.
    pub fn get(&self, r: usize, c: usize) -> Option<u8> {
        self.data.get((r, c)).copied()
    }

    pub fn view(&self) -> ArrayView2<'_, u8> {
        self.data.view()
    }

    /// Samples in row-major order.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_slice().unwrap_or_default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_raw_vec()
    }

    /// Summary statistics over every sample.
    pub fn statistics(&self) -> FrameStatistics {
        FrameStatistics::from_array(self.data.view())
    }

    /// Place matrices side by side: row `r` of the result is row `r` of
    /// each part, left to right.
    pub fn hconcat(parts: &[Matrix]) -> Result<Matrix> {
        let Some(first) = parts.first() else {
            return Ok(Self {
                data: Array2::zeros((0, 0)),
            });
        };
        let rows = first.rows();
        if let Some(bad) = parts.iter().find(|m| m.rows() != rows) {
            return Err(MatrixError::RowMismatch {
                left: rows,
                right: bad.rows(),
            });
        }

        let views: Vec<ArrayView2<'_, u8>> = parts.iter().map(Matrix::view).collect();
        let joined = concatenate(Axis(1), &views).map_err(|_| MatrixError::RowMismatch {
            left: rows,
            right: rows,
        })?;
        Ok(Self {
            data: joined.as_standard_layout().into_owned(),
        })
    }
}

impl From<Array2<u8>> for Matrix {
    fn from(data: Array2<u8>) -> Self {
        Self {
            data: data.as_standard_layout().into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_checks_shape() {
        assert!(Matrix::from_vec(2, 3, vec![0; 6]).is_ok());
        let err = Matrix::from_vec(2, 3, vec![0; 5]).unwrap_err();
        assert_eq!(
            err,
            MatrixError::Shape {
                len: 5,
                rows: 2,
                cols: 3
            }
        );
    }

    #[test]
    fn hconcat_interleaves_rows() {
        let left = Matrix::from_vec(2, 2, vec![1, 2, 3, 4]).unwrap();
        let right = Matrix::from_vec(2, 1, vec![9, 8]).unwrap();
        let joined = Matrix::hconcat(&[left, right]).unwrap();

        assert_eq!(joined.size(), ArraySize::new(2, 3));
        assert_eq!(joined.as_bytes(), &[1, 2, 9, 3, 4, 8]);
        assert_eq!(joined.get(1, 2), Some(8));
        assert_eq!(joined.get(2, 0), None);
    }

    #[test]
    fn hconcat_rejects_row_mismatch() {
        let a = Matrix::from_vec(2, 1, vec![0, 0]).unwrap();
        let b = Matrix::from_vec(3, 1, vec![0, 0, 0]).unwrap();
        assert!(matches!(
            Matrix::hconcat(&[a, b]),
            Err(MatrixError::RowMismatch { left: 2, right: 3 })
        ));
    }

    #[test]
    fn column_major_input_is_stored_row_major() {
        let transposed = Array2::from_shape_vec((2, 3), vec![1, 2, 3, 4, 5, 6])
            .unwrap()
            .reversed_axes();
        let matrix = Matrix::from(transposed);

        assert_eq!(matrix.size(), ArraySize::new(3, 2));
        assert_eq!(matrix.as_bytes(), &[1, 4, 2, 5, 3, 6]);
        assert_eq!(matrix.row(2).to_vec(), vec![3, 6]);
        assert_eq!(matrix.into_bytes(), vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn array_size_parses_and_displays() {
        let size: ArraySize = "32x96".parse().unwrap();
        assert_eq!(size, ArraySize::new(32, 96));
        assert_eq!(size.total_points(), 3072);
        assert_eq!(size.to_string(), "32x96");
        assert!("32-96".parse::<ArraySize>().is_err());
    }
}
