/// Errors raised by matrix operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatrixError {
    /// The JQ transform only accepts a full 32×32 block.
    #[error("block length must be {expected} bytes, got {len}")]
    BlockLength { len: usize, expected: usize },

    /// Data length does not match the requested shape.
    #[error("{len} bytes cannot form a {rows}x{cols} matrix")]
    Shape { len: usize, rows: usize, cols: usize },

    /// Matrices joined side by side must share a row count.
    #[error("cannot concatenate matrices with {left} and {right} rows")]
    RowMismatch { left: usize, right: usize },
}

pub type Result<T> = std::result::Result<T, MatrixError>;
