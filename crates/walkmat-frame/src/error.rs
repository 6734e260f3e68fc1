/// Errors that can occur while recovering frames from a link.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred while reading from the link.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link reported end of stream.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
