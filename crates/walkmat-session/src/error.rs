use crate::config::DeviceId;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] walkmat_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] walkmat_frame::FrameError),

    /// Matrix assembly error.
    #[error("matrix error: {0}")]
    Matrix(#[from] walkmat_matrix::MatrixError),

    /// Session configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A port failed its liveness test or could not be opened. Every port
    /// opened in the same attempt has been closed again.
    #[error("device {device_id} on {port} failed to connect: {reason}")]
    ConnectFailed {
        device_id: DeviceId,
        port: String,
        reason: String,
    },

    /// `connect` was called on a running session.
    #[error("session is already connected")]
    AlreadyConnected,

    /// The operation needs a running session.
    #[error("session is not connected")]
    NotConnected,

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem or thread spawn error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
