/// Errors that can occur in sensor link operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the named port.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: std::io::Error,
    },

    /// Failed to enumerate the ports available on this host.
    #[error("failed to enumerate ports: {0}")]
    Enumerate(std::io::Error),

    /// An I/O error occurred on an open link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
