use std::fmt;
use std::io;

use walkmat_frame::FrameError;
use walkmat_session::SessionError;
use walkmat_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { source, port } => match source.kind() {
            io::ErrorKind::PermissionDenied => {
                CliError::new(PERMISSION_DENIED, format!("{context}: {port}: {source}"))
            }
            _ => CliError::new(TRANSPORT_ERROR, format!("{context}: {port}: {source}")),
        },
        TransportError::Enumerate(source) | TransportError::Io(source) => {
            io_error(context, source)
        }
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::Io(err) => io_error(context, err),
        SessionError::Config(_) => CliError::new(USAGE, format!("{context}: {err}")),
        SessionError::Json(_) | SessionError::Matrix(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        SessionError::ConnectFailed { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        SessionError::AlreadyConnected | SessionError::NotConnected => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_usage_errors() {
        let err = session_error("capture", SessionError::Config("bad ports".into()));
        assert_eq!(err.code, USAGE);
        assert!(err.message.contains("bad ports"));
    }

    #[test]
    fn missing_port_is_transport_error() {
        let err = transport_error(
            "probe",
            TransportError::Open {
                port: "/dev/ttyUSB9".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.contains("/dev/ttyUSB9"));
    }
}
