//! Error types for the connection session
//!
//! Platform errors are folded into a [`TransportErrorKind`]. The kind decides
//! whether the session survives the error: see [`TransportErrorKind::is_fatal`].

use std::fmt;
use std::io;

use thiserror::Error;

/// Classification of a transport-reported error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The port does not exist (never existed, or was unplugged)
    DeviceNotFound,
    /// Access to the port was denied
    PermissionDenied,
    /// The handle is no longer usable (device removed mid-session, I/O failure)
    ResourceUnavailable,
    /// The port is opened by someone else
    Busy,
    /// Framing error on the line
    Framing,
    /// Parity error on the line
    Parity,
    /// Operation timed out
    Timeout,
    /// Anything else
    Other,
}

impl TransportErrorKind {
    /// Whether the connection must be torn down after this error
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound | Self::PermissionDenied | Self::ResourceUnavailable
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DeviceNotFound => "device not found",
            Self::PermissionDenied => "permission denied",
            Self::ResourceUnavailable => "resource unavailable",
            Self::Busy => "port busy",
            Self::Framing => "framing error",
            Self::Parity => "parity error",
            Self::Timeout => "timeout",
            Self::Other => "I/O error",
        };
        f.write_str(s)
    }
}

/// An error reported by the serial transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Error class
    pub kind: TransportErrorKind,
    /// Human-readable message from the platform
    pub message: String,
}

impl TransportError {
    /// Create a transport error
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether the connection must be torn down after this error
    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    /// Reclassify an error raised by I/O on an already open handle
    ///
    /// serialport reports a hung-up device (EIO, ENXIO, ENODEV) as
    /// `ErrorKind::Unknown` and drops the errno, so an unclassified failure on
    /// an open handle means the handle is gone.
    pub(crate) fn on_open_handle(mut self) -> Self {
        if self.kind == TransportErrorKind::Other {
            self.kind = TransportErrorKind::ResourceUnavailable;
        }
        self
    }
}

#[cfg(unix)]
mod os {
    pub const EIO: i32 = 5;
    pub const ENXIO: i32 = 6;
    pub const EBUSY: i32 = 16;
    pub const ENODEV: i32 = 19;
}

#[cfg(windows)]
mod os {
    pub const ERROR_BAD_COMMAND: i32 = 22;
    pub const ERROR_GEN_FAILURE: i32 = 31;
    pub const ERROR_SHARING_VIOLATION: i32 = 32;
    pub const ERROR_OPERATION_ABORTED: i32 = 995;
    pub const ERROR_DEVICE_NOT_CONNECTED: i32 = 1167;
}

fn kind_from_os_code(code: i32) -> Option<TransportErrorKind> {
    #[cfg(unix)]
    {
        match code {
            os::EIO | os::ENXIO | os::ENODEV => Some(TransportErrorKind::ResourceUnavailable),
            os::EBUSY => Some(TransportErrorKind::Busy),
            _ => None,
        }
    }
    #[cfg(windows)]
    {
        match code {
            os::ERROR_BAD_COMMAND
            | os::ERROR_GEN_FAILURE
            | os::ERROR_OPERATION_ABORTED
            | os::ERROR_DEVICE_NOT_CONNECTED => Some(TransportErrorKind::ResourceUnavailable),
            os::ERROR_SHARING_VIOLATION => Some(TransportErrorKind::Busy),
            _ => None,
        }
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = code;
        None
    }
}

fn kind_from_io(kind: io::ErrorKind) -> TransportErrorKind {
    match kind {
        io::ErrorKind::NotFound => TransportErrorKind::DeviceNotFound,
        io::ErrorKind::PermissionDenied => TransportErrorKind::PermissionDenied,
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof => TransportErrorKind::ResourceUnavailable,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportErrorKind::Timeout,
        _ => TransportErrorKind::Other,
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        let kind = err
            .raw_os_error()
            .and_then(kind_from_os_code)
            .unwrap_or_else(|| kind_from_io(err.kind()));
        Self::new(kind, err.to_string())
    }
}

impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        let kind = match err.kind() {
            serialport::ErrorKind::NoDevice => TransportErrorKind::DeviceNotFound,
            serialport::ErrorKind::Io(kind) => kind_from_io(kind),
            serialport::ErrorKind::InvalidInput | serialport::ErrorKind::Unknown => {
                TransportErrorKind::Other
            }
        };
        Self::new(kind, err.description)
    }
}

/// Errors returned by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation needs an open connection
    #[error("not connected")]
    NotConnected,

    /// Opening the port failed
    #[error("failed to connect to {port}: {source}")]
    OpenFailed {
        port: String,
        #[source]
        source: TransportError,
    },

    /// Transport reported an error during I/O
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_set_is_closed() {
        let fatal: Vec<_> = [
            TransportErrorKind::DeviceNotFound,
            TransportErrorKind::PermissionDenied,
            TransportErrorKind::ResourceUnavailable,
            TransportErrorKind::Busy,
            TransportErrorKind::Framing,
            TransportErrorKind::Parity,
            TransportErrorKind::Timeout,
            TransportErrorKind::Other,
        ]
        .into_iter()
        .filter(|k| k.is_fatal())
        .collect();

        assert_eq!(
            fatal,
            vec![
                TransportErrorKind::DeviceNotFound,
                TransportErrorKind::PermissionDenied,
                TransportErrorKind::ResourceUnavailable,
            ]
        );
    }

    #[test]
    fn test_io_error_mapping() {
        let err: TransportError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.kind, TransportErrorKind::PermissionDenied);
        assert!(err.is_fatal());

        let err: TransportError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert_eq!(err.kind, TransportErrorKind::ResourceUnavailable);

        let err: TransportError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert_eq!(err.kind, TransportErrorKind::Timeout);
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "slow");
    }

    #[cfg(unix)]
    #[test]
    fn test_unplug_errno_is_fatal() {
        let err: TransportError = io::Error::from_raw_os_error(os::EIO).into();
        assert_eq!(err.kind, TransportErrorKind::ResourceUnavailable);

        let err: TransportError = io::Error::from_raw_os_error(os::EBUSY).into();
        assert_eq!(err.kind, TransportErrorKind::Busy);
    }

    #[test]
    fn test_serialport_error_mapping() {
        let err: TransportError =
            serialport::Error::new(serialport::ErrorKind::NoDevice, "No such device").into();
        assert_eq!(err.kind, TransportErrorKind::DeviceNotFound);
        assert_eq!(err.message, "No such device");

        let err: TransportError =
            serialport::Error::new(serialport::ErrorKind::InvalidInput, "bad baud").into();
        assert_eq!(err.kind, TransportErrorKind::Other);
    }

    #[test]
    fn test_unclassified_failure_on_open_handle_is_fatal() {
        let err: TransportError =
            serialport::Error::new(serialport::ErrorKind::Unknown, "Input/output error").into();
        assert_eq!(err.kind, TransportErrorKind::Other);
        assert!(!err.is_fatal());

        let err = err.on_open_handle();
        assert_eq!(err.kind, TransportErrorKind::ResourceUnavailable);
        assert_eq!(err.message, "Input/output error");

        let err = TransportError::new(TransportErrorKind::Timeout, "slow").on_open_handle();
        assert_eq!(err.kind, TransportErrorKind::Timeout);
    }

    #[test]
    fn test_open_failed_message() {
        let err = SessionError::OpenFailed {
            port: "COM3".to_string(),
            source: TransportError::new(TransportErrorKind::Busy, "Access is denied."),
        };
        assert_eq!(err.to_string(), "failed to connect to COM3: Access is denied.");
    }
}
