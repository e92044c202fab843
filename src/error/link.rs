// Serial link error types and constants

use crate::error::ErrorCode;
use std::fmt;
use tracing::error;

/// Link error code constants
///
/// Error code range: 1001-1004
pub struct LinkErrorCodes {}

impl LinkErrorCodes {
    /// Port could not be opened or configured
    pub const OPEN_FAILED: i32 = 1001;

    /// Fewer than 3 response bytes arrived before the deadline
    pub const TIMEOUT: i32 = 1002;

    /// Link was closed while (or before) reading
    pub const CLOSED: i32 = 1003;

    /// Any other I/O failure on the port
    pub const IO: i32 = 1004;
}

/// Log a link error with structured context
pub fn log_link_error(err: &LinkError, context: &str) {
    error!(
        "Link error in {}: code={}, component=SerialLink, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Transport-level failures on the sensor link
///
/// A failed read is never turned into a sample; every variant is surfaced to
/// the caller so a missing reading cannot be mistaken for a zero load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The device could not be opened or configured
    OpenFailed { port: String, reason: String },

    /// The deadline elapsed before a full response arrived
    Timeout { received: usize },

    /// The link was closed or the device disappeared
    Closed,

    /// Other I/O error reported by the port
    Io { details: String },
}

impl ErrorCode for LinkError {
    fn code(&self) -> i32 {
        match self {
            LinkError::OpenFailed { .. } => LinkErrorCodes::OPEN_FAILED,
            LinkError::Timeout { .. } => LinkErrorCodes::TIMEOUT,
            LinkError::Closed => LinkErrorCodes::CLOSED,
            LinkError::Io { .. } => LinkErrorCodes::IO,
        }
    }

    fn message(&self) -> String {
        match self {
            LinkError::OpenFailed { port, reason } => {
                format!("Failed to open {}: {}", port, reason)
            }
            LinkError::Timeout { received } => {
                format!("Timed out waiting for response ({} of 3 bytes)", received)
            }
            LinkError::Closed => "Link closed".to_string(),
            LinkError::Io { details } => format!("I/O error: {}", details),
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LinkError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for LinkError {}

/// Convert from std::io::Error to LinkError
///
/// Errors that mean the device is gone map to `Closed`; a timeout with no
/// bytes read maps to `Timeout`.
impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => LinkError::Timeout { received: 0 },
            ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof => LinkError::Closed,
            _ => LinkError::Io {
                details: err.to_string(),
            },
        }
    }
}
