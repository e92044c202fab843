// Session recorder error types and constants

use crate::error::ErrorCode;
use std::fmt;
use tracing::error;

/// Recorder error code constants
///
/// Error code range: 4001-4003
pub struct RecorderErrorCodes {}

impl RecorderErrorCodes {
    /// Creating a directory or writing a file failed
    pub const IO: i32 = 4001;

    /// CSV serialization failed
    pub const CSV: i32 = 4002;

    /// Location tag is empty or not in the configured list
    pub const INVALID_LOCATION: i32 = 4003;
}

/// Log a recorder error with structured context
pub fn log_recorder_error(err: &RecorderError, context: &str) {
    error!(
        "Recorder error in {}: code={}, component=SessionRecorder, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while persisting a recording segment
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderError {
    Io { details: String },
    Csv { details: String },
    InvalidLocation { location: String },
}

impl ErrorCode for RecorderError {
    fn code(&self) -> i32 {
        match self {
            RecorderError::Io { .. } => RecorderErrorCodes::IO,
            RecorderError::Csv { .. } => RecorderErrorCodes::CSV,
            RecorderError::InvalidLocation { .. } => RecorderErrorCodes::INVALID_LOCATION,
        }
    }

    fn message(&self) -> String {
        match self {
            RecorderError::Io { details } => format!("Recording I/O error: {}", details),
            RecorderError::Csv { details } => format!("CSV error: {}", details),
            RecorderError::InvalidLocation { location } => {
                format!("Invalid recording location: {:?}", location)
            }
        }
    }
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecorderError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for RecorderError {}

impl From<std::io::Error> for RecorderError {
    fn from(err: std::io::Error) -> Self {
        RecorderError::Io {
            details: err.to_string(),
        }
    }
}

impl From<csv::Error> for RecorderError {
    fn from(err: csv::Error) -> Self {
        RecorderError::Csv {
            details: err.to_string(),
        }
    }
}
