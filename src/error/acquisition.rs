// Sampling loop error types and constants

use crate::error::{CalibrationError, ErrorCode, LinkError};
use std::fmt;
use tracing::error;

/// Acquisition error code constants
///
/// Error code range: 3001-3007
pub struct AcquisitionErrorCodes {}

impl AcquisitionErrorCodes {
    /// Calibration incomplete when starting the loop
    pub const CALIBRATION: i32 = 3001;

    /// `start()` called on a loop that is not idle
    pub const ALREADY_STARTED: i32 = 3002;

    /// Sampling configuration rejected
    pub const INVALID_CONFIG: i32 = 3003;

    /// The loop does not hold a transport
    pub const LINK_UNAVAILABLE: i32 = 3004;

    /// Consecutive failure threshold exceeded
    pub const LINK_LOST: i32 = 3005;

    /// The acquisition thread panicked
    pub const WORKER_PANICKED: i32 = 3006;

    /// A thread could not be spawned
    pub const SPAWN_FAILED: i32 = 3007;
}

/// Log an acquisition error with structured context
pub fn log_acquisition_error(err: &AcquisitionError, context: &str) {
    error!(
        "Acquisition error in {}: code={}, component=SamplingLoop, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised by the sampling loop
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    /// Calibration must be complete before `start()`
    Calibration(CalibrationError),

    /// Loop already running or finished
    AlreadyStarted,

    /// Invalid period, queue capacity or rate
    InvalidConfig { reason: String },

    /// Transport already handed back or never supplied
    LinkUnavailable,

    /// More than the tolerated number of consecutive transport failures
    LinkLost {
        consecutive_failures: u32,
        last_error: LinkError,
    },

    /// The acquisition thread panicked
    WorkerPanicked,

    /// Thread creation failed
    SpawnFailed { reason: String },
}

impl ErrorCode for AcquisitionError {
    fn code(&self) -> i32 {
        match self {
            AcquisitionError::Calibration(_) => AcquisitionErrorCodes::CALIBRATION,
            AcquisitionError::AlreadyStarted => AcquisitionErrorCodes::ALREADY_STARTED,
            AcquisitionError::InvalidConfig { .. } => AcquisitionErrorCodes::INVALID_CONFIG,
            AcquisitionError::LinkUnavailable => AcquisitionErrorCodes::LINK_UNAVAILABLE,
            AcquisitionError::LinkLost { .. } => AcquisitionErrorCodes::LINK_LOST,
            AcquisitionError::WorkerPanicked => AcquisitionErrorCodes::WORKER_PANICKED,
            AcquisitionError::SpawnFailed { .. } => AcquisitionErrorCodes::SPAWN_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            AcquisitionError::Calibration(err) => {
                format!("Cannot start sampling: {}", err.message())
            }
            AcquisitionError::AlreadyStarted => {
                "Sampling loop already started. Create a new loop to run again.".to_string()
            }
            AcquisitionError::InvalidConfig { reason } => {
                format!("Invalid sampling configuration: {}", reason)
            }
            AcquisitionError::LinkUnavailable => "No sensor link attached".to_string(),
            AcquisitionError::LinkLost {
                consecutive_failures,
                last_error,
            } => {
                format!(
                    "Link lost after {} consecutive failures (last: {})",
                    consecutive_failures,
                    last_error.message()
                )
            }
            AcquisitionError::WorkerPanicked => "Acquisition thread panicked".to_string(),
            AcquisitionError::SpawnFailed { reason } => {
                format!("Failed to spawn thread: {}", reason)
            }
        }
    }
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AcquisitionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AcquisitionError {}

impl From<CalibrationError> for AcquisitionError {
    fn from(err: CalibrationError) -> Self {
        AcquisitionError::Calibration(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_error_codes() {
        assert_eq!(
            AcquisitionError::Calibration(CalibrationError::NotCalibrated).code(),
            3001
        );
        assert_eq!(AcquisitionError::AlreadyStarted.code(), 3002);
        assert_eq!(
            AcquisitionError::LinkLost {
                consecutive_failures: 4,
                last_error: LinkError::Closed,
            }
            .code(),
            AcquisitionErrorCodes::LINK_LOST
        );
    }

    #[test]
    fn test_link_lost_message_names_last_error() {
        let err = AcquisitionError::LinkLost {
            consecutive_failures: 4,
            last_error: LinkError::Timeout { received: 1 },
        };
        assert!(err.message().contains("4 consecutive failures"));
        assert!(err.message().contains("1 of 3 bytes"));
    }

    #[test]
    fn test_error_propagation() {
        fn may_fail() -> Result<(), CalibrationError> {
            Err(CalibrationError::NotCalibrated)
        }

        fn caller() -> Result<(), AcquisitionError> {
            may_fail()?;
            Ok(())
        }

        assert_eq!(
            caller(),
            Err(AcquisitionError::Calibration(CalibrationError::NotCalibrated))
        );
    }
}
