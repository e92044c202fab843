// Error types for the load-cell acquisition library
//
// Each domain (serial link, calibration, sampling loop, session recording) has
// its own error enum. All of them carry a stable numeric code so the CLI and
// log lines can report failures consistently.

mod acquisition;
mod calibration;
mod link;
mod recorder;

pub use acquisition::{log_acquisition_error, AcquisitionError, AcquisitionErrorCodes};
pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use link::{log_link_error, LinkError, LinkErrorCodes};
pub use recorder::{log_recorder_error, RecorderError, RecorderErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
