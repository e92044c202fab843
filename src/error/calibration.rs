// Calibration error types and constants

use crate::error::{ErrorCode, LinkError};
use std::fmt;
use tracing::error;

/// Calibration error code constants
///
/// Error code range: 2001-2007
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// No readings were supplied for zero averaging
    pub const EMPTY_SAMPLE: i32 = 2001;

    /// Both reference points use the same known value
    pub const DEGENERATE_REFERENCE_POINTS: i32 = 2002;

    /// Conversion requested before zero and gradient were set
    pub const NOT_CALIBRATED: i32 = 2003;

    /// Both reference readings are identical, gradient would be zero
    pub const FLAT_RESPONSE: i32 = 2004;

    /// A reference value or computed parameter is NaN or infinite
    pub const NON_FINITE_REFERENCE: i32 = 2005;

    /// The device failed while collecting calibration readings
    pub const READING_FAILED: i32 = 2006;

    /// Stored calibration could not be read or written
    pub const PERSISTENCE: i32 = 2007;
}

/// Log a calibration error with structured context
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=Calibrator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Zero averaging needs at least one reading
    EmptySample,

    /// `value1 == value2` would divide by zero
    DegenerateReferencePoints { value: f64 },

    /// Zero offset or gradient not set yet
    NotCalibrated,

    /// Identical readings for different loads
    FlatResponse { reading: i32 },

    /// NaN or infinite input
    NonFiniteReference { reason: String },

    /// Transport failure while collecting readings
    ReadingFailed(LinkError),

    /// Reading or writing a stored calibration failed
    Persistence { details: String },
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::EmptySample => CalibrationErrorCodes::EMPTY_SAMPLE,
            CalibrationError::DegenerateReferencePoints { .. } => {
                CalibrationErrorCodes::DEGENERATE_REFERENCE_POINTS
            }
            CalibrationError::NotCalibrated => CalibrationErrorCodes::NOT_CALIBRATED,
            CalibrationError::FlatResponse { .. } => CalibrationErrorCodes::FLAT_RESPONSE,
            CalibrationError::NonFiniteReference { .. } => {
                CalibrationErrorCodes::NON_FINITE_REFERENCE
            }
            CalibrationError::ReadingFailed(_) => CalibrationErrorCodes::READING_FAILED,
            CalibrationError::Persistence { .. } => CalibrationErrorCodes::PERSISTENCE,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::EmptySample => {
                "Zero averaging needs at least one reading".to_string()
            }
            CalibrationError::DegenerateReferencePoints { value } => {
                format!("Reference points share the same known value ({})", value)
            }
            CalibrationError::NotCalibrated => {
                "Calibration incomplete: record zero and set gradient first".to_string()
            }
            CalibrationError::FlatResponse { reading } => {
                format!(
                    "Both reference loads produced the same reading ({}); check the load cell wiring",
                    reading
                )
            }
            CalibrationError::NonFiniteReference { reason } => {
                format!("Non-finite calibration input: {}", reason)
            }
            CalibrationError::ReadingFailed(err) => {
                format!("Reading failed during calibration: {}", err.message())
            }
            CalibrationError::Persistence { details } => {
                format!("Calibration file error: {}", details)
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}

impl From<LinkError> for CalibrationError {
    fn from(err: LinkError) -> Self {
        CalibrationError::ReadingFailed(err)
    }
}
