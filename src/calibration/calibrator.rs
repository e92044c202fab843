// Calibrator - two-phase calibration builder
//
// Zero capture and gradient capture mirror the two physical steps (unloaded
// baseline, then known reference loads). Either phase can be redone without
// invalidating the other; conversion is refused until both are set.

use serde::{Deserialize, Serialize};

use super::parameters::CalibrationParameters;
use crate::decoder::RawSample;
use crate::error::CalibrationError;

/// A known load and the raw reading it produced
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub known_value: f64,
    pub reading: RawSample,
}

impl ReferencePoint {
    pub fn new(known_value: f64, reading: RawSample) -> Self {
        Self {
            known_value,
            reading,
        }
    }
}

/// Mutable calibration state set before acquisition begins
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calibrator {
    zero_offset: Option<f64>,
    gradient: Option<f64>,
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a stored calibration
    pub fn from_parameters(params: CalibrationParameters) -> Self {
        Self {
            zero_offset: Some(params.zero_offset()),
            gradient: Some(params.gradient()),
        }
    }

    /// Set the zero offset to the mean of `samples`
    ///
    /// # Errors
    /// `EmptySample` if `samples` is empty.
    pub fn record_zero(&mut self, samples: &[RawSample]) -> Result<f64, CalibrationError> {
        if samples.is_empty() {
            return Err(CalibrationError::EmptySample);
        }
        let sum: f64 = samples.iter().copied().map(f64::from).sum();
        let mean = sum / samples.len() as f64;
        self.zero_offset = Some(mean);
        tracing::debug!(
            "[Calibrator] Zero offset {:.3} from {} readings",
            mean,
            samples.len()
        );
        Ok(mean)
    }

    /// Set a known zero offset directly, e.g. one measured earlier
    pub fn set_zero_offset(&mut self, zero_offset: f64) -> Result<(), CalibrationError> {
        if !zero_offset.is_finite() {
            return Err(CalibrationError::NonFiniteReference {
                reason: format!("zero offset {}", zero_offset),
            });
        }
        self.zero_offset = Some(zero_offset);
        Ok(())
    }

    /// Derive the gradient from two reference points
    ///
    /// `gradient = (reading2 - reading1) / (value2 - value1)`
    ///
    /// # Errors
    /// - `NonFiniteReference` if a known value is NaN or infinite
    /// - `DegenerateReferencePoints` if `value1 == value2`
    /// - `FlatResponse` if both readings are equal (zero gradient)
    pub fn set_gradient(
        &mut self,
        value1: f64,
        reading1: RawSample,
        value2: f64,
        reading2: RawSample,
    ) -> Result<f64, CalibrationError> {
        if !value1.is_finite() || !value2.is_finite() {
            return Err(CalibrationError::NonFiniteReference {
                reason: format!("reference values {} and {}", value1, value2),
            });
        }
        if value1 == value2 {
            return Err(CalibrationError::DegenerateReferencePoints { value: value1 });
        }
        if reading1 == reading2 {
            return Err(CalibrationError::FlatResponse {
                reading: reading1.value(),
            });
        }

        let gradient = (f64::from(reading2) - f64::from(reading1)) / (value2 - value1);
        self.gradient = Some(gradient);
        tracing::debug!("[Calibrator] Gradient {:.6} counts/unit", gradient);
        Ok(gradient)
    }

    pub fn set_gradient_from(
        &mut self,
        first: ReferencePoint,
        second: ReferencePoint,
    ) -> Result<f64, CalibrationError> {
        self.set_gradient(
            first.known_value,
            first.reading,
            second.known_value,
            second.reading,
        )
    }

    /// Finalized parameters; `NotCalibrated` until both phases are done
    pub fn parameters(&self) -> Result<CalibrationParameters, CalibrationError> {
        match (self.zero_offset, self.gradient) {
            (Some(zero_offset), Some(gradient)) => CalibrationParameters::new(zero_offset, gradient),
            _ => Err(CalibrationError::NotCalibrated),
        }
    }

    /// `(raw - zero_offset) / gradient`
    pub fn convert(&self, raw: RawSample) -> Result<f64, CalibrationError> {
        Ok(self.parameters()?.apply(raw))
    }

    pub fn is_calibrated(&self) -> bool {
        self.parameters().is_ok()
    }

    pub fn zero_offset(&self) -> Option<f64> {
        self.zero_offset
    }

    pub fn gradient(&self) -> Option<f64> {
        self.gradient
    }
}
