// CalibrationParameters - finalized linear mapping from raw counts to units
//
// value = (raw - zero_offset) / gradient
//
// Parameters are validated on construction and on load, so a snapshot can
// always be applied without an error path.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::decoder::RawSample;
use crate::error::CalibrationError;

/// Finalized zero offset and gradient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    zero_offset: f64,
    gradient: f64,
}

impl CalibrationParameters {
    /// Validate and build a parameter set
    ///
    /// # Errors
    /// - `NonFiniteReference` if either value is NaN or infinite
    /// - `FlatResponse` if the gradient is zero
    pub fn new(zero_offset: f64, gradient: f64) -> Result<Self, CalibrationError> {
        if !zero_offset.is_finite() || !gradient.is_finite() {
            return Err(CalibrationError::NonFiniteReference {
                reason: format!("zero_offset={}, gradient={}", zero_offset, gradient),
            });
        }
        if gradient == 0.0 {
            return Err(CalibrationError::FlatResponse {
                reading: zero_offset.round() as i32,
            });
        }
        Ok(Self {
            zero_offset,
            gradient,
        })
    }

    pub fn zero_offset(&self) -> f64 {
        self.zero_offset
    }

    pub fn gradient(&self) -> f64 {
        self.gradient
    }

    /// Convert a raw reading to calibrated units
    #[inline]
    pub fn apply(&self, raw: RawSample) -> f64 {
        (f64::from(raw) - self.zero_offset) / self.gradient
    }

    /// Write the parameters as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| CalibrationError::Persistence {
            details: e.to_string(),
        })?;
        fs::write(&path, json).map_err(|e| CalibrationError::Persistence {
            details: format!("{}: {}", path.as_ref().display(), e),
        })?;
        log::info!("[Calibration] Saved parameters to {:?}", path.as_ref());
        Ok(())
    }

    /// Read and re-validate parameters written by [`save`](Self::save)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let contents = fs::read_to_string(&path).map_err(|e| CalibrationError::Persistence {
            details: format!("{}: {}", path.as_ref().display(), e),
        })?;
        let stored: Self =
            serde_json::from_str(&contents).map_err(|e| CalibrationError::Persistence {
                details: format!("{}: {}", path.as_ref().display(), e),
            })?;
        Self::new(stored.zero_offset, stored.gradient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_linear_mapping() {
        let params = CalibrationParameters::new(0.0, 1000.0).unwrap();
        let raw = RawSample::new(50_000).unwrap();
        assert!((params.apply(raw) - 50.0).abs() < 1e-9);

        let params = CalibrationParameters::new(8_000.0, 1000.0).unwrap();
        let raw = RawSample::new(7_000).unwrap();
        assert!((params.apply(raw) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_zero_and_non_finite_gradient() {
        assert!(matches!(
            CalibrationParameters::new(0.0, 0.0),
            Err(CalibrationError::FlatResponse { .. })
        ));
        assert!(matches!(
            CalibrationParameters::new(f64::NAN, 1.0),
            Err(CalibrationError::NonFiniteReference { .. })
        ));
        assert!(matches!(
            CalibrationParameters::new(0.0, f64::INFINITY),
            Err(CalibrationError::NonFiniteReference { .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        let params = CalibrationParameters::new(20.0, -1234.5).unwrap();
        params.save(&path).unwrap();

        let loaded = CalibrationParameters::load(&path).unwrap();
        assert_eq!(loaded, params);
    }

    #[test]
    fn test_load_revalidates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"zero_offset": 1.0, "gradient": 0.0}"#).unwrap();
        assert!(matches!(
            CalibrationParameters::load(&path),
            Err(CalibrationError::FlatResponse { .. })
        ));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            CalibrationParameters::load(&missing),
            Err(CalibrationError::Persistence { .. })
        ));
    }
}
