// Calibration module - raw ADC counts to physical units
//
// This module provides three components:
// 1. Calibrator: two-phase builder holding zero offset and gradient
// 2. CalibrationParameters: finalized, immutable snapshot used during a run
// 3. CalibrationProcedure: drives a transport to capture the readings
//
// The calibration workflow:
// 1. Average n unloaded readings into the zero offset
// 2. Measure two known loads to derive the gradient
// 3. Take the parameters snapshot and hand it to the sampling loop

pub mod calibrator;
pub mod parameters;
pub mod procedure;

pub use calibrator::{Calibrator, ReferencePoint};
pub use parameters::CalibrationParameters;
pub use procedure::{collect_readings, CalibrationProcedure};
