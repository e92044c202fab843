// CalibrationProcedure - capture calibration readings from the device
//
// Readings are averaged over a configurable count, matching the way the
// bench tool zeroes the cell (mean of n unloaded reads) and the way
// reference loads are measured.

use tracing::info;

use super::calibrator::{Calibrator, ReferencePoint};
use crate::decoder::{decode, RawSample};
use crate::error::{log_calibration_error, CalibrationError};
use crate::link::SensorTransport;

/// Read `count` raw samples from the link
///
/// # Errors
/// - `EmptySample` if `count` is zero
/// - `ReadingFailed` on the first transport failure; calibration readings are
///   never retried or skipped
pub fn collect_readings(
    link: &mut dyn SensorTransport,
    count: usize,
) -> Result<Vec<RawSample>, CalibrationError> {
    if count == 0 {
        return Err(CalibrationError::EmptySample);
    }
    let mut readings = Vec::with_capacity(count);
    for index in 0..count {
        let bytes = link.request_raw_reading().map_err(|e| {
            let err = CalibrationError::from(e);
            log_calibration_error(&err, &format!("collect_readings[{}]", index));
            err
        })?;
        readings.push(decode(bytes));
    }
    Ok(readings)
}

/// Drives a transport through the zero and reference captures
pub struct CalibrationProcedure<'a> {
    link: &'a mut dyn SensorTransport,
    averaging: usize,
}

impl<'a> CalibrationProcedure<'a> {
    /// `averaging` is the number of readings averaged per capture (n >= 1)
    pub fn new(link: &'a mut dyn SensorTransport, averaging: usize) -> Self {
        Self { link, averaging }
    }

    /// Average unloaded readings into the calibrator's zero offset
    pub fn capture_zero(&mut self, calibrator: &mut Calibrator) -> Result<f64, CalibrationError> {
        let readings = collect_readings(self.link, self.averaging)?;
        let zero = calibrator.record_zero(&readings)?;
        info!(
            "[Calibration] Zero offset {:.2} from {} readings on {}",
            zero,
            readings.len(),
            self.link.describe()
        );
        Ok(zero)
    }

    /// Average readings under a known load into a reference point
    pub fn measure_reference(&mut self, known_value: f64) -> Result<ReferencePoint, CalibrationError> {
        let readings = collect_readings(self.link, self.averaging)?;
        let sum: f64 = readings.iter().copied().map(f64::from).sum();
        let mean = sum / readings.len() as f64;
        let reading = RawSample::saturating(mean.round() as i64);
        info!(
            "[Calibration] Reference {} -> raw {} (mean of {})",
            known_value,
            reading,
            readings.len()
        );
        Ok(ReferencePoint::new(known_value, reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use crate::link::ScriptedLink;

    #[test]
    fn test_collect_readings() {
        let mut link = ScriptedLink::readings([1, 2, 3, 4]);
        let readings = collect_readings(&mut link, 3).unwrap();
        let values: Vec<i32> = readings.iter().map(|r| r.value()).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(link.remaining(), 1);
    }

    #[test]
    fn test_collect_zero_count_is_empty_sample() {
        let mut link = ScriptedLink::readings([1]);
        assert_eq!(
            collect_readings(&mut link, 0),
            Err(CalibrationError::EmptySample)
        );
    }

    #[test]
    fn test_transport_failure_aborts_capture() {
        let mut link = ScriptedLink::readings([10])
            .then_fail(1, LinkError::Timeout { received: 2 })
            .then_readings([30]);
        let mut calibrator = Calibrator::new();
        let mut procedure = CalibrationProcedure::new(&mut link, 3);
        assert_eq!(
            procedure.capture_zero(&mut calibrator),
            Err(CalibrationError::ReadingFailed(LinkError::Timeout {
                received: 2
            }))
        );
        assert_eq!(calibrator.zero_offset(), None);
    }

    #[test]
    fn test_full_two_point_procedure() {
        // zero: 10, 20, 30 -> 20; 0 kg: 20 x3; 100 kg: 100020 x3
        let mut link = ScriptedLink::readings([10, 20, 30, 20, 20, 20])
            .then_readings([100_019, 100_020, 100_021]);
        let mut calibrator = Calibrator::new();
        let mut procedure = CalibrationProcedure::new(&mut link, 3);

        assert_eq!(procedure.capture_zero(&mut calibrator).unwrap(), 20.0);
        let empty = procedure.measure_reference(0.0).unwrap();
        let loaded = procedure.measure_reference(100.0).unwrap();
        assert_eq!(empty.reading.value(), 20);
        assert_eq!(loaded.reading.value(), 100_020);

        calibrator.set_gradient_from(empty, loaded).unwrap();
        let value = calibrator
            .convert(RawSample::new(50_020).unwrap())
            .unwrap();
        assert!((value - 50.0).abs() < 1e-9);
    }
}
