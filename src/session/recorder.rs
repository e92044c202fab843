// SessionRecorder - CSV time-series plus max-force summary per segment

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::SecondsFormat;
use serde::Serialize;
use tracing::{debug, info};

use super::{SegmentPaths, SessionState};
use crate::error::{log_recorder_error, RecorderError};
use crate::sampling::{AcquisitionFault, CalibratedSample, SampleConsumer, StopReason};

/// CSV column names, in row order
pub const CSV_HEADER: [&str; 4] = ["timestamp", "sequence", "raw", "value"];

#[derive(Debug, Serialize)]
struct CsvRow {
    timestamp: String,
    sequence: u64,
    raw: i32,
    value: f64,
}

impl From<&CalibratedSample> for CsvRow {
    fn from(sample: &CalibratedSample) -> Self {
        Self {
            timestamp: sample
                .wall_time
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            sequence: sample.sequence,
            raw: sample.raw.value(),
            value: sample.value,
        }
    }
}

/// Consumer persisting one labelled segment
pub struct SessionRecorder {
    paths: SegmentPaths,
    writer: Option<csv::Writer<File>>,
    state: Arc<RwLock<SessionState>>,
    rows: u64,
    faults: u64,
    flush_every: u64,
    failed: bool,
}

impl SessionRecorder {
    /// Create the participant directory and the CSV file with its header
    ///
    /// `state` is reset to the new segment's location, so one handle can be
    /// shared with a display across segments.
    pub fn create(
        paths: SegmentPaths,
        location: &str,
        state: Arc<RwLock<SessionState>>,
    ) -> Result<Self, RecorderError> {
        fs::create_dir_all(&paths.directory)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&paths.csv)?;
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;

        match state.write() {
            Ok(mut guard) => guard.reset(location),
            Err(poisoned) => poisoned.into_inner().reset(location),
        }

        info!("[SessionRecorder] Recording {} to {:?}", location, paths.csv);
        Ok(Self {
            paths,
            writer: Some(writer),
            state,
            rows: 0,
            faults: 0,
            flush_every: 10,
            failed: false,
        })
    }

    /// Flush the CSV writer every `n` rows (0 flushes only on stop)
    pub fn with_flush_every(mut self, n: u64) -> Self {
        self.flush_every = n;
        self
    }

    pub fn paths(&self) -> &SegmentPaths {
        &self.paths
    }

    pub fn state_handle(&self) -> Arc<RwLock<SessionState>> {
        Arc::clone(&self.state)
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    fn max_observed(&self) -> Option<f64> {
        match self.state.read() {
            Ok(guard) => guard.max_observed,
            Err(poisoned) => poisoned.into_inner().max_observed,
        }
    }

    fn write_row(&mut self, sample: &CalibratedSample) -> Result<(), RecorderError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        writer.serialize(CsvRow::from(sample))?;
        self.rows += 1;
        if self.flush_every > 0 && self.rows % self.flush_every == 0 {
            writer.flush()?;
        }
        Ok(())
    }

    /// Flush the CSV and write the max-force summary
    ///
    /// Closes the segment; later samples are ignored.
    pub fn finish(&mut self) -> Result<PathBuf, RecorderError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let max = self.max_observed();
        let rendered = match max {
            Some(value) => value.to_string(),
            None => "None".to_string(),
        };
        let mut file = File::create(&self.paths.max_force)?;
        writeln!(file, "Max Force for this trial: {}", rendered)?;

        info!(
            "[SessionRecorder] Segment closed: {} rows, {} faults, max {}",
            self.rows, self.faults, rendered
        );
        Ok(self.paths.max_force.clone())
    }
}

impl SampleConsumer for SessionRecorder {
    fn on_sample(&mut self, sample: &CalibratedSample) {
        match self.state.write() {
            Ok(mut guard) => guard.observe(sample.value),
            Err(poisoned) => poisoned.into_inner().observe(sample.value),
        }

        if self.failed {
            return;
        }
        if let Err(err) = self.write_row(sample) {
            // Report once; keep tracking the maximum for the summary
            log_recorder_error(&err, "SessionRecorder::on_sample");
            self.failed = true;
        }
    }

    fn on_fault(&mut self, fault: &AcquisitionFault) {
        self.faults += 1;
        debug!(
            "[SessionRecorder] Tick {} skipped ({})",
            fault.tick, fault.error
        );
    }

    fn on_stopped(&mut self, reason: &StopReason) {
        debug!("[SessionRecorder] Run ended: {}", reason);
        if let Err(err) = self.finish() {
            log_recorder_error(&err, "SessionRecorder::on_stopped");
        }
    }

    fn name(&self) -> &str {
        "session-recorder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RawSample;
    use crate::error::LinkError;
    use chrono::Utc;
    use std::time::{Duration, Instant};

    fn sample(sequence: u64, raw: i32, value: f64) -> CalibratedSample {
        CalibratedSample {
            sequence,
            timestamp: Instant::now(),
            elapsed: Duration::from_millis(sequence * 100),
            wall_time: Utc::now(),
            raw: RawSample::new(raw).unwrap(),
            value,
        }
    }

    fn recorder(root: &std::path::Path) -> SessionRecorder {
        let paths = SegmentPaths::now(root, "participant", "Left UL").unwrap();
        let state = Arc::new(RwLock::new(SessionState::default()));
        SessionRecorder::create(paths, "Left UL", state).unwrap()
    }

    #[test]
    fn test_header_written_on_create() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder(dir.path());

        let contents = fs::read_to_string(&recorder.paths().csv).unwrap();
        assert_eq!(contents, "timestamp,sequence,raw,value\n");
        assert_eq!(
            recorder.state_handle().read().unwrap().location_tag,
            "Left UL"
        );
    }

    #[test]
    fn test_rows_and_max_force() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path());
        let values = [1.5, 12.25, -3.0, 4.0];
        for (i, value) in values.iter().enumerate() {
            recorder.on_sample(&sample(i as u64, i as i32 * 10, *value));
        }
        recorder.on_fault(&AcquisitionFault {
            tick: 9,
            consecutive_failures: 1,
            error: LinkError::Timeout { received: 1 },
        });
        recorder.on_stopped(&StopReason::Requested);

        let mut reader = csv::Reader::from_path(&recorder.paths().csv).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers, csv::StringRecord::from(CSV_HEADER.to_vec()));

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[1][1], "1");
        assert_eq!(&rows[1][2], "10");
        assert_eq!(rows[1][3].parse::<f64>().unwrap(), 12.25);
        assert!(rows[0][0].ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&rows[0][0]).is_ok());

        let summary = fs::read_to_string(&recorder.paths().max_force).unwrap();
        assert_eq!(summary, "Max Force for this trial: 12.25\n");
        assert_eq!(recorder.rows_written(), 4);
    }

    #[test]
    fn test_flush_every_row_makes_rows_visible() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path()).with_flush_every(1);
        recorder.on_sample(&sample(0, 5, 0.5));

        let contents = fs::read_to_string(&recorder.paths().csv).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_empty_segment_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path());
        recorder.on_stopped(&StopReason::SampleLimitReached);

        let summary = fs::read_to_string(&recorder.paths().max_force).unwrap();
        assert_eq!(summary, "Max Force for this trial: None\n");
    }

    #[test]
    fn test_shared_state_reset_per_segment() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(RwLock::new(SessionState::default()));

        let first_paths = SegmentPaths::now(dir.path(), "p", "Left UL").unwrap();
        let mut first =
            SessionRecorder::create(first_paths, "Left UL", Arc::clone(&state)).unwrap();
        first.on_sample(&sample(0, 1, 9.0));
        first.on_stopped(&StopReason::Requested);
        assert_eq!(state.read().unwrap().max_observed, Some(9.0));

        let second_paths = SegmentPaths::now(dir.path(), "p", "Right LL").unwrap();
        let _second =
            SessionRecorder::create(second_paths, "Right LL", Arc::clone(&state)).unwrap();
        let snapshot = state.read().unwrap().clone();
        assert_eq!(snapshot, SessionState::new("Right LL"));
    }
}
