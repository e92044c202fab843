// Session module - persistence and display consumers
//
// A session is one participant; each labelled segment (body location) gets
// its own CSV file and max-force summary inside the participant directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::RecorderError;

pub mod live_view;
pub mod recorder;

pub use live_view::{LiveView, WindowStats};
pub use recorder::SessionRecorder;

/// Timestamp format used in segment file names
pub const SEGMENT_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Running state of the current labelled segment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub location_tag: String,
    pub max_observed: Option<f64>,
}

impl SessionState {
    pub fn new(location_tag: impl Into<String>) -> Self {
        Self {
            location_tag: location_tag.into(),
            max_observed: None,
        }
    }

    /// Fold a value into the running maximum; NaN is ignored
    pub fn observe(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.max_observed = Some(match self.max_observed {
            Some(max) => max.max(value),
            None => value,
        });
    }

    /// Begin a new labelled segment
    pub fn reset(&mut self, location_tag: impl Into<String>) {
        self.location_tag = location_tag.into();
        self.max_observed = None;
    }
}

/// Replace spaces with underscores and reject labels unusable as path parts
fn file_label(label: &str) -> Option<String> {
    let trimmed = label.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
    {
        return None;
    }
    Some(trimmed.replace(' ', "_"))
}

/// File locations for one recording segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPaths {
    pub directory: PathBuf,
    pub csv: PathBuf,
    pub max_force: PathBuf,
}

impl SegmentPaths {
    /// `<root>/<participant>/data_<location>_<stamp>.csv` and
    /// `<root>/<participant>/max_force_<location>_<stamp>.txt`
    pub fn new(
        root: &Path,
        participant: &str,
        location: &str,
        stamp: DateTime<Local>,
    ) -> Result<Self, RecorderError> {
        let location_label = file_label(location).ok_or_else(|| RecorderError::InvalidLocation {
            location: location.to_string(),
        })?;
        let participant_label = file_label(participant).ok_or_else(|| RecorderError::Io {
            details: format!("invalid participant directory name {:?}", participant),
        })?;

        let directory = root.join(participant_label);
        let stamp = stamp.format(SEGMENT_STAMP_FORMAT).to_string();
        Ok(Self {
            csv: directory.join(format!("data_{}_{}.csv", location_label, stamp)),
            max_force: directory.join(format!("max_force_{}_{}.txt", location_label, stamp)),
            directory,
        })
    }

    pub fn now(root: &Path, participant: &str, location: &str) -> Result<Self, RecorderError> {
        Self::new(root, participant, location, Local::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_state_tracks_maximum() {
        let mut state = SessionState::new("Left UL");
        assert_eq!(state.max_observed, None);

        for value in [1.5, -3.0, 7.25, 2.0, f64::NAN] {
            state.observe(value);
        }
        assert_eq!(state.max_observed, Some(7.25));

        state.reset("Right LL");
        assert_eq!(state.location_tag, "Right LL");
        assert_eq!(state.max_observed, None);
    }

    #[test]
    fn test_negative_only_maximum() {
        let mut state = SessionState::new("x");
        state.observe(-4.0);
        state.observe(-2.0);
        assert_eq!(state.max_observed, Some(-2.0));
    }

    #[test]
    fn test_segment_paths_naming() {
        let stamp = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let paths = SegmentPaths::new(Path::new("/data"), "P 01", "Left UL", stamp).unwrap();

        assert_eq!(paths.directory, PathBuf::from("/data/P_01"));
        assert_eq!(
            paths.csv,
            PathBuf::from("/data/P_01/data_Left_UL_2024-03-09_14-05-07.csv")
        );
        assert_eq!(
            paths.max_force,
            PathBuf::from("/data/P_01/max_force_Left_UL_2024-03-09_14-05-07.txt")
        );
    }

    #[test]
    fn test_segment_paths_reject_bad_labels() {
        let stamp = Local::now();
        assert!(matches!(
            SegmentPaths::new(Path::new("."), "p1", "  ", stamp),
            Err(RecorderError::InvalidLocation { .. })
        ));
        assert!(matches!(
            SegmentPaths::new(Path::new("."), "p1", "../etc", stamp),
            Err(RecorderError::InvalidLocation { .. })
        ));
        assert!(matches!(
            SegmentPaths::new(Path::new("."), "..", "Left UL", stamp),
            Err(RecorderError::Io { .. })
        ));
    }
}
