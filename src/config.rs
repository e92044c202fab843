//! Configuration management for acquisition parameters
//!
//! Serial settings, sampling rate and failure tolerance, calibration
//! averaging and recording layout are loaded from a JSON file so a bench
//! setup can be changed without recompiling. Missing sections or fields
//! fall back to defaults; CLI flags override file values.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AcquisitionError;
use crate::link::LinkConfig;
use crate::sampling::SamplingConfig;

/// Default config file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/loadcell.json";

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub sampling: SamplingSettings,
    pub calibration: CalibrationSettings,
    pub recording: RecordingConfig,
}

/// Serial port parameters (8N1 is fixed by the device)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Per-reading response timeout
    pub timeout_ms: u64,
    /// Delay after opening before the device answers
    pub settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: if cfg!(windows) { "COM5" } else { "/dev/ttyUSB0" }.to_string(),
            baud_rate: crate::link::serial::DEFAULT_BAUD_RATE,
            timeout_ms: 1000,
            settle_ms: 100,
        }
    }
}

impl SerialConfig {
    pub fn to_link_config(&self) -> LinkConfig {
        LinkConfig::new(self.port.clone())
            .with_baud_rate(self.baud_rate)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_settle(Duration::from_millis(self.settle_ms))
    }
}

/// Sampling loop parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    pub rate_hz: f64,
    /// Consecutive failures tolerated before the link is declared lost
    pub max_consecutive_failures: u32,
    /// Per-consumer queue depth
    pub queue_capacity: usize,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            rate_hz: 10.0,
            max_consecutive_failures: 3,
            queue_capacity: 256,
        }
    }
}

impl SamplingSettings {
    pub fn to_sampling_config(
        &self,
        sample_limit: Option<u64>,
    ) -> Result<SamplingConfig, AcquisitionError> {
        let mut config = SamplingConfig::from_rate_hz(self.rate_hz)?;
        config.max_consecutive_failures = self.max_consecutive_failures;
        config.queue_capacity = self.queue_capacity;
        config.sample_limit = sample_limit;
        config.validate()?;
        Ok(config)
    }
}

/// Calibration capture parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Unloaded readings averaged into the zero offset
    pub zero_samples: usize,
    /// Readings averaged per reference load
    pub reference_samples: usize,
    /// Stored calibration used by `record` when none is given
    pub parameters_path: PathBuf,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            zero_samples: 10,
            reference_samples: 10,
            parameters_path: PathBuf::from("calibration.json"),
        }
    }
}

/// Recording layout and display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Parent of the per-participant directories
    pub output_dir: PathBuf,
    /// Accepted location tags
    pub locations: Vec<String>,
    /// Points kept in the live view window
    pub display_window: usize,
    /// Print a live view line every N samples
    pub display_every: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            locations: ["Left UL", "Right UL", "Left LL", "Right LL"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            display_window: crate::session::live_view::DEFAULT_WINDOW,
            display_every: 1,
        }
    }
}

impl RecordingConfig {
    /// Case-sensitive match against the configured tags; an empty list
    /// accepts any tag
    pub fn is_known_location(&self, location: &str) -> bool {
        self.locations.is_empty() || self.locations.iter().any(|l| l == location)
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    ///
    /// Falls back to defaults (with a warning) when the file is missing or
    /// not valid JSON.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    pub fn load() -> Self {
        Self::load_from_file(DEFAULT_CONFIG_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.settle_ms, 100);
        assert_eq!(config.sampling.rate_hz, 10.0);
        assert_eq!(config.sampling.max_consecutive_failures, 3);
        assert_eq!(config.calibration.zero_samples, 10);
        assert_eq!(config.recording.display_window, 200);
        assert!(config.recording.is_known_location("Left LL"));
        assert!(!config.recording.is_known_location("left ll"));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loadcell.json");
        fs::write(
            &path,
            r#"{ "serial": { "port": "/dev/ttyACM3" }, "sampling": { "rate_hz": 50.0 } }"#,
        )
        .unwrap();

        let config = AppConfig::load_from_file(&path);
        assert_eq!(config.serial.port, "/dev/ttyACM3");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.sampling.rate_hz, 50.0);
        assert_eq!(config.sampling.queue_capacity, 256);
        assert_eq!(config.recording, RecordingConfig::default());
    }

    #[test]
    fn test_invalid_or_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppConfig::load_from_file(&path), AppConfig::default());
        assert_eq!(
            AppConfig::load_from_file(dir.path().join("missing.json")),
            AppConfig::default()
        );
    }

    #[test]
    fn test_conversions() {
        let config = AppConfig::default();
        let sampling = config.sampling.to_sampling_config(Some(5)).unwrap();
        assert_eq!(sampling.period, Duration::from_millis(100));
        assert_eq!(sampling.sample_limit, Some(5));

        let link = config.serial.to_link_config();
        assert_eq!(link.baud_rate, 115_200);
        assert_eq!(link.timeout, Duration::from_millis(1000));

        let bad = SamplingSettings {
            queue_capacity: 0,
            ..SamplingSettings::default()
        };
        assert!(bad.to_sampling_config(None).is_err());
    }
}
