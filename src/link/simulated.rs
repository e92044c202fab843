//! Deterministic simulated load cell.
//!
//! Produces a repeating press pattern (half-sine pulses separated by rest
//! periods) in raw ADC counts, with seeded noise so runs are reproducible.
//! Used by the CLI `--simulate` mode and by tests that need a live-looking
//! signal without hardware.

use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::SensorTransport;
use crate::decoder::{encode, RawSample, RESPONSE_LEN};
use crate::error::LinkError;

/// Shape of the synthetic signal
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedProfile {
    /// Raw reading with no load applied
    pub zero_counts: i32,
    /// Raw counts per physical unit
    pub counts_per_unit: f64,
    /// Peak load of each press
    pub peak_load: f64,
    /// Reads between the starts of consecutive presses (0 disables presses)
    pub press_every: u64,
    /// Reads each press lasts
    pub press_length: u64,
    /// Uniform noise amplitude in raw counts
    pub noise_counts: i32,
    pub seed: u64,
    /// Fail every n-th read with a timeout
    pub dropout_every: Option<u64>,
    /// Simulated device turnaround per read
    pub response_delay: Duration,
}

impl Default for SimulatedProfile {
    fn default() -> Self {
        Self {
            zero_counts: 8_000,
            counts_per_unit: 1_000.0,
            peak_load: 60.0,
            press_every: 40,
            press_length: 15,
            noise_counts: 25,
            seed: 0x10AD,
            dropout_every: None,
            response_delay: Duration::ZERO,
        }
    }
}

impl SimulatedProfile {
    /// Noise-free raw reading for a given load
    pub fn raw_for_load(&self, load: f64) -> RawSample {
        RawSample::saturating(self.zero_counts as i64 + (load * self.counts_per_unit).round() as i64)
    }
}

/// Simulated transport implementing [`SensorTransport`]
pub struct SimulatedLink {
    profile: SimulatedProfile,
    rng: StdRng,
    reads: u64,
    static_load: Option<f64>,
    open: bool,
}

impl SimulatedLink {
    pub fn new(profile: SimulatedProfile) -> Self {
        let rng = StdRng::seed_from_u64(profile.seed);
        Self {
            profile,
            rng,
            reads: 0,
            static_load: None,
            open: true,
        }
    }

    /// Hold a constant load instead of the press pattern (`None` resumes it)
    pub fn set_static_load(&mut self, load: Option<f64>) {
        self.static_load = load;
    }

    pub fn profile(&self) -> &SimulatedProfile {
        &self.profile
    }

    /// Number of read requests served so far, including dropouts
    pub fn reads(&self) -> u64 {
        self.reads
    }

    fn load_at(&self, index: u64) -> f64 {
        if let Some(load) = self.static_load {
            return load;
        }
        let p = &self.profile;
        if p.press_every == 0 || p.press_length == 0 {
            return 0.0;
        }
        let phase = index % p.press_every;
        if phase < p.press_length {
            p.peak_load * (PI * (phase as f64 + 0.5) / p.press_length as f64).sin()
        } else {
            0.0
        }
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new(SimulatedProfile::default())
    }
}

impl SensorTransport for SimulatedLink {
    fn request_raw_reading(&mut self) -> Result<[u8; RESPONSE_LEN], LinkError> {
        if !self.open {
            return Err(LinkError::Closed);
        }

        let index = self.reads;
        self.reads += 1;

        if let Some(every) = self.profile.dropout_every.filter(|n| *n > 0) {
            if (index + 1) % every == 0 {
                return Err(LinkError::Timeout { received: 0 });
            }
        }

        if !self.profile.response_delay.is_zero() {
            thread::sleep(self.profile.response_delay);
        }

        let noise = if self.profile.noise_counts > 0 {
            let amplitude = self.profile.noise_counts;
            self.rng.gen_range(-amplitude..=amplitude)
        } else {
            0
        };
        let clean = self.profile.raw_for_load(self.load_at(index));
        Ok(encode(RawSample::saturating(clean.value() as i64 + noise as i64)))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> String {
        format!("simulated(seed={:#x})", self.profile.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;

    fn quiet_profile() -> SimulatedProfile {
        SimulatedProfile {
            noise_counts: 0,
            ..SimulatedProfile::default()
        }
    }

    #[test]
    fn test_rest_reads_zero_counts() {
        let profile = quiet_profile();
        let mut link = SimulatedLink::new(profile.clone());
        // Skip to the rest portion of the first cycle
        for _ in 0..profile.press_length {
            link.request_raw_reading().unwrap();
        }
        let raw = decode(link.request_raw_reading().unwrap());
        assert_eq!(raw.value(), profile.zero_counts);
    }

    #[test]
    fn test_press_peaks_near_peak_load() {
        let profile = quiet_profile();
        let mut link = SimulatedLink::new(profile.clone());
        let max = (0..profile.press_every)
            .map(|_| decode(link.request_raw_reading().unwrap()).value())
            .max()
            .unwrap();
        let peak = profile.raw_for_load(profile.peak_load).value();
        assert!(max <= peak);
        assert!(max > profile.raw_for_load(profile.peak_load * 0.95).value());
    }

    #[test]
    fn test_static_load() {
        let mut link = SimulatedLink::new(quiet_profile());
        link.set_static_load(Some(100.0));
        let raw = decode(link.request_raw_reading().unwrap());
        assert_eq!(raw.value(), 8_000 + 100_000);
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let mut a = SimulatedLink::default();
        let mut b = SimulatedLink::default();
        for _ in 0..50 {
            assert_eq!(
                a.request_raw_reading().unwrap(),
                b.request_raw_reading().unwrap()
            );
        }
    }

    #[test]
    fn test_dropouts_and_close() {
        let mut link = SimulatedLink::new(SimulatedProfile {
            dropout_every: Some(3),
            ..quiet_profile()
        });
        assert!(link.request_raw_reading().is_ok());
        assert!(link.request_raw_reading().is_ok());
        assert_eq!(
            link.request_raw_reading().unwrap_err(),
            LinkError::Timeout { received: 0 }
        );
        assert_eq!(link.reads(), 3);

        link.close();
        assert!(!link.is_open());
        assert_eq!(link.request_raw_reading().unwrap_err(), LinkError::Closed);
    }
}
