// LiveView - terminal display over a rolling window of recent samples

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::SessionState;
use crate::sampling::{AcquisitionFault, CalibratedSample, SampleConsumer, StopReason};

/// Points kept for display
pub const DEFAULT_WINDOW: usize = 200;

/// Summary of the values currently in the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub len: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub latest: f64,
}

/// Display consumer printing one status line every `refresh_every` samples
pub struct LiveView {
    sink: Box<dyn Write + Send>,
    window: VecDeque<f64>,
    capacity: usize,
    refresh_every: u64,
    seen: u64,
    session: Option<Arc<RwLock<SessionState>>>,
    sink_failed: bool,
}

impl LiveView {
    pub fn new(sink: Box<dyn Write + Send>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sink,
            window: VecDeque::with_capacity(capacity),
            capacity,
            refresh_every: 1,
            seen: 0,
            session: None,
            sink_failed: false,
        }
    }

    /// Show the segment location and running maximum from a recorder
    pub fn with_session(mut self, session: Arc<RwLock<SessionState>>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_refresh_every(mut self, n: u64) -> Self {
        self.refresh_every = n.max(1);
        self
    }

    pub fn stats(&self) -> Option<WindowStats> {
        let latest = *self.window.back()?;
        let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
        for &value in &self.window {
            min = min.min(value);
            max = max.max(value);
            sum += value;
        }
        Some(WindowStats {
            len: self.window.len(),
            min,
            max,
            mean: sum / self.window.len() as f64,
            latest,
        })
    }

    fn session_suffix(&self) -> String {
        let Some(session) = &self.session else {
            return String::new();
        };
        let state = match session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match state.max_observed {
            Some(max) => format!(" | {} max {:.3}", state.location_tag, max),
            None => format!(" | {}", state.location_tag),
        }
    }

    fn emit(&mut self, line: String) {
        if self.sink_failed {
            return;
        }
        let result = writeln!(self.sink, "{}", line).and_then(|_| self.sink.flush());
        if let Err(e) = result {
            debug!("[LiveView] Output closed: {}", e);
            self.sink_failed = true;
        }
    }
}

impl SampleConsumer for LiveView {
    fn on_sample(&mut self, sample: &CalibratedSample) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample.value);
        self.seen += 1;

        if self.seen % self.refresh_every != 0 {
            return;
        }
        let Some(stats) = self.stats() else {
            return;
        };
        let line = format!(
            "#{:<6} t={:>8.2}s value={:>10.3} raw={:>8} | window {} min {:.3} max {:.3} mean {:.3}{}",
            sample.sequence,
            sample.elapsed.as_secs_f64(),
            sample.value,
            sample.raw,
            stats.len,
            stats.min,
            stats.max,
            stats.mean,
            self.session_suffix()
        );
        self.emit(line);
    }

    fn on_fault(&mut self, fault: &AcquisitionFault) {
        let line = format!(
            "!      tick {} failed ({} in a row): {}",
            fault.tick, fault.consecutive_failures, fault.error
        );
        self.emit(line);
    }

    fn on_stopped(&mut self, reason: &StopReason) {
        let line = format!("Stopped: {}{}", reason, self.session_suffix());
        self.emit(line);
    }

    fn name(&self) -> &str {
        "live-view"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RawSample;
    use crate::error::LinkError;
    use chrono::Utc;
    use std::io;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn sample(sequence: u64, value: f64) -> CalibratedSample {
        CalibratedSample {
            sequence,
            timestamp: Instant::now(),
            elapsed: Duration::from_millis(sequence * 100),
            wall_time: Utc::now(),
            raw: RawSample::new(sequence as i32).unwrap(),
            value,
        }
    }

    #[test]
    fn test_window_rolls_over() {
        let buffer = SharedBuffer::default();
        let mut view = LiveView::new(Box::new(buffer.clone()), 3);
        for (i, value) in [1.0, 2.0, 3.0, 10.0].into_iter().enumerate() {
            view.on_sample(&sample(i as u64, value));
        }

        let stats = view.stats().unwrap();
        assert_eq!(stats.len, 3);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 10.0);
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.latest, 10.0);
        assert_eq!(buffer.lines().len(), 4);
    }

    #[test]
    fn test_refresh_every_throttles_output() {
        let buffer = SharedBuffer::default();
        let mut view = LiveView::new(Box::new(buffer.clone()), 10).with_refresh_every(5);
        for i in 0..12 {
            view.on_sample(&sample(i, i as f64));
        }
        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("#4"));
        assert!(lines[1].starts_with("#9"));
    }

    #[test]
    fn test_fault_stop_and_session_lines() {
        let buffer = SharedBuffer::default();
        let mut state = SessionState::new("Right UL");
        state.observe(4.5);
        let session = Arc::new(RwLock::new(state));
        let mut view = LiveView::new(Box::new(buffer.clone()), 10).with_session(session);

        view.on_fault(&AcquisitionFault {
            tick: 3,
            consecutive_failures: 2,
            error: LinkError::Closed,
        });
        view.on_stopped(&StopReason::SampleLimitReached);

        let lines = buffer.lines();
        assert!(lines[0].contains("tick 3 failed (2 in a row)"));
        assert_eq!(
            lines[1],
            "Stopped: sample limit reached | Right UL max 4.500"
        );
    }

    #[test]
    fn test_empty_window_has_no_stats() {
        let view = LiveView::new(Box::new(io::sink()), 0);
        assert!(view.stats().is_none());
    }
}
