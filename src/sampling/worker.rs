// SamplingWorker - acquisition thread body
//
// Tick deadlines are absolute: start + tick * period. The tick index counts
// every scheduled tick, failed ones included, so the schedule never drifts.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{
    AcquisitionEvent, AcquisitionFault, CalibratedSample, LoopState, RunSummary, SamplingConfig,
    StopReason,
};
use crate::calibration::CalibrationParameters;
use crate::decoder::decode;
use crate::error::log_link_error;
use crate::link::SensorTransport;

/// What the acquisition thread hands back when it exits
pub(super) struct WorkerExit {
    pub link: Box<dyn SensorTransport>,
    pub summary: RunSummary,
}

pub(super) struct SamplingWorker {
    link: Box<dyn SensorTransport>,
    params: CalibrationParameters,
    config: SamplingConfig,
    tx: broadcast::Sender<AcquisitionEvent>,
    shutdown: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

/// Offset of tick `tick` from the run start
fn deadline_offset(period: Duration, tick: u64) -> Duration {
    let nanos = period.as_nanos().saturating_mul(u128::from(tick));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Index of the most recent deadline at or before `elapsed`
fn due_tick(period: Duration, elapsed: Duration) -> u64 {
    let due = elapsed.as_nanos() / period.as_nanos().max(1);
    u64::try_from(due).unwrap_or(u64::MAX)
}

impl SamplingWorker {
    pub fn new(
        link: Box<dyn SensorTransport>,
        params: CalibrationParameters,
        config: SamplingConfig,
        tx: broadcast::Sender<AcquisitionEvent>,
        shutdown: Arc<AtomicBool>,
        state: Arc<AtomicU8>,
    ) -> Self {
        Self {
            link,
            params,
            config,
            tx,
            shutdown,
            state,
        }
    }

    pub fn run(mut self) -> WorkerExit {
        let start = Instant::now();
        let period = self.config.period;
        let max_failures = self.config.max_consecutive_failures;

        let mut summary = RunSummary::default();
        let mut tick: u64 = 0;
        let mut sequence: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        let reason = loop {
            if self.stop_requested() {
                break StopReason::Requested;
            }
            if let Some(limit) = self.config.sample_limit {
                if summary.samples_emitted >= limit {
                    break StopReason::SampleLimitReached;
                }
            }
            if !self.wait_until(start + deadline_offset(period, tick)) {
                break StopReason::Requested;
            }

            summary.ticks += 1;
            match self.link.request_raw_reading() {
                Ok(bytes) => {
                    consecutive_failures = 0;
                    let raw = decode(bytes);
                    let timestamp = Instant::now();
                    let sample = CalibratedSample {
                        sequence,
                        timestamp,
                        elapsed: timestamp.saturating_duration_since(start),
                        wall_time: Utc::now(),
                        raw,
                        value: self.params.apply(raw),
                    };
                    sequence += 1;
                    summary.samples_emitted += 1;
                    self.publish(AcquisitionEvent::Sample(sample));
                }
                Err(error) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    if consecutive_failures > max_failures {
                        log_link_error(&error, "SamplingWorker::run");
                        warn!(
                            "[SamplingWorker] Tick {}: {} consecutive failures, giving up",
                            tick, consecutive_failures
                        );
                        break StopReason::LinkLost {
                            consecutive_failures,
                            last_error: error,
                        };
                    }
                    debug!(
                        "[SamplingWorker] Tick {}: tolerated failure {}/{} ({})",
                        tick, consecutive_failures, max_failures, error
                    );
                    summary.faults += 1;
                    self.publish(AcquisitionEvent::Fault(AcquisitionFault {
                        tick,
                        consecutive_failures,
                        error,
                    }));
                }
            }

            // Skip deadlines we are a whole period or more behind on
            let mut next = tick + 1;
            let due = due_tick(period, start.elapsed());
            if due > next {
                let missed = due - next;
                summary.missed_deadlines += missed;
                debug!(
                    "[SamplingWorker] Behind schedule, skipping {} deadline(s) after tick {}",
                    missed, tick
                );
                next = due;
            }
            tick = next;
        };

        self.state.store(LoopState::Stopped as u8, Ordering::Release);
        self.publish(AcquisitionEvent::Stopped(reason.clone()));
        summary.reason = reason;

        info!(
            "[SamplingWorker] Run ended ({}): ticks={}, samples={}, faults={}, missed={}",
            summary.reason,
            summary.ticks,
            summary.samples_emitted,
            summary.faults,
            summary.missed_deadlines
        );

        WorkerExit {
            link: self.link,
            summary,
        }
    }

    fn stop_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Sleep until `deadline`; false if a stop was requested meanwhile
    fn wait_until(&self, deadline: Instant) -> bool {
        loop {
            if self.stop_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::park_timeout(deadline - now);
        }
    }

    fn publish(&self, event: AcquisitionEvent) {
        // Err only means no consumer is subscribed
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_offset() {
        let period = Duration::from_millis(10);
        assert_eq!(deadline_offset(period, 0), Duration::ZERO);
        assert_eq!(deadline_offset(period, 7), Duration::from_millis(70));
        assert_eq!(
            deadline_offset(Duration::from_secs(1), u64::MAX),
            Duration::from_nanos(u64::MAX)
        );
    }

    #[test]
    fn test_due_tick() {
        let period = Duration::from_millis(10);
        assert_eq!(due_tick(period, Duration::from_millis(9)), 0);
        assert_eq!(due_tick(period, Duration::from_millis(10)), 1);
        assert_eq!(due_tick(period, Duration::from_millis(35)), 3);
    }
}
