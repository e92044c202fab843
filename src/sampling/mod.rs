// Sampling module - deadline-scheduled periodic acquisition
//
// Architecture:
// - SamplingWorker: named thread that owns the transport for one run and
//   performs request -> decode -> calibrate on every tick
// - Dispatchers: one thread per consumer, fed by a bounded tokio broadcast
//   channel (a lagging consumer loses its oldest events, acquisition never
//   waits on it)
// - SamplingLoop: owner-facing handle with the Idle -> Running -> Stopped
//   state machine

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::info;

use crate::calibration::Calibrator;
use crate::decoder::RawSample;
use crate::error::{log_acquisition_error, AcquisitionError, LinkError};
use crate::link::SensorTransport;

mod dispatcher;
mod worker;


use worker::{SamplingWorker, WorkerExit};

/// Upper bound accepted for `queue_capacity`
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Sampling loop configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Fixed tick period
    pub period: Duration,
    /// Consecutive transport failures tolerated before the run stops (K)
    pub max_consecutive_failures: u32,
    /// Per-consumer queue depth before the oldest events are dropped
    pub queue_capacity: usize,
    /// Optional number of samples after which the run ends on its own
    pub sample_limit: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            max_consecutive_failures: 3,
            queue_capacity: 256,
            sample_limit: None,
        }
    }
}

impl SamplingConfig {
    /// Default configuration with the period derived from a rate in Hz
    pub fn from_rate_hz(rate_hz: f64) -> Result<Self, AcquisitionError> {
        if !rate_hz.is_finite() || rate_hz <= 0.0 {
            return Err(AcquisitionError::InvalidConfig {
                reason: format!("sample rate must be positive, got {}", rate_hz),
            });
        }
        let period = Duration::try_from_secs_f64(1.0 / rate_hz).map_err(|e| {
            AcquisitionError::InvalidConfig {
                reason: format!("sample rate {} Hz gives no usable period: {}", rate_hz, e),
            }
        })?;
        let config = Self {
            period,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_sample_limit(mut self, limit: Option<u64>) -> Self {
        self.sample_limit = limit;
        self
    }

    pub fn validate(&self) -> Result<(), AcquisitionError> {
        if self.period.is_zero() {
            return Err(AcquisitionError::InvalidConfig {
                reason: "period must be non-zero".to_string(),
            });
        }
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(AcquisitionError::InvalidConfig {
                reason: format!(
                    "queue_capacity must be in 1..={}, got {}",
                    MAX_QUEUE_CAPACITY, self.queue_capacity
                ),
            });
        }
        Ok(())
    }
}

/// One calibrated reading produced by a successful tick
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedSample {
    /// Gap-free index within the run, starting at 0
    pub sequence: u64,
    pub timestamp: Instant,
    /// Time since the run started
    pub elapsed: Duration,
    pub wall_time: DateTime<Utc>,
    pub raw: RawSample,
    pub value: f64,
}

/// A tolerated transport failure
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionFault {
    pub tick: u64,
    pub consecutive_failures: u32,
    pub error: LinkError,
}

/// Why a run ended
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StopReason {
    #[default]
    Requested,
    SampleLimitReached,
    LinkLost {
        consecutive_failures: u32,
        last_error: LinkError,
    },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => write!(f, "stop requested"),
            StopReason::SampleLimitReached => write!(f, "sample limit reached"),
            StopReason::LinkLost {
                consecutive_failures,
                last_error,
            } => write!(
                f,
                "link lost after {} consecutive failures ({})",
                consecutive_failures, last_error
            ),
        }
    }
}

/// Counters for a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Ticks attempted (successful and failed)
    pub ticks: u64,
    pub samples_emitted: u64,
    /// Tolerated failures reported through `on_fault`
    pub faults: u64,
    /// Deadlines skipped because the loop fell a whole period behind
    pub missed_deadlines: u64,
    pub reason: StopReason,
}

/// Events carried from the acquisition thread to the dispatchers
#[derive(Debug, Clone)]
pub enum AcquisitionEvent {
    Sample(CalibratedSample),
    Fault(AcquisitionFault),
    Stopped(StopReason),
}

/// Observer of a sampling run
///
/// Each consumer runs on its own dispatcher thread, so callbacks may block
/// without delaying acquisition. `on_stopped` is delivered exactly once.
pub trait SampleConsumer: Send {
    fn on_sample(&mut self, sample: &CalibratedSample);

    fn on_fault(&mut self, _fault: &AcquisitionFault) {}

    fn on_stopped(&mut self, _reason: &StopReason) {}

    /// Label used in dispatcher logs and thread names
    fn name(&self) -> &str {
        "consumer"
    }
}

/// Sampling loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Idle = 0,
    Running = 1,
    Stopped = 2,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LoopState::Idle,
            1 => LoopState::Running,
            _ => LoopState::Stopped,
        }
    }
}

/// Owner handle for periodic acquisition over one transport
pub struct SamplingLoop {
    link: Option<Box<dyn SensorTransport>>,
    config: SamplingConfig,
    state: Arc<AtomicU8>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<WorkerExit>>,
    dispatchers: Vec<JoinHandle<()>>,
    summary: Option<RunSummary>,
    outcome: Option<Result<RunSummary, AcquisitionError>>,
}

impl SamplingLoop {
    pub fn new(link: Box<dyn SensorTransport>, config: SamplingConfig) -> Self {
        Self {
            link: Some(link),
            config,
            state: Arc::new(AtomicU8::new(LoopState::Idle as u8)),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
            dispatchers: Vec::new(),
            summary: None,
            outcome: None,
        }
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Counters of the finished run, including one that ended in `LinkLost`
    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    /// Begin acquisition
    ///
    /// Calibration parameters are snapshotted; later changes to `calibrator`
    /// do not affect this run.
    ///
    /// # Errors
    /// - `Calibration` if the calibrator is incomplete
    /// - `AlreadyStarted` unless the loop is idle
    /// - `InvalidConfig` for a zero period or queue capacity
    /// - `SpawnFailed` if a thread cannot be created
    pub fn start(
        &mut self,
        calibrator: &Calibrator,
        consumers: Vec<Box<dyn SampleConsumer>>,
    ) -> Result<(), AcquisitionError> {
        if self.state() != LoopState::Idle {
            return Err(AcquisitionError::AlreadyStarted);
        }
        let params = calibrator.parameters()?;
        self.config.validate()?;
        let link = self.link.take().ok_or(AcquisitionError::LinkUnavailable)?;

        let (tx, _) = broadcast::channel(self.config.queue_capacity);

        // Subscribe every consumer before the first tick so none misses a sample
        let mut dispatchers = Vec::with_capacity(consumers.len());
        for (index, consumer) in consumers.into_iter().enumerate() {
            match dispatcher::spawn_dispatcher(index, tx.subscribe(), consumer) {
                Ok(handle) => dispatchers.push(handle),
                Err(e) => {
                    self.link = Some(link);
                    dispatcher::release_dispatchers(tx, dispatchers);
                    return Err(AcquisitionError::SpawnFailed {
                        reason: e.to_string(),
                    });
                }
            }
        }

        let description = link.describe();
        let worker = SamplingWorker::new(
            link,
            params,
            self.config.clone(),
            tx,
            Arc::clone(&self.shutdown),
            Arc::clone(&self.state),
        );

        self.state.store(LoopState::Running as u8, Ordering::Release);
        let handle = match thread::Builder::new()
            .name("loadcell-sampling".to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                // The worker (and the link) was dropped with the closure
                self.state.store(LoopState::Stopped as u8, Ordering::Release);
                self.dispatchers = dispatchers;
                let err = AcquisitionError::SpawnFailed {
                    reason: e.to_string(),
                };
                self.join_dispatchers();
                self.outcome = Some(Err(err.clone()));
                return Err(err);
            }
        };

        info!(
            "[SamplingLoop] Started on {} (period {:?}, K={}, {} consumers)",
            description,
            self.config.period,
            self.config.max_consecutive_failures,
            dispatchers.len()
        );

        self.worker = Some(handle);
        self.dispatchers = dispatchers;
        Ok(())
    }

    /// Request a cooperative stop and return the run outcome
    ///
    /// The in-flight read completes before the worker honours the request.
    /// Idempotent: from `Idle` this is a no-op returning an empty summary,
    /// from `Stopped` it returns the cached outcome.
    pub fn stop(&mut self) -> Result<RunSummary, AcquisitionError> {
        if self.state() == LoopState::Idle {
            return Ok(RunSummary::default());
        }
        if let Some(worker) = &self.worker {
            self.shutdown.store(true, Ordering::Release);
            worker.thread().unpark();
        }
        self.finish()
    }

    /// Block until the run ends on its own (sample limit or link loss)
    pub fn wait(&mut self) -> Result<RunSummary, AcquisitionError> {
        if self.state() == LoopState::Idle {
            return Ok(RunSummary::default());
        }
        self.finish()
    }

    /// Hand the transport back, stopping the run first if needed
    ///
    /// A run that already ended on its own still holds the link in its
    /// worker; it is joined here.
    pub fn into_link(mut self) -> Option<Box<dyn SensorTransport>> {
        if self.worker.is_some() {
            let _ = self.stop();
        }
        self.link.take()
    }

    fn finish(&mut self) -> Result<RunSummary, AcquisitionError> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let outcome = match self.worker.take() {
            Some(handle) => match handle.join() {
                Ok(exit) => {
                    self.link = Some(exit.link);
                    let summary = exit.summary;
                    self.summary = Some(summary.clone());
                    match &summary.reason {
                        StopReason::LinkLost {
                            consecutive_failures,
                            last_error,
                        } => Err(AcquisitionError::LinkLost {
                            consecutive_failures: *consecutive_failures,
                            last_error: last_error.clone(),
                        }),
                        _ => Ok(summary),
                    }
                }
                Err(_) => Err(AcquisitionError::WorkerPanicked),
            },
            None => Err(AcquisitionError::WorkerPanicked),
        };

        self.join_dispatchers();
        self.state.store(LoopState::Stopped as u8, Ordering::Release);

        if let Err(err) = &outcome {
            log_acquisition_error(err, "SamplingLoop::finish");
        }
        self.outcome = Some(outcome.clone());
        outcome
    }

    fn join_dispatchers(&mut self) {
        for handle in self.dispatchers.drain(..) {
            dispatcher::join_dispatcher(handle);
        }
    }
}

impl Drop for SamplingLoop {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop();
        }
    }
}
