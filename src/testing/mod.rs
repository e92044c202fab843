//! Shared helpers for exercising the sampling loop in tests and demos.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::sampling::{
    AcquisitionEvent, AcquisitionFault, CalibratedSample, SampleConsumer, StopReason,
};

/// Recorded events, shared between a consumer and the test that owns it
#[derive(Debug, Clone, Default)]
pub struct CollectedEvents {
    events: Arc<Mutex<Vec<AcquisitionEvent>>>,
}

impl CollectedEvents {
    fn push(&self, event: AcquisitionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<AcquisitionEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn samples(&self) -> Vec<CalibratedSample> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                AcquisitionEvent::Sample(sample) => Some(sample),
                _ => None,
            })
            .collect()
    }

    pub fn faults(&self) -> Vec<AcquisitionFault> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                AcquisitionEvent::Fault(fault) => Some(fault),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<StopReason> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                AcquisitionEvent::Stopped(reason) => Some(reason),
                _ => None,
            })
            .collect()
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.samples().iter().map(|s| s.sequence).collect()
    }
}

/// Consumer that records every callback, optionally sleeping per sample
pub struct CollectingConsumer {
    name: String,
    collected: CollectedEvents,
    delay: Duration,
}

impl CollectingConsumer {
    pub fn new() -> Self {
        Self {
            name: "collector".to_string(),
            collected: CollectedEvents::default(),
            delay: Duration::ZERO,
        }
    }

    /// Simulate a slow display or disk by sleeping in `on_sample`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn handle(&self) -> CollectedEvents {
        self.collected.clone()
    }
}

impl Default for CollectingConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleConsumer for CollectingConsumer {
    fn on_sample(&mut self, sample: &CalibratedSample) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.collected
            .push(AcquisitionEvent::Sample(sample.clone()));
    }

    fn on_fault(&mut self, fault: &AcquisitionFault) {
        self.collected.push(AcquisitionEvent::Fault(fault.clone()));
    }

    fn on_stopped(&mut self, reason: &StopReason) {
        self.collected
            .push(AcquisitionEvent::Stopped(reason.clone()));
    }

    fn name(&self) -> &str {
        &self.name
    }
}
