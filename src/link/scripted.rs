//! Scripted transport that replays a fixed sequence of readings and failures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::SensorTransport;
use crate::decoder::{encode, RawSample, RESPONSE_LEN};
use crate::error::LinkError;

/// One scripted response
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Reading(RawSample),
    Fail(LinkError),
}

/// Replays [`ScriptStep`]s in order
///
/// Once the script is exhausted the link answers with the fallback reading if
/// one was set, otherwise with `LinkError::Closed`.
pub struct ScriptedLink {
    steps: VecDeque<ScriptStep>,
    fallback: Option<RawSample>,
    delay: Duration,
    requests: Arc<AtomicU64>,
    open: bool,
}

impl ScriptedLink {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            fallback: None,
            delay: Duration::ZERO,
            requests: Arc::new(AtomicU64::new(0)),
            open: true,
        }
    }

    /// Script of plain readings; values are clamped into the 24-bit range
    pub fn readings(values: impl IntoIterator<Item = i32>) -> Self {
        Self::new(
            values
                .into_iter()
                .map(|v| ScriptStep::Reading(RawSample::saturating(v as i64))),
        )
    }

    /// Empty script answering every request with `value`
    pub fn constant(value: i32) -> Self {
        Self::new(std::iter::empty()).with_fallback(value)
    }

    pub fn then_readings(mut self, values: impl IntoIterator<Item = i32>) -> Self {
        self.steps.extend(
            values
                .into_iter()
                .map(|v| ScriptStep::Reading(RawSample::saturating(v as i64))),
        );
        self
    }

    pub fn then_fail(mut self, count: usize, error: LinkError) -> Self {
        self.steps
            .extend(std::iter::repeat(ScriptStep::Fail(error)).take(count));
        self
    }

    pub fn with_fallback(mut self, value: i32) -> Self {
        self.fallback = Some(RawSample::saturating(value as i64));
        self
    }

    /// Sleep before every response, simulating device turnaround
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared counter of read requests, usable after the link is moved away
    pub fn request_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.requests)
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl SensorTransport for ScriptedLink {
    fn request_raw_reading(&mut self) -> Result<[u8; RESPONSE_LEN], LinkError> {
        if !self.open {
            return Err(LinkError::Closed);
        }
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        match self.steps.pop_front() {
            Some(ScriptStep::Reading(sample)) => Ok(encode(sample)),
            Some(ScriptStep::Fail(err)) => Err(err),
            None => self.fallback.map(encode).ok_or(LinkError::Closed),
        }
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> String {
        format!("scripted({} steps left)", self.steps.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;

    #[test]
    fn test_replays_in_order_then_fallback() {
        let mut link = ScriptedLink::readings([1, -2])
            .then_fail(1, LinkError::Timeout { received: 1 })
            .with_fallback(7);
        let counter = link.request_counter();

        assert_eq!(decode(link.request_raw_reading().unwrap()).value(), 1);
        assert_eq!(decode(link.request_raw_reading().unwrap()).value(), -2);
        assert_eq!(
            link.request_raw_reading().unwrap_err(),
            LinkError::Timeout { received: 1 }
        );
        assert_eq!(decode(link.request_raw_reading().unwrap()).value(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_exhausted_without_fallback_is_closed() {
        let mut link = ScriptedLink::readings([]);
        assert_eq!(link.request_raw_reading().unwrap_err(), LinkError::Closed);
    }
}
