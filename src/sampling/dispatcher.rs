// Consumer dispatch threads
//
// Each consumer drains its own broadcast receiver. When the receiver lags
// the channel has already dropped the oldest events; we only count them.

use std::io;
use std::thread::{self, JoinHandle};

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::{AcquisitionEvent, SampleConsumer, StopReason};

pub(super) fn spawn_dispatcher(
    index: usize,
    rx: broadcast::Receiver<AcquisitionEvent>,
    consumer: Box<dyn SampleConsumer>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("loadcell-consumer-{}", index))
        .spawn(move || {
            run_dispatcher(rx, consumer);
        })
}

/// Wait for a dispatcher thread, logging if its consumer panicked
pub(super) fn join_dispatcher(handle: JoinHandle<()>) {
    let name = handle.thread().name().unwrap_or("dispatcher").to_string();
    if handle.join().is_err() {
        warn!("[Dispatcher] Consumer thread {} panicked", name);
    }
}

/// Close the channel of a run that never started and join its dispatchers
///
/// Each consumer still receives `on_stopped`.
pub(super) fn release_dispatchers(
    tx: broadcast::Sender<AcquisitionEvent>,
    handles: Vec<JoinHandle<()>>,
) {
    drop(tx);
    for handle in handles {
        join_dispatcher(handle);
    }
}

/// Deliver events until the run stops; returns the number of dropped events
pub(super) fn run_dispatcher(
    mut rx: broadcast::Receiver<AcquisitionEvent>,
    mut consumer: Box<dyn SampleConsumer>,
) -> u64 {
    let mut dropped: u64 = 0;
    let mut stopped = false;

    loop {
        match rx.blocking_recv() {
            Ok(AcquisitionEvent::Sample(sample)) => consumer.on_sample(&sample),
            Ok(AcquisitionEvent::Fault(fault)) => consumer.on_fault(&fault),
            Ok(AcquisitionEvent::Stopped(reason)) => {
                stopped = true;
                consumer.on_stopped(&reason);
                break;
            }
            Err(RecvError::Lagged(count)) => {
                dropped += count;
                warn!(
                    "[Dispatcher] {} lagging, dropped {} oldest events ({} total)",
                    consumer.name(),
                    count,
                    dropped
                );
            }
            Err(RecvError::Closed) => break,
        }
    }

    // Sender gone without a Stopped event (worker never ran or panicked)
    if !stopped {
        consumer.on_stopped(&StopReason::Requested);
    }

    debug!(
        "[Dispatcher] {} finished, {} events dropped",
        consumer.name(),
        dropped
    );
    dropped
}
