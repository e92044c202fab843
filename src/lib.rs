// Load Cell DAQ Core - serial force-sensor acquisition
// Calibrated, deadline-scheduled sampling with bounded fan-out to consumers

// Module declarations
pub mod calibration;
pub mod config;
pub mod decoder;
pub mod error;
pub mod link;
pub mod sampling;
pub mod session;
pub mod testing;

// Re-exports for convenience
pub use calibration::{CalibrationParameters, Calibrator, ReferencePoint};
pub use decoder::{decode, encode, RawSample};
pub use link::{SensorTransport, SerialLink, SimulatedLink};
pub use sampling::{
    AcquisitionFault, CalibratedSample, LoopState, RunSummary, SampleConsumer, SamplingConfig,
    SamplingLoop, StopReason,
};

use tracing_subscriber::filter::LevelFilter;

/// Install the fmt subscriber on stderr
///
/// `verbosity` counts `-v` flags: 0 = warn, 1 = info, 2 = debug, 3+ = trace.
/// Calling it more than once is harmless.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
