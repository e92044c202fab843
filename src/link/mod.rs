//! Transport layer for the load-cell amplifier.
//!
//! The [`SensorTransport`] trait is the seam between acquisition logic and the
//! physical device. [`SerialLink`] talks to real hardware; [`SimulatedLink`]
//! produces a deterministic synthetic signal for demos and CLI runs without a
//! device; [`ScriptedLink`] replays a fixed script for tests.

pub mod scripted;
pub mod serial;
pub mod simulated;

pub use scripted::{ScriptStep, ScriptedLink};
pub use serial::{available_ports, LinkConfig, SerialLink};
pub use simulated::{SimulatedLink, SimulatedProfile};

use crate::decoder::RESPONSE_LEN;
use crate::error::LinkError;

/// Single-byte ASCII read command understood by the device
pub const READ_COMMAND: u8 = b'R';

/// Byte-level request/response transport to the sensor
///
/// Implementations only frame and time out; they never retry. Retry policy
/// belongs to the sampling loop.
pub trait SensorTransport: Send {
    /// Send the read command and block until exactly 3 bytes arrive
    fn request_raw_reading(&mut self) -> Result<[u8; RESPONSE_LEN], LinkError>;

    /// Release the underlying handle. Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Human-readable identifier for logs
    fn describe(&self) -> String;
}

impl<T: SensorTransport + ?Sized> SensorTransport for Box<T> {
    fn request_raw_reading(&mut self) -> Result<[u8; RESPONSE_LEN], LinkError> {
        (**self).request_raw_reading()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
