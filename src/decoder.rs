//! Raw sample decoding for the load-cell ADC protocol.
//!
//! The amplifier answers every read command with a 24-bit signed reading
//! packed as three big-endian two's-complement bytes.

use serde::{Deserialize, Serialize};

/// Number of payload bytes in one device response
pub const RESPONSE_LEN: usize = 3;

const MAGNITUDE_MASK: u32 = 0x00FF_FFFF;
const SIGN_BIT: u32 = 0x0080_0000;

/// Unconverted 24-bit signed ADC reading
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i32", into = "i32")]
pub struct RawSample(i32);

impl RawSample {
    /// Smallest representable reading (-2^23)
    pub const MIN: i32 = -(1 << 23);
    /// Largest representable reading (2^23 - 1)
    pub const MAX: i32 = (1 << 23) - 1;

    /// Range-checked constructor; `None` outside the 24-bit range
    pub fn new(value: i32) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Clamp an arbitrary value into the 24-bit range
    pub fn saturating(value: i64) -> Self {
        Self(value.clamp(Self::MIN as i64, Self::MAX as i64) as i32)
    }

    pub const fn value(self) -> i32 {
        self.0
    }
}

impl From<RawSample> for i32 {
    fn from(sample: RawSample) -> Self {
        sample.0
    }
}

impl From<RawSample> for f64 {
    fn from(sample: RawSample) -> Self {
        sample.0 as f64
    }
}

impl TryFrom<i32> for RawSample {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        RawSample::new(value).ok_or_else(|| format!("{} outside 24-bit range", value))
    }
}

impl std::fmt::Display for RawSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decode a 3-byte big-endian two's-complement payload
///
/// Total: every 3-byte pattern is a valid 24-bit reading.
pub fn decode(bytes: [u8; RESPONSE_LEN]) -> RawSample {
    let magnitude = (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2]);
    if magnitude & SIGN_BIT != 0 {
        RawSample(-(((magnitude ^ MAGNITUDE_MASK) + 1) as i32))
    } else {
        RawSample(magnitude as i32)
    }
}

/// Pack a reading into the device wire format (inverse of [`decode`])
pub fn encode(sample: RawSample) -> [u8; RESPONSE_LEN] {
    let packed = (sample.0 as u32) & MAGNITUDE_MASK;
    [(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]
}
