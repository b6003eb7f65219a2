//! SHT20 command set and raw sample decoding.
//!
//! The sensor answers a no-hold trigger with three bytes: a big-endian 16-bit
//! sample followed by a CRC byte. The two lowest bits of the sample are status
//! flags and are cleared before conversion.

use std::time::Duration;
use strum::FromRepr;

/// Fixed 7-bit I2C address of the SHT20.
pub const SHT20_ADDRESS: u8 = 0x40;

/// Bytes returned for every measurement (2 data + 1 checksum).
pub const RESPONSE_LEN: usize = 3;

/// Minimum number of bytes needed to form a sample.
pub const SAMPLE_LEN: usize = 2;

/// Mask clearing the two status bits of a raw sample.
pub const STATUS_MASK: u16 = 0xFFFC;

/// Commands understood by the sensor, tagged with their opcode.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, FromRepr)]
#[repr(u8)]
pub enum Command {
    /// Soft reset
    Reset = 0xFE,
    /// Trigger temperature measurement, no-hold master
    TriggerTemperature = 0xF3,
    /// Trigger humidity measurement, no-hold master
    TriggerHumidity = 0xF5,
}

impl Command {
    pub fn opcode(self) -> u8 {
        self as u8
    }

    /// Time the device needs after this command before it can be read
    /// (or addressed again, for a reset).
    pub fn settle_time(self) -> Duration {
        match self {
            Self::Reset => Duration::from_millis(50),
            Self::TriggerTemperature => Duration::from_millis(85),
            Self::TriggerHumidity => Duration::from_millis(30),
        }
    }

    pub fn is_measurement(self) -> bool {
        !matches!(self, Self::Reset)
    }

    /// Convert a masked raw sample to the physical quantity this command measures.
    ///
    /// Returns `None` for [`Command::Reset`], which produces no sample.
    pub fn convert(self, sample: RawSample) -> Option<f64> {
        match self {
            Self::Reset => None,
            Self::TriggerTemperature => Some(sample.celsius()),
            Self::TriggerHumidity => Some(sample.relative_humidity()),
        }
    }
}

/// 16-bit sample as read from the sensor, status bits already cleared.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RawSample(u16);

impl RawSample {
    /// Build a sample from a raw register value, clearing the status bits.
    pub fn new(raw: u16) -> Self {
        Self(raw & STATUS_MASK)
    }

    /// Decode the first two bytes of a response (big-endian).
    ///
    /// Any trailing bytes (the checksum) are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [msb, lsb, ..] => Some(Self::new(((*msb as u16) << 8) + *lsb as u16)),
            _ => None,
        }
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// Temperature in degrees Celsius, rounded to 2 decimals.
    pub fn celsius(self) -> f64 {
        round2(-46.85 + 175.72 * self.0 as f64 / 65536.0)
    }

    /// Relative humidity in percent, rounded to 2 decimals.
    pub fn relative_humidity(self) -> f64 {
        round2(-6.0 + 125.0 * self.0 as f64 / 65536.0)
    }

    /// Inverse of [`RawSample::celsius`], used by the simulated sensor.
    pub fn from_celsius(celsius: f64) -> Self {
        Self::new(to_register((celsius + 46.85) * 65536.0 / 175.72))
    }

    /// Inverse of [`RawSample::relative_humidity`], used by the simulated sensor.
    pub fn from_relative_humidity(percent: f64) -> Self {
        Self::new(to_register((percent + 6.0) * 65536.0 / 125.0))
    }
}

fn to_register(value: f64) -> u16 {
    value.round().clamp(0.0, u16::MAX as f64) as u16
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
