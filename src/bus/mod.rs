//! Byte-level access to the shared two-wire bus.
//!
//! The bus is a contended resource, so transports never keep it open between
//! operations: each call acquires a handle, performs one transfer and releases
//! it again before returning.

pub mod i2c;
pub mod simulated;

pub use i2c::{OpenBus, ScopedI2cBus};
pub use simulated::{BusEvent, Fault, SimulatedBus};

#[cfg(feature = "linux-i2c")]
pub use i2c::LinuxI2c;

use crate::error::{Result, SensorError};
use crate::sensors::command::SAMPLE_LEN;

/// Single-operation access to a device on the bus.
pub trait BusTransport {
    /// Send one command byte to `address`.
    fn write_byte(&mut self, address: u8, opcode: u8) -> Result<()>;

    /// Read `count` bytes from `address`.
    ///
    /// Fails with [`SensorError::Data`] when fewer than two bytes come back.
    fn read_bytes(&mut self, address: u8, count: usize) -> Result<Vec<u8>>;
}

impl<T: BusTransport + ?Sized> BusTransport for &mut T {
    fn write_byte(&mut self, address: u8, opcode: u8) -> Result<()> {
        (**self).write_byte(address, opcode)
    }

    fn read_bytes(&mut self, address: u8, count: usize) -> Result<Vec<u8>> {
        (**self).read_bytes(address, count)
    }
}

impl<T: BusTransport + ?Sized> BusTransport for Box<T> {
    fn write_byte(&mut self, address: u8, opcode: u8) -> Result<()> {
        (**self).write_byte(address, opcode)
    }

    fn read_bytes(&mut self, address: u8, count: usize) -> Result<Vec<u8>> {
        (**self).read_bytes(address, count)
    }
}

/// Reject responses too short to hold a 16-bit sample.
pub(crate) fn ensure_sample_len(address: u8, data: &[u8]) -> Result<()> {
    if data.len() < SAMPLE_LEN {
        return Err(SensorError::data(format!(
            "incomplete data received from 0x{:02X}: expected at least {} bytes, got {}",
            address,
            SAMPLE_LEN,
            data.len()
        )));
    }
    Ok(())
}
