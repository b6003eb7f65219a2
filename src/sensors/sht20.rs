//! SHT20 protocol driver.
//!
//! Measurements use the no-hold mode: the trigger is written, the bus is
//! released while the sensor converts, and the result is read after a fixed
//! settle time. The driver never polls for completion and never retries;
//! recovery is up to the caller.

use super::command::{Command, RESPONSE_LEN, RawSample, SHT20_ADDRESS};
use super::reading::Reading;
use crate::bus::BusTransport;
use crate::error::{Result, SensorError};
use log::debug;
use tokio::time::sleep;

/// SHT20 temperature/humidity sensor on a [`BusTransport`].
pub struct Sht20<B> {
    bus: B,
    address: u8,
}

impl<B: BusTransport> Sht20<B> {
    /// Create a driver for a sensor at the standard address.
    pub fn new(bus: B) -> Self {
        Self::with_address(bus, SHT20_ADDRESS)
    }

    pub fn with_address(bus: B, address: u8) -> Self {
        Self { bus, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Soft-reset the sensor and wait until it accepts commands again.
    pub async fn reset(&mut self) -> Result<()> {
        self.bus.write_byte(self.address, Command::Reset.opcode())?;
        sleep(Command::Reset.settle_time()).await;
        debug!("SHT20 at 0x{:02X} reset", self.address);
        Ok(())
    }

    /// Trigger one measurement and convert the result.
    ///
    /// Returns degrees Celsius for [`Command::TriggerTemperature`] and percent
    /// relative humidity for [`Command::TriggerHumidity`].
    pub async fn measure(&mut self, command: Command) -> Result<f64> {
        if !command.is_measurement() {
            return Err(SensorError::data(format!(
                "{:?} does not produce a measurement",
                command
            )));
        }

        self.bus.write_byte(self.address, command.opcode())?;
        sleep(command.settle_time()).await;

        let data = self.bus.read_bytes(self.address, RESPONSE_LEN)?;
        let sample = RawSample::from_bytes(&data).ok_or_else(|| {
            SensorError::data(format!(
                "incomplete data received: expected at least 2 bytes, got {}",
                data.len()
            ))
        })?;

        let value = command
            .convert(sample)
            .ok_or_else(|| SensorError::data(format!("{:?} has no conversion", command)))?;
        debug!(
            "SHT20 {:?}: raw=0x{:04X} value={:.2}",
            command,
            sample.value(),
            value
        );
        Ok(value)
    }

    /// Measure temperature, then humidity.
    pub async fn read(&mut self) -> Result<Reading> {
        let temperature = self.measure(Command::TriggerTemperature).await?;
        let humidity = self.measure(Command::TriggerHumidity).await?;
        Ok(Reading::new(temperature, humidity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusEvent, Fault, SimulatedBus};
    use tokio::time::{Duration, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_reset_writes_opcode_and_waits() {
        let bus = SimulatedBus::new(20.0, 50.0);
        let mut sensor = Sht20::new(bus.clone());

        let start = Instant::now();
        sensor.reset().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(
            bus.events(),
            vec![BusEvent::Write {
                address: 0x40,
                opcode: 0xFE
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_temperature() {
        let bus = SimulatedBus::new(23.4, 50.0);
        let mut sensor = Sht20::new(bus.clone());

        let start = Instant::now();
        let temperature = sensor.measure(Command::TriggerTemperature).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(85));
        assert!((temperature - 23.4).abs() < 0.02, "got {temperature}");
        assert_eq!(
            bus.events(),
            vec![
                BusEvent::Write {
                    address: 0x40,
                    opcode: 0xF3
                },
                BusEvent::Read {
                    address: 0x40,
                    count: 3
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_is_sequential() {
        let bus = SimulatedBus::new(19.0, 62.5);
        let mut sensor = Sht20::new(bus.clone());

        let reading = sensor.read().await.unwrap();
        assert!((reading.temperature - 19.0).abs() < 0.02);
        assert!((reading.humidity - 62.5).abs() < 0.02);

        let opcodes: Vec<u8> = bus
            .events()
            .iter()
            .filter_map(|e| match e {
                BusEvent::Write { opcode, .. } => Some(*opcode),
                BusEvent::Read { .. } => None,
            })
            .collect();
        assert_eq!(opcodes, vec![0xF3, 0xF5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_read_is_data_error() {
        let bus = SimulatedBus::new(20.0, 50.0);
        bus.inject(Command::TriggerHumidity, Fault::ShortRead);
        let mut sensor = Sht20::new(bus);

        let err = sensor.measure(Command::TriggerHumidity).await.unwrap_err();
        assert!(err.is_data());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_trigger_skips_read() {
        let bus = SimulatedBus::new(20.0, 50.0);
        bus.inject(Command::TriggerTemperature, Fault::WriteRejected);
        let mut sensor = Sht20::new(bus.clone());

        let err = sensor.read().await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(bus.reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_is_not_a_measurement() {
        let bus = SimulatedBus::new(20.0, 50.0);
        let mut sensor = Sht20::new(bus.clone());

        let err = sensor.measure(Command::Reset).await.unwrap_err();
        assert!(err.is_data());
        assert!(bus.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_address_fails_reset() {
        let bus = SimulatedBus::new(20.0, 50.0);
        let mut sensor = Sht20::with_address(bus, 0x41);
        assert!(sensor.reset().await.unwrap_err().is_transport());
    }
}
