//! In-memory SHT20 on a simulated bus.
//!
//! Answers the real command set with samples encoded from a configurable
//! environment, and lets callers inject one-shot faults or take the whole bus
//! offline. Clones share the same device, so a test can keep a handle for
//! inspection while the poller owns another.

use super::{BusTransport, ensure_sample_len};
use crate::error::{Result, SensorError};
use crate::sensors::command::{Command, RawSample, SHT20_ADDRESS};
use log::debug;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Status bit the sensor sets in humidity samples.
const HUMIDITY_STATUS_BIT: u16 = 0b10;

/// Fault applied to the next operation involving a given command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The command byte is not acknowledged.
    WriteRejected,
    /// The read following the trigger fails at the transport level.
    ReadRejected,
    /// The read following the trigger returns a single byte.
    ShortRead,
}

/// One recorded bus transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Write { address: u8, opcode: u8 },
    Read { address: u8, count: usize },
}

struct Device {
    address: u8,
    temperature: f64,
    humidity: f64,
    drift: bool,
    offline: bool,
    pending: Option<Command>,
    faults: HashMap<Command, VecDeque<Fault>>,
    events: Vec<BusEvent>,
}

impl Device {
    fn take_fault(&mut self, command: Command, matches: impl Fn(Fault) -> bool) -> Option<Fault> {
        let queue = self.faults.get_mut(&command)?;
        let position = queue.iter().position(|f| matches(*f))?;
        queue.remove(position)
    }

    fn apply_drift(&mut self) {
        let mut rng = rand::thread_rng();
        self.temperature += rng.gen_range(-0.1..=0.1);
        self.humidity = (self.humidity + rng.gen_range(-0.3..=0.3)).clamp(0.0, 100.0);
    }

    fn encode(&self, command: Command) -> [u8; 3] {
        let raw = match command {
            Command::TriggerHumidity => {
                RawSample::from_relative_humidity(self.humidity).value() | HUMIDITY_STATUS_BIT
            }
            _ => RawSample::from_celsius(self.temperature).value(),
        };
        let [msb, lsb] = raw.to_be_bytes();
        [msb, lsb, crc8(&[msb, lsb])]
    }
}

/// Simulated SHT20 reachable at [`SHT20_ADDRESS`].
#[derive(Clone)]
pub struct SimulatedBus {
    device: Arc<Mutex<Device>>,
}

impl SimulatedBus {
    /// Create a bus with one sensor reporting the given environment.
    pub fn new(temperature: f64, humidity: f64) -> Self {
        Self {
            device: Arc::new(Mutex::new(Device {
                address: SHT20_ADDRESS,
                temperature,
                humidity,
                drift: false,
                offline: false,
                pending: None,
                faults: HashMap::new(),
                events: Vec::new(),
            })),
        }
    }

    /// Let the environment wander slightly on every temperature trigger.
    pub fn with_drift(self) -> Self {
        self.device.lock().drift = true;
        self
    }

    pub fn set_environment(&self, temperature: f64, humidity: f64) {
        let mut device = self.device.lock();
        device.temperature = temperature;
        device.humidity = humidity;
    }

    /// Queue a one-shot fault for the next operation involving `command`.
    pub fn inject(&self, command: Command, fault: Fault) {
        self.device
            .lock()
            .faults
            .entry(command)
            .or_default()
            .push_back(fault);
    }

    /// Make every operation fail as if the adapter were gone.
    pub fn set_offline(&self, offline: bool) {
        self.device.lock().offline = offline;
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.device.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.device.lock().events.clear();
    }

    /// Number of times `command` was written to the bus, successful or not.
    pub fn writes_of(&self, command: Command) -> usize {
        let opcode = command.opcode();
        self.device
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, BusEvent::Write { opcode: o, .. } if *o == opcode))
            .count()
    }

    pub fn reads(&self) -> usize {
        self.device
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, BusEvent::Read { .. }))
            .count()
    }
}

impl BusTransport for SimulatedBus {
    fn write_byte(&mut self, address: u8, opcode: u8) -> Result<()> {
        let mut device = self.device.lock();
        device.events.push(BusEvent::Write { address, opcode });

        if device.offline {
            return Err(SensorError::transport("bus unavailable"));
        }
        if address != device.address {
            return Err(SensorError::transport(format!(
                "no acknowledge from 0x{:02X}",
                address
            )));
        }
        let command = Command::from_repr(opcode).ok_or_else(|| {
            SensorError::transport(format!("command 0x{:02X} not acknowledged", opcode))
        })?;
        if device
            .take_fault(command, |f| f == Fault::WriteRejected)
            .is_some()
        {
            device.pending = None;
            return Err(SensorError::transport(format!(
                "write of 0x{:02X} to 0x{:02X} rejected",
                opcode, address
            )));
        }

        if command.is_measurement() {
            if device.drift && command == Command::TriggerTemperature {
                device.apply_drift();
            }
            device.pending = Some(command);
        } else {
            device.pending = None;
        }
        debug!("[Sim] accepted {:?}", command);
        Ok(())
    }

    fn read_bytes(&mut self, address: u8, count: usize) -> Result<Vec<u8>> {
        let mut device = self.device.lock();
        device.events.push(BusEvent::Read { address, count });

        if device.offline {
            return Err(SensorError::transport("bus unavailable"));
        }
        let command = device.pending.take().ok_or_else(|| {
            SensorError::transport(format!("no measurement pending at 0x{:02X}", address))
        })?;

        let data = match device.take_fault(command, |f| f != Fault::WriteRejected) {
            Some(Fault::ReadRejected) => {
                return Err(SensorError::transport(format!(
                    "read of {} bytes from 0x{:02X} failed",
                    count, address
                )));
            }
            Some(Fault::ShortRead) => device.encode(command)[..1].to_vec(),
            _ => device.encode(command).iter().copied().take(count).collect(),
        };

        ensure_sample_len(address, &data)?;
        Ok(data)
    }
}

/// CRC-8 as computed by the sensor (polynomial 0x31, init 0x00).
fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}
