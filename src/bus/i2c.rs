//! Scoped transport over any `embedded-hal` I2C implementation.

use super::{BusTransport, ensure_sample_len};
use crate::error::{Result, SensorError};
use embedded_hal::i2c::I2c;
use log::trace;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::block_in_place;

/// Opens a fresh handle to the bus.
///
/// The returned device is dropped at the end of every transport operation,
/// which is what releases the bus.
pub trait OpenBus {
    type Device: I2c;

    fn open(&self) -> Result<Self::Device>;
}

/// Transport that holds the bus only for the duration of one operation.
///
/// # Example
/// ```ignore
/// let mut bus = ScopedI2cBus::new(LinuxI2c::new("/dev/i2c-1"));
/// bus.write_byte(0x40, 0xFE)?;
/// ```
pub struct ScopedI2cBus<O> {
    opener: O,
}

impl<O: OpenBus> ScopedI2cBus<O> {
    pub fn new(opener: O) -> Self {
        Self { opener }
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }
}

/// Run a blocking transfer.
///
/// On a multi-threaded runtime the worker is handed over to the other tasks
/// for the duration of the call. A current-thread runtime has nothing to hand
/// over, so the transfer runs inline there.
fn blocking<T>(transfer: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            block_in_place(transfer)
        }
        _ => transfer(),
    }
}

impl<O: OpenBus> BusTransport for ScopedI2cBus<O> {
    fn write_byte(&mut self, address: u8, opcode: u8) -> Result<()> {
        let opener = &self.opener;
        blocking(|| {
            let mut device = opener.open()?;
            trace!("I2C write 0x{:02X} -> 0x{:02X}", opcode, address);
            device.write(address, &[opcode]).map_err(|e| {
                SensorError::transport(format!(
                    "write of 0x{:02X} to 0x{:02X} rejected: {:?}",
                    opcode, address, e
                ))
            })
        })
    }

    fn read_bytes(&mut self, address: u8, count: usize) -> Result<Vec<u8>> {
        let opener = &self.opener;
        let buffer = blocking(|| {
            let mut device = opener.open()?;
            let mut buffer = vec![0u8; count];
            device.read(address, &mut buffer).map_err(|e| {
                SensorError::transport(format!(
                    "read of {} bytes from 0x{:02X} failed: {:?}",
                    count, address, e
                ))
            })?;
            Ok::<_, SensorError>(buffer)
        })?;
        trace!("I2C read 0x{:02X} <- {:02X?}", address, buffer);
        ensure_sample_len(address, &buffer)?;
        Ok(buffer)
    }
}

/// Opener for a Linux `/dev/i2c-N` character device.
#[cfg(feature = "linux-i2c")]
#[derive(Debug, Clone)]
pub struct LinuxI2c {
    path: std::path::PathBuf,
}

#[cfg(feature = "linux-i2c")]
impl LinuxI2c {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(feature = "linux-i2c")]
impl OpenBus for LinuxI2c {
    type Device = linux_embedded_hal::I2cdev;

    fn open(&self) -> Result<Self::Device> {
        linux_embedded_hal::I2cdev::new(&self.path).map_err(|e| {
            SensorError::transport(format!("failed to open {}: {}", self.path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Shared {
        open_handles: AtomicUsize,
        opened_total: AtomicUsize,
        in_transfer: AtomicBool,
        written: Mutex<Vec<(u8, Vec<u8>)>>,
    }

    struct FakeDevice {
        shared: Arc<Shared>,
        response: Vec<u8>,
        nack: bool,
        delay: Duration,
    }

    impl Drop for FakeDevice {
        fn drop(&mut self) {
            self.shared.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl ErrorType for FakeDevice {
        type Error = ErrorKind;
    }

    impl I2c for FakeDevice {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> std::result::Result<(), Self::Error> {
            self.shared.in_transfer.store(true, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.shared.in_transfer.store(false, Ordering::SeqCst);
            if self.nack {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        self.shared.written.lock().push((address, bytes.to_vec()));
                    }
                    Operation::Read(buffer) => {
                        for (dst, src) in buffer.iter_mut().zip(self.response.iter()) {
                            *dst = *src;
                        }
                    }
                }
            }
            Ok(())
        }
    }

    struct FakeOpener {
        shared: Arc<Shared>,
        response: Vec<u8>,
        nack: bool,
        unavailable: bool,
        delay: Duration,
    }

    impl FakeOpener {
        fn new(response: &[u8]) -> Self {
            Self {
                shared: Arc::new(Shared::default()),
                response: response.to_vec(),
                nack: false,
                unavailable: false,
                delay: Duration::ZERO,
            }
        }
    }

    impl OpenBus for FakeOpener {
        type Device = FakeDevice;

        fn open(&self) -> Result<FakeDevice> {
            if self.unavailable {
                return Err(SensorError::transport("no such device"));
            }
            self.shared.open_handles.fetch_add(1, Ordering::SeqCst);
            self.shared.opened_total.fetch_add(1, Ordering::SeqCst);
            Ok(FakeDevice {
                shared: self.shared.clone(),
                response: self.response.clone(),
                nack: self.nack,
                delay: self.delay,
            })
        }
    }

    #[test]
    fn test_write_byte_opens_and_releases() {
        let mut bus = ScopedI2cBus::new(FakeOpener::new(&[]));
        bus.write_byte(0x40, 0xFE).unwrap();
        bus.write_byte(0x40, 0xF3).unwrap();

        let shared = &bus.opener().shared;
        assert_eq!(shared.open_handles.load(Ordering::SeqCst), 0);
        assert_eq!(shared.opened_total.load(Ordering::SeqCst), 2);
        assert_eq!(
            *shared.written.lock(),
            vec![(0x40, vec![0xFE]), (0x40, vec![0xF3])]
        );
    }

    #[test]
    fn test_read_bytes_returns_full_response() {
        let mut bus = ScopedI2cBus::new(FakeOpener::new(&[0x66, 0x67, 0x9A]));
        let data = bus.read_bytes(0x40, 3).unwrap();
        assert_eq!(data, vec![0x66, 0x67, 0x9A]);
        assert_eq!(bus.opener().shared.open_handles.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_nack_is_transport_error_and_releases_handle() {
        let mut opener = FakeOpener::new(&[0x00, 0x00, 0x00]);
        opener.nack = true;
        let mut bus = ScopedI2cBus::new(opener);

        let err = bus.write_byte(0x40, 0xF3).unwrap_err();
        assert!(err.is_transport());
        let err = bus.read_bytes(0x40, 3).unwrap_err();
        assert!(err.is_transport());

        assert_eq!(bus.opener().shared.open_handles.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unavailable_bus_is_transport_error() {
        let mut opener = FakeOpener::new(&[]);
        opener.unavailable = true;
        let mut bus = ScopedI2cBus::new(opener);

        assert!(bus.write_byte(0x40, 0xFE).unwrap_err().is_transport());
        assert_eq!(bus.opener().shared.opened_total.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_short_requested_read_is_data_error() {
        let mut bus = ScopedI2cBus::new(FakeOpener::new(&[0x66]));
        let err = bus.read_bytes(0x40, 1).unwrap_err();
        assert!(err.is_data());
        assert_eq!(bus.opener().shared.open_handles.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transfer_runs_inline_on_current_thread_runtime() {
        let mut bus = ScopedI2cBus::new(FakeOpener::new(&[0x66, 0x67, 0x9A]));
        bus.write_byte(0x40, 0xF3).unwrap();
        assert_eq!(bus.read_bytes(0x40, 3).unwrap(), vec![0x66, 0x67, 0x9A]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_slow_transfer_does_not_stall_other_tasks() {
        let mut opener = FakeOpener::new(&[]);
        opener.delay = Duration::from_millis(500);
        let shared = opener.shared.clone();
        let mut bus = ScopedI2cBus::new(opener);

        // Occupies the only worker thread for the whole transfer
        let transfer = tokio::spawn(async move { bus.write_byte(0x40, 0xFE) });
        while !shared.in_transfer.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let other = tokio::spawn(async { 42 });
        let result = tokio::time::timeout(Duration::from_millis(250), other).await;
        assert_eq!(result.expect("task stalled behind the transfer").unwrap(), 42);

        transfer.await.unwrap().unwrap();
        assert_eq!(shared.open_handles.load(Ordering::SeqCst), 0);
    }
}
