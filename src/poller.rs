//! Background polling loop.
//!
//! ```text
//! Uninitialized --reset ok + settle--> Running --(cycle, interval)*--> ...
//!       |
//!       +--reset failed--> Halted
//! ```
//!
//! Steady-state failures never leave `Running`: the error is published, the
//! sensor is reset and the next cycle runs after the usual interval. Only the
//! initial reset is fatal. The loop has no natural end; it stops when its
//! [`CancellationToken`] is cancelled.

use crate::bus::BusTransport;
use crate::config::PollerConfig;
use crate::error::SensorError;
use crate::sensors::{Reading, Sht20};
use crate::state::{SharedState, Snapshot};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Error published when the initial reset fails and
/// [`PollerConfig::report_init_failure`] is set.
pub const INIT_FAILED_MESSAGE: &str = "Sensor initialization failed";

/// Prefix of every error published for a failed cycle.
pub const CYCLE_ERROR_PREFIX: &str = "Sensor error: ";

/// Lifecycle of the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Uninitialized,
    Running,
    Halted,
}

/// Result of one measurement cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Published(Reading),
    Failed(SensorError),
}

impl CycleOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}

/// Drives an [`Sht20`] and publishes every cycle into [`SharedState`].
pub struct Poller<B> {
    sensor: Sht20<B>,
    state: Arc<SharedState>,
    config: PollerConfig,
    status: watch::Sender<PollerState>,
}

impl<B: BusTransport> Poller<B> {
    pub fn new(sensor: Sht20<B>, state: Arc<SharedState>, config: PollerConfig) -> Self {
        let (status, _) = watch::channel(PollerState::Uninitialized);
        Self {
            sensor,
            state,
            config,
            status,
        }
    }

    pub fn state(&self) -> PollerState {
        *self.status.borrow()
    }

    /// Watch lifecycle transitions from outside the task.
    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.status.subscribe()
    }

    fn transition(&self, next: PollerState) {
        let previous = self.status.send_replace(next);
        if previous != next {
            debug!("Poller {:?} -> {:?}", previous, next);
        }
    }

    /// Reset the sensor and wait for it to settle.
    ///
    /// On failure the poller is halted for good. The shared state is left at
    /// its initial value unless `report_init_failure` is configured.
    pub async fn start(&mut self) -> Result<(), SensorError> {
        match self.sensor.reset().await {
            Ok(()) => {
                sleep(self.config.startup_settle).await;
                self.transition(PollerState::Running);
                info!(
                    "SHT20 at 0x{:02X} initialized, polling every {:?}",
                    self.sensor.address(),
                    self.config.interval
                );
                Ok(())
            }
            Err(e) => {
                error!("{}: {}", INIT_FAILED_MESSAGE, e);
                if self.config.report_init_failure {
                    self.state.record_error(INIT_FAILED_MESSAGE);
                }
                self.transition(PollerState::Halted);
                Err(e)
            }
        }
    }

    /// Measure temperature then humidity and publish the outcome.
    ///
    /// A failure keeps the last good reading, publishes the error and resets
    /// the sensor. The reset result is only logged.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        match self.sensor.read().await {
            Ok(reading) => {
                debug!(
                    "Temperature: {:.2}°C, Humidity: {:.2}%",
                    reading.temperature, reading.humidity
                );
                self.state.publish(Snapshot::ok(reading));
                CycleOutcome::Published(reading)
            }
            Err(e) => {
                let message = format!("{}{}", CYCLE_ERROR_PREFIX, e);
                warn!("{}", message);
                self.state.record_error(message);

                if let Err(reset_err) = self.sensor.reset().await {
                    warn!("Recovery reset failed: {}", reset_err);
                }
                CycleOutcome::Failed(e)
            }
        }
    }

    /// Run until cancelled, or until the initial reset fails.
    ///
    /// Returns the state the poller ended in.
    pub async fn run(mut self, cancel: CancellationToken) -> PollerState {
        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Poller cancelled before start");
                return self.state();
            }
            result = self.start() => result,
        };
        if started.is_err() {
            return self.state();
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = async {
                    self.run_cycle().await;
                    sleep(self.config.interval).await;
                } => {}
            }
        }

        info!("Poller stopped");
        self.state()
    }
}

impl<B> Poller<B>
where
    B: BusTransport + Send + 'static,
{
    /// Spawn [`Poller::run`] on the tokio runtime.
    ///
    /// Hardware transfers block for the length of one I2C transaction. On a
    /// multi-threaded runtime other tasks keep running meanwhile; on a
    /// current-thread runtime they wait for the transfer to finish.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<PollerState> {
        tokio::spawn(self.run(cancel))
    }
}
