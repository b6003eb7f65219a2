//! Latest sensor snapshot shared between the poller and readers.
//!
//! The poller is the only writer. Readers get an `Arc` to an immutable
//! [`Snapshot`], so a reading can never be observed half-updated: publishing
//! swaps the whole pointer under a short write lock.

use crate::sensors::Reading;
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Format used for the `timestamp` field of the query response.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The externally visible unit of truth.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub reading: Reading,
    pub error: Option<String>,
    /// When the poller produced this snapshot
    pub timestamp: DateTime<Local>,
}

impl Snapshot {
    /// Snapshot of a successful cycle, stamped now.
    pub fn ok(reading: Reading) -> Self {
        Self {
            reading,
            error: None,
            timestamp: Local::now(),
        }
    }

    /// Snapshot of a failed cycle that keeps `reading`, stamped now.
    pub fn failed(reading: Reading, error: impl Into<String>) -> Self {
        Self {
            reading,
            error: Some(error.into()),
            timestamp: Local::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn to_query(&self) -> QueryResponse {
        QueryResponse {
            temperature: self.reading.temperature,
            humidity: self.reading.humidity,
            error: self.error.clone(),
            timestamp: self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

impl Default for Snapshot {
    /// Zero reading, no error.
    fn default() -> Self {
        Self::ok(Reading::default())
    }
}

/// Read-only view served to consumers, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub temperature: f64,
    pub humidity: f64,
    pub error: Option<String>,
    pub timestamp: String,
}

/// Process-wide holder of the latest [`Snapshot`].
///
/// # Example
/// ```ignore
/// let state = Arc::new(SharedState::new());
///
/// // From the poller
/// state.publish(Snapshot::ok(reading));
///
/// // From any reader
/// let json = serde_json::to_string(&state.query())?;
/// ```
pub struct SharedState {
    current: RwLock<Slot>,
}

/// Snapshot and its publish count, swapped together.
struct Slot {
    version: u64,
    snapshot: Arc<Snapshot>,
}

impl SharedState {
    /// State holding the zero reading with no error.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Slot {
                version: 0,
                snapshot: Arc::new(Snapshot::default()),
            }),
        }
    }

    /// Replace the current snapshot.
    pub fn publish(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        let mut slot = self.current.write();
        slot.version += 1;
        slot.snapshot = snapshot;
    }

    /// Publish an error while keeping the last good reading.
    ///
    /// The read of the previous reading and the swap happen under one lock.
    pub fn record_error(&self, error: impl Into<String>) {
        let mut slot = self.current.write();
        let reading = slot.snapshot.reading;
        slot.version += 1;
        slot.snapshot = Arc::new(Snapshot::failed(reading, error));
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.current.read().snapshot.clone()
    }

    /// Number of publishes so far. Starts at 0.
    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// The current snapshot together with the version that produced it.
    pub fn versioned(&self) -> (u64, Arc<Snapshot>) {
        let slot = self.current.read();
        (slot.version, slot.snapshot.clone())
    }

    pub fn query(&self) -> QueryResponse {
        self.current().to_query()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_initial_state() {
        let state = SharedState::new();
        let snapshot = state.current();
        assert_eq!(snapshot.reading, Reading::default());
        assert_eq!(snapshot.error, None);
        assert_eq!(state.version(), 0);
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let state = SharedState::new();
        state.publish(Snapshot::ok(Reading::new(21.5, 40.25)));

        let snapshot = state.current();
        assert_eq!(snapshot.reading, Reading::new(21.5, 40.25));
        assert!(snapshot.is_ok());
        assert_eq!(state.version(), 1);
    }

    #[test]
    fn test_record_error_keeps_last_reading() {
        let state = SharedState::new();
        state.publish(Snapshot::ok(Reading::new(21.5, 40.25)));
        state.record_error("Sensor error: bus unavailable");

        let snapshot = state.current();
        assert_eq!(snapshot.reading, Reading::new(21.5, 40.25));
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Sensor error: bus unavailable")
        );
        assert_eq!(state.version(), 2);

        state.publish(Snapshot::ok(Reading::new(22.0, 41.0)));
        assert_eq!(state.current().error, None);
    }

    #[test]
    fn test_held_snapshot_is_unaffected_by_publish() {
        let state = SharedState::new();
        state.publish(Snapshot::ok(Reading::new(1.0, 2.0)));
        let held = state.current();
        state.publish(Snapshot::ok(Reading::new(3.0, 4.0)));
        assert_eq!(held.reading, Reading::new(1.0, 2.0));
    }

    #[test]
    fn test_query_json_shape() {
        let state = SharedState::new();
        state.record_error("Sensor error: no acknowledge");

        let value = serde_json::to_value(state.query()).unwrap();
        assert_eq!(value["temperature"], 0.0);
        assert_eq!(value["humidity"], 0.0);
        assert_eq!(value["error"], "Sensor error: no acknowledge");

        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(
            chrono::NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).is_ok(),
            "unexpected timestamp {timestamp}"
        );
    }

    #[test]
    fn test_query_error_is_null_when_ok() {
        let state = SharedState::new();
        let value = serde_json::to_value(state.query()).unwrap();
        assert!(value["error"].is_null());
    }

    #[test]
    fn test_timestamp_is_production_time() {
        let state = SharedState::new();
        let produced = state.current().timestamp;
        thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(state.current().timestamp, produced);
    }

    #[test]
    fn test_no_tearing_under_concurrent_publish() {
        // Each cycle n publishes (n, -n); a torn read would break the pairing.
        let state = Arc::new(SharedState::new());

        let writer = {
            let state = state.clone();
            thread::spawn(move || {
                for n in 1..=20_000 {
                    let n = n as f64;
                    state.publish(Snapshot::ok(Reading::new(n, -n)));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                thread::spawn(move || {
                    let mut last = 0.0;
                    for _ in 0..20_000 {
                        let snapshot = state.current();
                        assert_eq!(snapshot.reading.humidity, -snapshot.reading.temperature);
                        assert!(snapshot.reading.temperature >= last);
                        last = snapshot.reading.temperature;
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(state.current().reading, Reading::new(20_000.0, -20_000.0));
    }

    #[test]
    fn test_version_matches_snapshot_under_concurrent_publish() {
        // Publish n carries temperature n; a failure keeps publish n - 1.
        let state = Arc::new(SharedState::new());

        let writer = {
            let state = state.clone();
            thread::spawn(move || {
                for version in 1..=20_000u64 {
                    if version % 4 == 0 {
                        state.record_error("Sensor error: no acknowledge");
                    } else {
                        state.publish(Snapshot::ok(Reading::new(version as f64, 0.0)));
                    }
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                thread::spawn(move || {
                    for _ in 0..20_000 {
                        let (version, snapshot) = state.versioned();
                        if snapshot.is_ok() {
                            assert_eq!(snapshot.reading.temperature, version as f64);
                        } else {
                            assert_eq!(snapshot.reading.temperature, (version - 1) as f64);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(state.versioned().0, state.version());
    }
}
