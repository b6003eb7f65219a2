//! Read-only consumer of [`SharedState`].
//!
//! Emits the query response as one JSON line whenever a new snapshot has been
//! published since the last check.

use crate::error::AppError;
use crate::state::SharedState;
use log::debug;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

pub struct Reporter<W> {
    state: Arc<SharedState>,
    period: Duration,
    out: W,
    last_version: u64,
    lines: u64,
}

impl<W: Write> Reporter<W> {
    pub fn new(state: Arc<SharedState>, period: Duration, out: W) -> Self {
        Self {
            state,
            period,
            out,
            last_version: 0,
            lines: 0,
        }
    }

    /// Write the current snapshot if it changed. Returns whether a line was written.
    pub fn report_if_changed(&mut self) -> Result<bool, AppError> {
        let (version, snapshot) = self.state.versioned();
        if version == self.last_version {
            return Ok(false);
        }

        serde_json::to_writer(&mut self.out, &snapshot.to_query())?;
        writeln!(self.out)?;
        self.out.flush()?;

        debug!("Reported snapshot version {}", version);
        self.last_version = version;
        self.lines += 1;
        Ok(true)
    }

    /// Check for new snapshots every period until cancelled.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), AppError> {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    self.report_if_changed()?;
                }
            }
        }
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
