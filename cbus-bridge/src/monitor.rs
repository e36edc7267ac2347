//! Poll CBUS inputs for changes.
//!
//! The chip has no interrupt path for CBUS, so change notification is done
//! in software: read each watched pin on a fixed interval and report levels
//! that differ from the previous observation. The first read of each pin is
//! always reported.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::asynch::AsyncGpio;
use crate::cbus::{PinIndex, PinLevel, PIN_COUNT};
use crate::tracing::prelude::*;
use crate::transport::Transport;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A watched pin's level changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinChange {
    pub pin: PinIndex,
    pub level: PinLevel,
}

/// Polling watcher over a set of open pins.
pub struct PinMonitor<T: Transport + 'static> {
    gpio: AsyncGpio<T>,
    pins: Vec<PinIndex>,
    interval: Duration,
}

impl<T: Transport + 'static> PinMonitor<T> {
    pub fn new(gpio: AsyncGpio<T>, pins: Vec<PinIndex>, interval: Duration) -> Self {
        Self {
            gpio,
            pins,
            interval,
        }
    }

    /// Poll until `running` is cancelled or the receiver goes away. Read
    /// failures are logged and the pin is tried again on the next tick.
    pub async fn run(self, changes: mpsc::Sender<PinChange>, running: CancellationToken) {
        trace!("Monitor started.");
        let mut last: [Option<PinLevel>; PIN_COUNT] = [None; PIN_COUNT];
        let mut ticker = time::interval(self.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'poll: loop {
            tokio::select! {
                _ = running.cancelled() => break,
                _ = ticker.tick() => {}
            }

            for &pin in &self.pins {
                let level = match self.gpio.read_pin(pin.get() as i32).await {
                    Ok(level) => level,
                    Err(e) => {
                        warn!(%pin, error = %e, "Failed to poll pin.");
                        continue;
                    }
                };

                let seen = &mut last[pin.get()];
                if *seen != Some(level) {
                    *seen = Some(level);
                    debug!(%pin, %level, "Pin changed.");
                    if changes.send(PinChange { pin, level }).await.is_err() {
                        break 'poll;
                    }
                }
            }
        }

        trace!("Monitor stopped.");
    }
}
