//! cbus-monitord: watch CBUS inputs and log level changes.
//!
//! Runs against the in-memory simulated bridge; a vendor-driver transport
//! plugs in through the same `DeviceSession` constructor.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use cbus_bridge::asynch::{AsyncGpio, AsyncUart};
use cbus_bridge::config::Config;
use cbus_bridge::monitor::PinMonitor;
use cbus_bridge::tracing::{self, prelude::*};
use cbus_bridge::transport::sim::SimulatedFt232r;
use cbus_bridge::{DeviceSession, PinMode};

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_journald_or_stdout();

    let config = Config::load().context("failed to load configuration")?;
    let pins = config.monitor.pin_indices()?;

    let session = Arc::new(DeviceSession::new(SimulatedFt232r::new()));
    let uart = AsyncUart::open(Arc::clone(&session), config.uart.clone())
        .await
        .context("failed to configure UART")?;
    info!(baud = uart.connection_settings().baud_rate, "UART ready.");

    let gpio = AsyncGpio::new(Arc::clone(&session)).await?;
    for pin in &pins {
        let number = pin.get() as i32;
        gpio.open_pin(number).await?;
        gpio.set_pin_mode(number, PinMode::Input).await?;
    }

    let running = CancellationToken::new();
    let tracker = TaskTracker::new();
    let (change_tx, mut change_rx) = mpsc::channel(16);

    let monitor = PinMonitor::new(gpio, pins, config.monitor.poll_interval());
    tracker.spawn(monitor.run(change_tx, running.clone()));
    tracker.spawn(async move {
        while let Some(change) = change_rx.recv().await {
            info!(pin = %change.pin, level = %change.level, "Input changed.");
        }
    });
    tracker.close();
    info!("Started.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }

    trace!("Shutting down.");
    running.cancel();

    tracker.wait().await;
    if let Err(e) = session.reset() {
        error!(error = %e, "Failed to reset device on exit.");
    }
    info!("Exiting.");
    Ok(())
}
