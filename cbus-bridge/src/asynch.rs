//! Async adapters over the blocking session API.
//!
//! Each call runs the corresponding blocking operation on tokio's blocking
//! pool and awaits it. No buffering or reordering is added: an awaited call
//! has reached the device before the next one starts.

use std::sync::Arc;
use tokio::task;

use crate::cbus::{PinLevel, PinMode};
use crate::error::Result;
use crate::gpio::GpioController;
use crate::session::DeviceSession;
use crate::transport::Transport;
use crate::uart::{UartChannel, UartConfig};

async fn blocking<R, F>(f: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R> + Send + 'static,
{
    task::spawn_blocking(f).await?
}

/// Async GPIO handle sharing ownership of the session.
pub struct AsyncGpio<T: Transport + 'static> {
    session: Arc<DeviceSession<T>>,
}

impl<T: Transport + 'static> Clone for AsyncGpio<T> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
        }
    }
}

impl<T: Transport + 'static> AsyncGpio<T> {
    /// Enter CBUS bit-bang mode on `session` if needed.
    pub async fn new(session: Arc<DeviceSession<T>>) -> Result<Self> {
        let init = Arc::clone(&session);
        blocking(move || init.gpio().map(|_| ())).await?;
        Ok(Self { session })
    }

    async fn run<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&GpioController<'_, T>) -> Result<R> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        blocking(move || f(&GpioController::new(&session))).await
    }

    pub async fn open_pin(&self, pin: i32) -> Result<()> {
        self.run(move |gpio| gpio.open_pin(pin)).await
    }

    pub async fn close_pin(&self, pin: i32) -> Result<()> {
        self.run(move |gpio| gpio.close_pin(pin)).await
    }

    pub async fn release_pin(&self, pin: i32) -> Result<()> {
        self.run(move |gpio| gpio.release_pin(pin)).await
    }

    pub async fn set_pin_mode(&self, pin: i32, mode: PinMode) -> Result<()> {
        self.run(move |gpio| gpio.set_pin_mode(pin, mode)).await
    }

    pub async fn get_pin_mode(&self, pin: i32) -> Result<PinMode> {
        self.run(move |gpio| gpio.get_pin_mode(pin)).await
    }

    pub async fn read_pin(&self, pin: i32) -> Result<PinLevel> {
        self.run(move |gpio| gpio.read_pin(pin)).await
    }

    pub async fn write_pin(&self, pin: i32, level: PinLevel) -> Result<()> {
        self.run(move |gpio| gpio.write_pin(pin, level)).await
    }

    pub async fn toggle_pin(&self, pin: i32) -> Result<PinLevel> {
        self.run(move |gpio| gpio.toggle_pin(pin)).await
    }
}

/// Async UART handle sharing ownership of the session.
pub struct AsyncUart<T: Transport + 'static> {
    session: Arc<DeviceSession<T>>,
    config: UartConfig,
}

impl<T: Transport + 'static> AsyncUart<T> {
    /// Apply `config` to the session's UART.
    pub async fn open(session: Arc<DeviceSession<T>>, config: UartConfig) -> Result<Self> {
        let init = Arc::clone(&session);
        let applied = config.clone();
        blocking(move || init.uart(applied).map(|_| ())).await?;
        Ok(Self { session, config })
    }

    pub fn connection_settings(&self) -> UartConfig {
        self.config.clone()
    }

    async fn run<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&UartChannel<'_, T>) -> Result<R> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        let config = self.config.clone();
        blocking(move || f(&UartChannel::attach(&session, config))).await
    }

    /// One best-effort read of up to `max` bytes.
    pub async fn read(&self, max: usize) -> Result<Vec<u8>> {
        self.run(move |uart| {
            let mut buf = vec![0u8; max];
            let count = uart.read(&mut buf)?;
            buf.truncate(count);
            Ok(buf)
        })
        .await
    }

    pub async fn write(&self, data: Vec<u8>) -> Result<()> {
        self.run(move |uart| uart.write(&data)).await
    }

    pub async fn bytes_to_read(&self) -> Result<usize> {
        self.run(|uart| uart.bytes_to_read()).await
    }

    pub async fn discard_in_buffer(&self) -> Result<()> {
        self.run(|uart| uart.discard_in_buffer()).await
    }

    pub async fn discard_out_buffer(&self) -> Result<()> {
        self.run(|uart| uart.discard_out_buffer()).await
    }
}
