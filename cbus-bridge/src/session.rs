//! Device session: the single owner of the transport and the CBUS register.
//!
//! Every hardware interaction, GPIO or UART, goes through the session's one
//! mutex. A GPIO mutation computes the new register from the cached table and
//! pushes it while holding that lock, so two pins can never build their byte
//! from the same stale snapshot. UART configuration takes the same lock and
//! cannot land between a GPIO update and its push.

use parking_lot::{Mutex, MutexGuard};

use crate::cbus::{pin_table::PinTable, CbusMask};
use crate::error::{Error, Result};
use crate::gpio::GpioController;
use crate::tracing::prelude::*;
use crate::transport::{BitMode, Transport};
use crate::uart::{UartChannel, UartConfig};

struct SessionInner<T> {
    transport: T,
    /// Present once the device is in CBUS bit-bang mode
    pins: Option<PinTable>,
}

/// An open bridge device shared by one GPIO controller and UART channel.
pub struct DeviceSession<T: Transport> {
    inner: Mutex<SessionInner<T>>,
}

impl<T: Transport> DeviceSession<T> {
    /// Wrap an already resolved device. The device is opened on first use.
    pub fn new(transport: T) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                transport,
                pins: None,
            }),
        }
    }

    /// Reset the device. GPIO state is forgotten; the next GPIO call
    /// re-enters bit-bang mode with every pin closed and input.
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.lock_open()?;
        inner.transport.reset().map_err(Error::device_io("reset"))?;
        inner.pins = None;
        info!("Device reset.");
        Ok(())
    }

    /// GPIO view of this session, entering CBUS bit-bang mode if needed.
    pub fn gpio(&self) -> Result<GpioController<'_, T>> {
        self.with_pins(|_, _| Ok(()))?;
        Ok(GpioController::new(self))
    }

    /// UART view of this session with `config` applied to the device.
    pub fn uart(&self, config: UartConfig) -> Result<UartChannel<'_, T>> {
        UartChannel::open(self, config)
    }

    /// Cached register contents, if GPIO has been initialized.
    pub fn register_snapshot(&self) -> Option<CbusMask> {
        self.inner.lock().pins.map(|table| table.mask())
    }

    /// Run `f` against the open transport under the session lock.
    pub(crate) fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        let mut inner = self.lock_open()?;
        f(&mut inner.transport)
    }

    /// Run `f` against a working copy of the pin table under the session
    /// lock. The copy replaces the cached table only if `f` succeeds, so a
    /// failed push leaves the cache at its last known good state.
    pub(crate) fn with_pins<R>(
        &self,
        f: impl FnOnce(&mut PinTable, &mut T) -> Result<R>,
    ) -> Result<R> {
        let mut inner = self.lock_open()?;
        let cached = inner.pins;
        let current = match cached {
            Some(table) => table,
            None => {
                let table = enter_cbus_bitbang(&mut inner.transport)?;
                inner.pins = Some(table);
                table
            }
        };

        let mut working = current;
        let result = f(&mut working, &mut inner.transport);
        match &result {
            Ok(_) => inner.pins = Some(working),
            Err(e @ Error::DeviceIo { .. }) => {
                warn!(
                    error = %e,
                    mask = %current.mask(),
                    "GPIO update failed, keeping cached state."
                );
            }
            Err(_) => {}
        }
        result
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, SessionInner<T>>> {
        let mut inner = self.inner.lock();
        if !inner.transport.is_open() {
            inner.transport.open().map_err(Error::device_io("open"))?;
            debug!("Device opened.");
        }
        Ok(inner)
    }
}

/// Write `mask` to the CBUS register.
pub(crate) fn push_mask<T: Transport>(transport: &mut T, mask: CbusMask) -> Result<()> {
    transport
        .set_bit_mode(mask.bits(), BitMode::CbusBitbang)
        .map_err(Error::device_io("set CBUS mask"))?;
    trace!(mask = %mask, "Pushed CBUS mask.");
    Ok(())
}

// Clear any stale mode, select CBUS bit-bang with every line an input, then
// drop whatever the driver queued during the switch.
fn enter_cbus_bitbang<T: Transport>(transport: &mut T) -> Result<PinTable> {
    transport
        .set_bit_mode(0, BitMode::Reset)
        .map_err(Error::device_io("reset bit mode"))?;

    let table = PinTable::new();
    push_mask(transport, table.mask())?;

    let pending = transport
        .queue_status()
        .map_err(Error::device_io("queue status"))?;
    if pending > 0 {
        let mut junk = vec![0u8; pending];
        let discarded = transport
            .read(&mut junk)
            .map_err(Error::device_io("discard mode-switch bytes"))?;
        debug!(discarded, "Discarded bytes emitted by bit-mode switch.");
    }

    debug!("Entered CBUS bit-bang mode.");
    Ok(table)
}
