//! UART channel on the bridge's dedicated TX/RX lines.
//!
//! Line settings are typed here and mapped to the driver's numeric codes with
//! exhaustive matches. Applying a configuration is four separate driver calls;
//! a failure names the stage so the caller knows which setting was refused.
//! All four run in one session critical section.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::{Error, Result};
use crate::session::DeviceSession;
use crate::tracing::prelude::*;
use crate::transport::{Purge, Transport};

pub const MIN_BAUD_RATE: u32 = 300;
pub const MAX_BAUD_RATE: u32 = 3_000_000;

/// Software flow-control characters.
const XON: u8 = 0x11;
const XOFF: u8 = 0x13;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Seven,
    #[default]
    Eight,
}

impl DataBits {
    fn code(self) -> u8 {
        match self {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            _ => Err(Error::Configuration(format!(
                "data bits must be 7 or 8, got {bits}"
            ))),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> u8 {
        bits.code()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl Parity {
    fn code(self) -> u8 {
        match self {
            Parity::None => 0,
            Parity::Odd => 1,
            Parity::Even => 2,
            Parity::Mark => 3,
            Parity::Space => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

impl StopBits {
    fn code(self) -> u8 {
        match self {
            StopBits::One => 0,
            StopBits::OnePointFive => 1,
            StopBits::Two => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    #[default]
    None,
    RtsCts,
    XonXoff,
}

impl FlowControl {
    fn code(self) -> u16 {
        match self {
            FlowControl::None => 0x0000,
            FlowControl::RtsCts => 0x0100,
            FlowControl::XonXoff => 0x0400,
        }
    }
}

/// UART line settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UartConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Read timeout in milliseconds; negative waits forever
    pub read_timeout_ms: i64,
    /// Write timeout in milliseconds; negative waits forever
    pub write_timeout_ms: i64,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            read_timeout_ms: -1,
            write_timeout_ms: -1,
        }
    }
}

impl UartConfig {
    /// 8N1 at `baud_rate`, no flow control, no timeouts.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_BAUD_RATE..=MAX_BAUD_RATE).contains(&self.baud_rate) {
            return Err(Error::Configuration(format!(
                "baud rate {} outside {MIN_BAUD_RATE}..={MAX_BAUD_RATE}",
                self.baud_rate
            )));
        }
        timeout_ms(self.read_timeout_ms, "read")?;
        timeout_ms(self.write_timeout_ms, "write")?;
        Ok(())
    }
}

fn timeout_ms(ms: i64, which: &str) -> Result<Option<u32>> {
    if ms < 0 {
        return Ok(None);
    }
    u32::try_from(ms)
        .map(Some)
        .map_err(|_| Error::Configuration(format!("{which} timeout {ms} ms too large")))
}

fn apply<T: Transport>(transport: &mut T, config: &UartConfig) -> Result<()> {
    transport
        .set_baud_rate(config.baud_rate)
        .map_err(Error::BaudRate)?;
    transport
        .set_data_characteristics(
            config.data_bits.code(),
            config.stop_bits.code(),
            config.parity.code(),
        )
        .map_err(Error::Framing)?;
    transport
        .set_flow_control(config.flow_control.code(), XON, XOFF)
        .map_err(Error::FlowControl)?;
    transport
        .set_timeouts(
            timeout_ms(config.read_timeout_ms, "read")?,
            timeout_ms(config.write_timeout_ms, "write")?,
        )
        .map_err(Error::TimeoutConfig)?;
    Ok(())
}

/// UART view of a [`DeviceSession`].
pub struct UartChannel<'a, T: Transport> {
    session: &'a DeviceSession<T>,
    config: UartConfig,
}

impl<'a, T: Transport> UartChannel<'a, T> {
    pub(crate) fn open(session: &'a DeviceSession<T>, config: UartConfig) -> Result<Self> {
        config.validate()?;
        session.with_transport(|transport| apply(transport, &config))?;
        debug!(
            baud = config.baud_rate,
            data_bits = %config.data_bits,
            parity = %config.parity,
            stop_bits = %config.stop_bits,
            flow = %config.flow_control,
            "UART configured."
        );
        Ok(Self { session, config })
    }

    /// Bind to a session whose UART already carries `config`.
    pub(crate) fn attach(session: &'a DeviceSession<T>, config: UartConfig) -> Self {
        Self { session, config }
    }

    /// Copy of the applied settings.
    pub fn connection_settings(&self) -> UartConfig {
        self.config.clone()
    }

    /// Apply new settings. The channel keeps its previous settings unless all
    /// four stages succeed.
    pub fn reconfigure(&mut self, config: UartConfig) -> Result<()> {
        let reopened = Self::open(self.session, config)?;
        self.config = reopened.config;
        Ok(())
    }

    /// One non-blocking read of up to `buf.len()` bytes. Only bytes already
    /// queued are requested, so the driver's read timeout never comes into
    /// play and the session is not held waiting for data.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let requested = buf.len();
        if requested == 0 {
            return Ok(0);
        }
        let count = self.session.with_transport(|transport| {
            let available = transport
                .queue_status()
                .map_err(Error::device_io("queue status"))?;
            let wanted = requested.min(available);
            if wanted == 0 {
                return Ok(0);
            }
            transport
                .read(&mut buf[..wanted])
                .map_err(Error::device_io("UART read"))
        })?;
        trace!(requested, count, "UART read.");
        Ok(count)
    }

    /// Write all of `buf` in one driver call.
    pub fn write(&self, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let written = self.session.with_transport(|transport| {
            transport
                .write(buf)
                .map_err(Error::device_io("UART write"))
        })?;
        if written < buf.len() {
            warn!(requested = buf.len(), written, "Short UART write.");
            return Err(Error::ShortWrite {
                requested: buf.len(),
                written,
            });
        }
        trace!(written, "UART write.");
        Ok(())
    }

    pub fn discard_in_buffer(&self) -> Result<()> {
        self.purge(Purge::RX)
    }

    pub fn discard_out_buffer(&self) -> Result<()> {
        self.purge(Purge::TX)
    }

    /// Bytes waiting in the receive queue.
    pub fn bytes_to_read(&self) -> Result<usize> {
        self.session.with_transport(|transport| {
            transport
                .queue_status()
                .map_err(Error::device_io("queue status"))
        })
    }

    /// Always `None`: the chip does not report its transmit queue depth.
    pub fn bytes_to_write(&self) -> Option<usize> {
        None
    }

    fn purge(&self, buffers: Purge) -> Result<()> {
        self.session.with_transport(|transport| {
            transport
                .purge(buffers)
                .map_err(Error::device_io("purge"))
        })
    }
}
