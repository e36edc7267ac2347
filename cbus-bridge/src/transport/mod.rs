//! Physical transport to the bridge chip.
//!
//! This module defines the raw vendor-driver call surface the rest of the
//! crate drives: bit-mode register access, byte transfer, line settings,
//! purge and queue status. Device discovery and the actual USB driver live
//! outside this crate; anything that can speak these calls for an already
//! resolved device implements [`Transport`].
//!
//! All calls are blocking. The crate serializes every call through
//! [`crate::session::DeviceSession`], so implementations need not be `Sync`.

pub mod sim;

use bitflags::bitflags;
use strum::{Display, FromRepr};
use thiserror::Error;

/// Vendor driver status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[repr(u32)]
pub enum FtStatus {
    Ok = 0,
    InvalidHandle = 1,
    DeviceNotFound = 2,
    DeviceNotOpened = 3,
    IoError = 4,
    InsufficientResources = 5,
    InvalidParameter = 6,
    InvalidBaudRate = 7,
    DeviceNotOpenedForErase = 8,
    DeviceNotOpenedForWrite = 9,
    FailedToWriteDevice = 10,
    EepromReadFailed = 11,
    EepromWriteFailed = 12,
    EepromEraseFailed = 13,
    EepromNotPresent = 14,
    EepromNotProgrammed = 15,
    InvalidArgs = 16,
    NotSupported = 17,
    OtherError = 18,
    DeviceListNotReady = 19,
}

impl FtStatus {
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// A failed transport call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{status} (status {})", .status.code())]
pub struct TransportError {
    pub status: FtStatus,
}

impl TransportError {
    pub fn new(status: FtStatus) -> Self {
        Self { status }
    }

    /// Map a raw status code; unknown codes become `OtherError`.
    pub fn from_code(code: u32) -> Self {
        Self::new(FtStatus::from_repr(code).unwrap_or(FtStatus::OtherError))
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Bit-mode selectors accepted by `set_bit_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[repr(u8)]
pub enum BitMode {
    /// Disable any bit-bang mode; pins return to their UART/EEPROM function.
    Reset = 0x00,
    AsyncBitbang = 0x01,
    SyncBitbang = 0x04,
    /// CBUS bit-bang; the mask byte is direction (high nibble) | value (low nibble).
    CbusBitbang = 0x20,
}

bitflags! {
    /// Driver buffers to discard.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Purge: u8 {
        const RX = 0x01;
        const TX = 0x02;
    }
}

/// Raw call surface of the bridge chip's driver.
///
/// Line-setting calls take the vendor's numeric codes; mapping from typed
/// settings happens in [`crate::uart`].
pub trait Transport: Send {
    /// Open the device if it is not already open.
    fn open(&mut self) -> TransportResult<()>;

    fn is_open(&self) -> bool;

    /// Reset the device.
    fn reset(&mut self) -> TransportResult<()>;

    /// Write the bit-mode register and select `mode`.
    fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> TransportResult<()>;

    /// Instantaneous pin levels as reported by the chip.
    fn bit_mode(&mut self) -> TransportResult<u8>;

    /// Read up to `buf.len()` bytes, honoring the configured read timeout.
    fn read(&mut self, buf: &mut [u8]) -> TransportResult<usize>;

    /// Write `buf`, returning the number of bytes the device accepted.
    fn write(&mut self, buf: &[u8]) -> TransportResult<usize>;

    fn set_baud_rate(&mut self, baud: u32) -> TransportResult<()>;

    fn set_data_characteristics(
        &mut self,
        word_length: u8,
        stop_bits: u8,
        parity: u8,
    ) -> TransportResult<()>;

    fn set_flow_control(&mut self, flow: u16, xon: u8, xoff: u8) -> TransportResult<()>;

    /// Set read and write timeouts in milliseconds; `None` waits forever.
    fn set_timeouts(&mut self, read_ms: Option<u32>, write_ms: Option<u32>) -> TransportResult<()>;

    fn purge(&mut self, buffers: Purge) -> TransportResult<()>;

    /// Number of bytes waiting in the receive queue.
    fn queue_status(&mut self) -> TransportResult<usize>;
}
