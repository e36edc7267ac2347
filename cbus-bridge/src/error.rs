//! Common error types for cbus-bridge.
//!
//! This module provides a centralized Error enum using thiserror. Lifecycle
//! and validation failures are detected before any hardware access; transport
//! failures carry the vendor status and the operation that produced it.

use thiserror::Error;

use crate::cbus::{PinIndex, PinMode};
use crate::transport::TransportError;

/// Main error type for cbus-bridge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Pin index outside the addressable range 0..=3
    #[error("Invalid pin index {0} (valid: 0..=3)")]
    InvalidIndex(i32),

    /// Pin name did not match CBUSn or CBn
    #[error("No pin named {0:?}")]
    PinNotFound(String),

    #[error("Pin {0} is already open")]
    AlreadyOpen(PinIndex),

    #[error("Pin {0} is not open")]
    NotOpen(PinIndex),

    /// Mode the CBUS lines cannot be put into
    #[error("Unsupported pin mode: {0}")]
    UnsupportedMode(PinMode),

    /// Write attempted on a pin configured as input
    #[error("Pin {0} is configured as input")]
    WrongDirection(PinIndex),

    /// Capability the hardware does not provide
    #[error("Not supported: {0}")]
    NotSupported(&'static str),

    /// A transport call failed
    #[error("Device I/O error during {operation}: {source}")]
    DeviceIo {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    /// The device accepted fewer bytes than were written
    #[error("Short write: {written} of {requested} bytes accepted")]
    ShortWrite { requested: usize, written: usize },

    /// Bad parameter value
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to set baud rate: {0}")]
    BaudRate(#[source] TransportError),

    #[error("Failed to set data characteristics: {0}")]
    Framing(#[source] TransportError),

    #[error("Failed to set flow control: {0}")]
    FlowControl(#[source] TransportError),

    #[error("Failed to set timeouts: {0}")]
    TimeoutConfig(#[source] TransportError),

    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking call's worker task failed
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Configuration file parse errors
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a transport failure with the name of the operation.
    pub(crate) fn device_io(operation: &'static str) -> impl FnOnce(TransportError) -> Self {
        move |source| Self::DeviceIo { operation, source }
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
