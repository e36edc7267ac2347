//! GPIO and UART over a single FT232R-style USB serial bridge.
//!
//! The chip's four CBUS lines share one bit-bang register, and its UART is
//! configured through the same driver handle. A [`DeviceSession`] owns that
//! handle and serializes every call into it; [`GpioController`] and
//! [`UartChannel`] are borrowed views of the session.
//!
//! Device discovery and the vendor driver are outside this crate: anything
//! implementing [`transport::Transport`] for a resolved device can back a
//! session. [`transport::sim::SimulatedFt232r`] is an in-memory device.

pub mod asynch;
pub mod cbus;
pub mod config;
pub mod error;
pub mod gpio;
pub mod monitor;
pub mod session;
pub mod tracing;
pub mod transport;
pub mod uart;

pub use cbus::{pin_number_from_name, CbusMask, PinIndex, PinLevel, PinMode};
pub use error::{Error, Result};
pub use gpio::{GpioController, PinEvent};
pub use session::DeviceSession;
pub use uart::{DataBits, FlowControl, Parity, StopBits, UartChannel, UartConfig};
