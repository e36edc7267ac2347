//! CBUS bit-bang register model.
//!
//! The chip exposes four usable CBUS lines through a single 8-bit register:
//! the high nibble holds direction (bit `index + 4`, 1 = output) and the low
//! nibble holds level (bit `index`, 1 = high). A fifth CBUS line exists but
//! powers the board and is never addressable here.
//!
//! ```text
//!   bit:   7    6    5    4    3    2    1    0
//!        +----+----+----+----+----+----+----+----+
//!        | D3 | D2 | D1 | D0 | V3 | V2 | V1 | V0 |
//!        +----+----+----+----+----+----+----+----+
//! ```

pub mod pin_table;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::{Error, Result};

/// Number of addressable CBUS lines.
pub const PIN_COUNT: usize = 4;

/// The CBUS direction/value register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CbusMask(u8);

impl CbusMask {
    /// All lines input, all levels low.
    pub const ALL_INPUT: Self = Self(0);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Build from a hardware pin-state read. Only the level nibble is
    /// meaningful; the upper bits are discarded.
    pub const fn from_levels(read: u8) -> Self {
        Self(read & 0x0f)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn set_direction(self, index: PinIndex, output: bool) -> Self {
        let bit = 1 << (index.0 + 4);
        if output {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }

    #[must_use]
    pub const fn set_value(self, index: PinIndex, high: bool) -> Self {
        let bit = 1 << index.0;
        if high {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }

    pub const fn direction(self, index: PinIndex) -> bool {
        self.0 & (1 << (index.0 + 4)) != 0
    }

    pub const fn value(self, index: PinIndex) -> bool {
        self.0 & (1 << index.0) != 0
    }
}

impl fmt::Display for CbusMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// A validated CBUS line index in 0..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PinIndex(u8);

impl PinIndex {
    pub const ALL: [PinIndex; PIN_COUNT] = [Self(0), Self(1), Self(2), Self(3)];

    pub const fn get(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<i32> for PinIndex {
    type Error = Error;

    fn try_from(index: i32) -> Result<Self> {
        match index {
            0..=3 => Ok(Self(index as u8)),
            _ => Err(Error::InvalidIndex(index)),
        }
    }
}

impl FromStr for PinIndex {
    type Err = Error;

    /// Parse `CBUS0`..`CBUS3` or `CB0`..`CB3`, ignoring case.
    fn from_str(name: &str) -> Result<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let digits = upper
            .strip_prefix("CBUS")
            .or_else(|| upper.strip_prefix("CB"))
            .ok_or_else(|| Error::PinNotFound(name.to_string()))?;

        match digits {
            "0" => Ok(Self(0)),
            "1" => Ok(Self(1)),
            "2" => Ok(Self(2)),
            "3" => Ok(Self(3)),
            _ => Err(Error::PinNotFound(name.to_string())),
        }
    }
}

impl fmt::Display for PinIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CBUS{}", self.0)
    }
}

/// Resolve a pin name to its numeric index.
pub fn pin_number_from_name(name: &str) -> Result<i32> {
    name.parse::<PinIndex>().map(|pin| pin.get() as i32)
}

/// Requested pin configuration.
///
/// Only `Input` and `Output` are realizable on CBUS; the pull variants exist
/// so generic callers get a clear rejection rather than a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinMode {
    Input,
    Output,
    InputPullUp,
    InputPullDown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinLevel {
    #[default]
    Low,
    High,
}

impl PinLevel {
    pub fn is_high(self) -> bool {
        self == PinLevel::High
    }
}

impl From<bool> for PinLevel {
    fn from(high: bool) -> Self {
        if high {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }
}

impl std::ops::Not for PinLevel {
    type Output = PinLevel;

    fn not(self) -> PinLevel {
        match self {
            PinLevel::Low => PinLevel::High,
            PinLevel::High => PinLevel::Low,
        }
    }
}
