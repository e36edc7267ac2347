//! Per-pin lifecycle and cached state.
//!
//! The table owns the one authoritative [`CbusMask`]. It never talks to the
//! hardware; the GPIO controller pushes `mask()` after each mutation and keeps
//! the previous table around to restore on failure. The table is `Copy`, so
//! that snapshot is free.

use super::{CbusMask, PinIndex, PinLevel, PinMode, PIN_COUNT};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PinState {
    open: bool,
    mode: PinMode,
    last_value: PinLevel,
}

impl PinState {
    const CLOSED: Self = Self {
        open: false,
        mode: PinMode::Input,
        last_value: PinLevel::Low,
    };
}

/// State for the four CBUS lines plus the shared register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinTable {
    pins: [PinState; PIN_COUNT],
    mask: CbusMask,
}

impl Default for PinTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PinTable {
    /// All pins closed, register all-input and low.
    pub const fn new() -> Self {
        Self {
            pins: [PinState::CLOSED; PIN_COUNT],
            mask: CbusMask::ALL_INPUT,
        }
    }

    pub fn mask(&self) -> CbusMask {
        self.mask
    }

    pub fn is_open(&self, index: PinIndex) -> bool {
        self.pins[index.get()].open
    }

    /// Open as an input, low. A line left driven by an earlier close has its
    /// bits cleared here to match; nothing reaches the hardware until the
    /// next push.
    pub fn open(&mut self, index: PinIndex) -> Result<()> {
        let pin = &mut self.pins[index.get()];
        if pin.open {
            return Err(Error::AlreadyOpen(index));
        }
        *pin = PinState {
            open: true,
            ..PinState::CLOSED
        };
        self.mask = self.mask.set_direction(index, false).set_value(index, false);
        Ok(())
    }

    /// Mark the pin closed and forget its cached state. The register bits are
    /// left as they are, so the line keeps whatever was last programmed.
    pub fn close(&mut self, index: PinIndex) {
        self.pins[index.get()] = PinState::CLOSED;
    }

    pub fn mode(&self, index: PinIndex) -> Result<PinMode> {
        Ok(self.open_pin(index)?.mode)
    }

    pub fn last_value(&self, index: PinIndex) -> Result<PinLevel> {
        Ok(self.open_pin(index)?.last_value)
    }

    pub fn set_mode(&mut self, index: PinIndex, mode: PinMode) -> Result<()> {
        self.open_pin(index)?;
        let output = match mode {
            PinMode::Input => false,
            PinMode::Output => true,
            PinMode::InputPullUp | PinMode::InputPullDown => {
                return Err(Error::UnsupportedMode(mode))
            }
        };

        self.mask = self.mask.set_direction(index, output);
        self.pins[index.get()].mode = mode;
        Ok(())
    }

    /// Drive an output pin's level. Input pins are rejected.
    pub fn set_value(&mut self, index: PinIndex, level: PinLevel) -> Result<()> {
        if self.open_pin(index)?.mode != PinMode::Output {
            return Err(Error::WrongDirection(index));
        }

        self.mask = self.mask.set_value(index, level.is_high());
        self.pins[index.get()].last_value = level;
        Ok(())
    }

    /// Record the level of `index` seen in a hardware read. Only the
    /// observation cache changes; the register stays driver-authoritative.
    pub fn observe(&mut self, index: PinIndex, snapshot: CbusMask) -> Result<PinLevel> {
        self.open_pin(index)?;
        let level = PinLevel::from(snapshot.value(index));
        self.pins[index.get()].last_value = level;
        Ok(level)
    }

    fn open_pin(&self, index: PinIndex) -> Result<&PinState> {
        let pin = &self.pins[index.get()];
        if pin.open {
            Ok(pin)
        } else {
            Err(Error::NotOpen(index))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn pin(index: i32) -> PinIndex {
        PinIndex::try_from(index).unwrap()
    }

    #[test]
    fn open_defaults_to_input_low() {
        let mut table = PinTable::new();
        table.open(pin(2)).unwrap();
        assert_eq!(table.mode(pin(2)).unwrap(), PinMode::Input);
        assert_eq!(table.last_value(pin(2)).unwrap(), PinLevel::Low);
        assert_eq!(table.mask(), CbusMask::ALL_INPUT);
    }

    #[test]
    fn double_open_fails() {
        let mut table = PinTable::new();
        table.open(pin(0)).unwrap();
        assert!(matches!(table.open(pin(0)), Err(Error::AlreadyOpen(p)) if p == pin(0)));
    }

    #[test]
    fn closed_pins_reject_everything() {
        let mut table = PinTable::new();
        let p = pin(1);
        assert!(matches!(table.set_mode(p, PinMode::Output), Err(Error::NotOpen(_))));
        assert!(matches!(table.set_value(p, PinLevel::High), Err(Error::NotOpen(_))));
        assert!(matches!(table.mode(p), Err(Error::NotOpen(_))));

        table.open(p).unwrap();
        table.close(p);
        assert!(matches!(table.set_mode(p, PinMode::Output), Err(Error::NotOpen(_))));
    }

    #[test]
    fn close_keeps_register_bits_but_forgets_cache() {
        let mut table = PinTable::new();
        let p = pin(3);
        table.open(p).unwrap();
        table.set_mode(p, PinMode::Output).unwrap();
        table.set_value(p, PinLevel::High).unwrap();
        table.close(p);
        assert_eq!(table.mask().bits(), 0x88);

        table.open(p).unwrap();
        assert_eq!(table.mode(p).unwrap(), PinMode::Input);
        assert_eq!(table.last_value(p).unwrap(), PinLevel::Low);
        assert!(!table.mask().direction(p));
        assert_eq!(table.mask(), CbusMask::ALL_INPUT);
    }

    #[test]
    fn reopen_leaves_other_pins_alone() {
        let mut table = PinTable::new();
        table.open(pin(0)).unwrap();
        table.set_mode(pin(0), PinMode::Output).unwrap();
        table.set_value(pin(0), PinLevel::High).unwrap();
        table.open(pin(1)).unwrap();
        table.set_mode(pin(1), PinMode::Output).unwrap();
        table.close(pin(1));

        table.open(pin(1)).unwrap();
        assert_eq!(table.mask().bits(), 0x11);
    }

    #[test]
    fn writing_an_input_is_rejected_without_touching_the_mask() {
        let mut table = PinTable::new();
        table.open(pin(0)).unwrap();
        let before = table.mask();
        assert!(matches!(
            table.set_value(pin(0), PinLevel::High),
            Err(Error::WrongDirection(_))
        ));
        assert_eq!(table.mask(), before);
    }

    #[test_case(PinMode::InputPullUp)]
    #[test_case(PinMode::InputPullDown)]
    fn pull_modes_are_unsupported(mode: PinMode) {
        let mut table = PinTable::new();
        table.open(pin(0)).unwrap();
        assert!(matches!(
            table.set_mode(pin(0), mode),
            Err(Error::UnsupportedMode(m)) if m == mode
        ));
        assert_eq!(table.mode(pin(0)).unwrap(), PinMode::Input);
    }

    #[test]
    fn observe_updates_only_the_cache() {
        let mut table = PinTable::new();
        table.open(pin(1)).unwrap();
        let level = table.observe(pin(1), CbusMask::from_levels(0x02)).unwrap();
        assert_eq!(level, PinLevel::High);
        assert_eq!(table.last_value(pin(1)).unwrap(), PinLevel::High);
        assert_eq!(table.mask(), CbusMask::ALL_INPUT);
    }
}
