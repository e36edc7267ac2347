//! GPIO controller for the four CBUS lines.
//!
//! Each call is one critical section on the session: validate against the
//! cached pin table, update it, push the whole register byte. Validation
//! errors are raised before the hardware is touched, and a failed push leaves
//! the cache exactly as it was.
//!
//! The chip cannot report CBUS changes, so there are no edge events. Callers
//! that need to react to inputs poll [`GpioController::read_pin`], or use
//! [`crate::monitor::PinMonitor`].

use std::time::Duration;

use crate::cbus::{pin_number_from_name, CbusMask, PinIndex, PinLevel, PinMode, PIN_COUNT};
use crate::error::{Error, Result};
use crate::session::{push_mask, DeviceSession};
use crate::tracing::prelude::*;
use crate::transport::Transport;

/// Pin edge kinds a generic GPIO API would offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinEvent {
    Rising,
    Falling,
}

/// GPIO view of a [`DeviceSession`].
pub struct GpioController<'a, T: Transport> {
    session: &'a DeviceSession<T>,
}

impl<'a, T: Transport> GpioController<'a, T> {
    pub(crate) fn new(session: &'a DeviceSession<T>) -> Self {
        Self { session }
    }

    pub fn pin_count(&self) -> usize {
        PIN_COUNT
    }

    /// Resolve `CBUSn`/`CBn` (any case) to a pin number.
    pub fn pin_number(&self, name: &str) -> Result<i32> {
        pin_number_from_name(name)
    }

    pub fn is_pin_mode_supported(&self, mode: PinMode) -> bool {
        matches!(mode, PinMode::Input | PinMode::Output)
    }

    pub fn is_pin_open(&self, pin: i32) -> Result<bool> {
        let index = PinIndex::try_from(pin)?;
        self.session.with_pins(|table, _| Ok(table.is_open(index)))
    }

    /// Claim a pin. Nothing is pushed until its mode is set.
    pub fn open_pin(&self, pin: i32) -> Result<()> {
        let index = PinIndex::try_from(pin)?;
        self.session.with_pins(|table, _| table.open(index))?;
        debug!(pin = %index, "Opened pin.");
        Ok(())
    }

    /// Release a pin without touching the hardware; the line keeps driving
    /// whatever it was last set to. See [`Self::release_pin`].
    pub fn close_pin(&self, pin: i32) -> Result<()> {
        let index = PinIndex::try_from(pin)?;
        self.session.with_pins(|table, _| {
            table.close(index);
            Ok(())
        })?;
        debug!(pin = %index, "Closed pin.");
        Ok(())
    }

    /// Switch a pin back to input on the hardware, then close it.
    pub fn release_pin(&self, pin: i32) -> Result<()> {
        let index = PinIndex::try_from(pin)?;
        self.session.with_pins(|table, transport| {
            table.set_mode(index, PinMode::Input)?;
            push_mask(transport, table.mask())?;
            table.close(index);
            Ok(())
        })?;
        debug!(pin = %index, "Released pin to input.");
        Ok(())
    }

    pub fn set_pin_mode(&self, pin: i32, mode: PinMode) -> Result<()> {
        let index = PinIndex::try_from(pin)?;
        let mask = self.session.with_pins(|table, transport| {
            table.set_mode(index, mode)?;
            push_mask(transport, table.mask())?;
            Ok(table.mask())
        })?;
        debug!(pin = %index, %mode, %mask, "Set pin mode.");
        Ok(())
    }

    /// Cached mode; no hardware access.
    pub fn get_pin_mode(&self, pin: i32) -> Result<PinMode> {
        let index = PinIndex::try_from(pin)?;
        self.session.with_pins(|table, _| table.mode(index))
    }

    pub fn write_pin(&self, pin: i32, level: PinLevel) -> Result<()> {
        let index = PinIndex::try_from(pin)?;
        let mask = self.session.with_pins(|table, transport| {
            table.set_value(index, level)?;
            push_mask(transport, table.mask())?;
            Ok(table.mask())
        })?;
        trace!(pin = %index, %level, %mask, "Wrote pin.");
        Ok(())
    }

    /// Live read of the pin's level. Inputs change outside our control, so
    /// this always goes to the hardware.
    pub fn read_pin(&self, pin: i32) -> Result<PinLevel> {
        let index = PinIndex::try_from(pin)?;
        let level = self.session.with_pins(|table, transport| {
            table.mode(index)?;
            let raw = transport
                .bit_mode()
                .map_err(Error::device_io("read CBUS pins"))?;
            table.observe(index, CbusMask::from_levels(raw))
        })?;
        trace!(pin = %index, %level, "Read pin.");
        Ok(level)
    }

    /// Invert an output pin's last written level, returning the new level.
    pub fn toggle_pin(&self, pin: i32) -> Result<PinLevel> {
        let index = PinIndex::try_from(pin)?;
        self.session.with_pins(|table, transport| {
            let next = !table.last_value(index)?;
            table.set_value(index, next)?;
            push_mask(transport, table.mask())?;
            Ok(next)
        })
    }

    /// Always fails: CBUS has no edge detection.
    pub fn wait_for_event(
        &self,
        _pin: i32,
        _event: PinEvent,
        _timeout: Duration,
    ) -> Result<PinEvent> {
        Err(Error::NotSupported("CBUS pins cannot report events; poll read_pin"))
    }

    /// Always fails: CBUS has no edge detection.
    pub fn register_callback<F>(&self, _pin: i32, _event: PinEvent, _callback: F) -> Result<()>
    where
        F: FnMut(PinIndex, PinEvent) + Send + 'static,
    {
        Err(Error::NotSupported("CBUS pins cannot report events; poll read_pin"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::sim::{Call, Op, SimulatedFt232r};
    use crate::transport::FtStatus;
    use std::thread;
    use test_case::test_case;

    fn setup() -> (SimulatedFt232r, DeviceSession<SimulatedFt232r>) {
        let sim = SimulatedFt232r::new();
        let session = DeviceSession::new(sim.clone());
        (sim, session)
    }

    fn mask(session: &DeviceSession<SimulatedFt232r>) -> u8 {
        session.register_snapshot().unwrap().bits()
    }

    #[test]
    fn register_tracks_writes_across_pins() {
        let (sim, session) = setup();
        let gpio = session.gpio().unwrap();

        gpio.open_pin(0).unwrap();
        gpio.set_pin_mode(0, PinMode::Output).unwrap();
        let mut expected = 0x10;
        assert_eq!(mask(&session), expected);

        gpio.write_pin(0, PinLevel::High).unwrap();
        expected |= 0x01;
        assert_eq!(mask(&session), expected);
        assert_eq!(expected, 0x11);

        gpio.write_pin(0, PinLevel::Low).unwrap();
        expected &= !0x01;
        assert_eq!(mask(&session), 0x10);

        gpio.open_pin(1).unwrap();
        gpio.set_pin_mode(1, PinMode::Output).unwrap();
        expected |= 0x20;
        gpio.write_pin(1, PinLevel::High).unwrap();
        expected |= 0x02;
        assert_eq!(mask(&session), expected);
        assert_eq!(expected, 0x32);

        // Each call was exactly one push, in order.
        assert_eq!(sim.pushed_masks(), vec![0x00, 0x10, 0x11, 0x10, 0x30, 0x32]);
        assert_eq!(sim.mask(), 0x32);
    }

    #[test]
    fn open_pushes_nothing() {
        let (sim, session) = setup();
        let gpio = session.gpio().unwrap();
        sim.clear_calls();
        gpio.open_pin(2).unwrap();
        assert!(sim.calls().is_empty());
    }

    #[test]
    fn double_open_is_rejected() {
        let (_sim, session) = setup();
        let gpio = session.gpio().unwrap();
        gpio.open_pin(1).unwrap();
        assert!(matches!(gpio.open_pin(1), Err(Error::AlreadyOpen(_))));
    }

    #[test]
    fn closed_pins_reject_mode_write_toggle_and_read() {
        let (sim, session) = setup();
        let gpio = session.gpio().unwrap();
        sim.clear_calls();

        assert!(matches!(gpio.set_pin_mode(0, PinMode::Output), Err(Error::NotOpen(_))));
        assert!(matches!(gpio.write_pin(0, PinLevel::High), Err(Error::NotOpen(_))));
        assert!(matches!(gpio.toggle_pin(0), Err(Error::NotOpen(_))));
        assert!(matches!(gpio.read_pin(0), Err(Error::NotOpen(_))));
        assert!(matches!(gpio.get_pin_mode(0), Err(Error::NotOpen(_))));

        gpio.open_pin(0).unwrap();
        gpio.close_pin(0).unwrap();
        assert!(matches!(gpio.toggle_pin(0), Err(Error::NotOpen(_))));

        // None of that reached the hardware.
        assert!(sim.calls().is_empty());
    }

    #[test]
    fn writes_to_inputs_fail_and_leave_register_alone() {
        let (sim, session) = setup();
        let gpio = session.gpio().unwrap();
        gpio.open_pin(3).unwrap();
        let before = mask(&session);

        assert!(matches!(gpio.write_pin(3, PinLevel::High), Err(Error::WrongDirection(_))));
        assert!(matches!(gpio.toggle_pin(3), Err(Error::WrongDirection(_))));
        assert_eq!(mask(&session), before);
        assert_eq!(sim.pushed_masks(), vec![0x00]);
    }

    #[test_case(-1 ; "negative")]
    #[test_case(4 ; "power enable line")]
    fn invalid_indices_rejected_everywhere(pin: i32) {
        let (sim, session) = setup();
        let gpio = session.gpio().unwrap();
        sim.clear_calls();

        let invalid = |r: Result<()>| matches!(r, Err(Error::InvalidIndex(i)) if i == pin);
        assert!(invalid(gpio.open_pin(pin)));
        assert!(invalid(gpio.close_pin(pin)));
        assert!(invalid(gpio.release_pin(pin)));
        assert!(invalid(gpio.set_pin_mode(pin, PinMode::Output)));
        assert!(invalid(gpio.get_pin_mode(pin).map(|_| ())));
        assert!(invalid(gpio.write_pin(pin, PinLevel::High)));
        assert!(invalid(gpio.read_pin(pin).map(|_| ())));
        assert!(invalid(gpio.toggle_pin(pin).map(|_| ())));
        assert!(invalid(gpio.is_pin_open(pin).map(|_| ())));
        assert!(sim.calls().is_empty());
    }

    #[test]
    fn failed_mode_push_keeps_previous_mode() {
        let (sim, session) = setup();
        let gpio = session.gpio().unwrap();
        gpio.open_pin(0).unwrap();

        sim.fail_next(Op::SetBitMode, FtStatus::IoError);
        let err = gpio.set_pin_mode(0, PinMode::Output).unwrap_err();
        match err {
            Error::DeviceIo { operation, source } => {
                assert_eq!(operation, "set CBUS mask");
                assert_eq!(source.status, FtStatus::IoError);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(gpio.get_pin_mode(0).unwrap(), PinMode::Input);
        assert_eq!(mask(&session), 0x00);
        assert_eq!(sim.mask(), 0x00);
    }

    #[test]
    fn failed_write_push_keeps_previous_value() {
        let (sim, session) = setup();
        let gpio = session.gpio().unwrap();
        gpio.open_pin(2).unwrap();
        gpio.set_pin_mode(2, PinMode::Output).unwrap();

        sim.fail_next(Op::SetBitMode, FtStatus::IoError);
        assert!(gpio.write_pin(2, PinLevel::High).is_err());
        assert_eq!(mask(&session), 0x40);

        // Toggle still works from the last good value.
        assert_eq!(gpio.toggle_pin(2).unwrap(), PinLevel::High);
        assert_eq!(mask(&session), 0x44);
    }

    #[test]
    fn read_goes_to_hardware_every_time() {
        let sim = SimulatedFt232r::new().with_read_noise(0xf0);
        let session = DeviceSession::new(sim.clone());
        let gpio = session.gpio().unwrap();
        gpio.open_pin(1).unwrap();
        gpio.set_pin_mode(1, PinMode::Input).unwrap();

        assert_eq!(gpio.read_pin(1).unwrap(), PinLevel::Low);
        sim.set_external_level(1, true);
        assert_eq!(gpio.read_pin(1).unwrap(), PinLevel::High);

        let reads = sim.calls().iter().filter(|c| **c == Call::BitMode).count();
        assert_eq!(reads, 2);
        // Reads never leak into the register.
        assert_eq!(mask(&session), 0x00);
    }

    #[test]
    fn read_failure_is_device_io() {
        let (sim, session) = setup();
        let gpio = session.gpio().unwrap();
        gpio.open_pin(0).unwrap();
        sim.fail_next(Op::BitMode, FtStatus::IoError);
        assert!(matches!(
            gpio.read_pin(0),
            Err(Error::DeviceIo { operation: "read CBUS pins", .. })
        ));
    }

    #[test]
    fn toggle_flips_last_written_level() {
        let (_sim, session) = setup();
        let gpio = session.gpio().unwrap();
        gpio.open_pin(0).unwrap();
        gpio.set_pin_mode(0, PinMode::Output).unwrap();

        assert_eq!(gpio.toggle_pin(0).unwrap(), PinLevel::High);
        assert_eq!(mask(&session), 0x11);
        assert_eq!(gpio.toggle_pin(0).unwrap(), PinLevel::Low);
        assert_eq!(mask(&session), 0x10);
    }

    #[test]
    fn close_leaves_line_driven_release_does_not() {
        let (sim, session) = setup();
        let gpio = session.gpio().unwrap();
        for pin in [0, 1] {
            gpio.open_pin(pin).unwrap();
            gpio.set_pin_mode(pin, PinMode::Output).unwrap();
            gpio.write_pin(pin, PinLevel::High).unwrap();
        }
        assert_eq!(sim.mask(), 0x33);

        gpio.close_pin(0).unwrap();
        assert_eq!(sim.mask(), 0x33);
        assert!(!gpio.is_pin_open(0).unwrap());

        gpio.release_pin(1).unwrap();
        assert_eq!(sim.mask(), 0x13);
        assert!(!gpio.is_pin_open(1).unwrap());
    }

    #[test]
    fn reopened_pin_starts_as_input_again() {
        let (sim, session) = setup();
        let gpio = session.gpio().unwrap();
        gpio.open_pin(0).unwrap();
        gpio.set_pin_mode(0, PinMode::Output).unwrap();
        gpio.write_pin(0, PinLevel::High).unwrap();
        gpio.close_pin(0).unwrap();
        sim.clear_calls();

        gpio.open_pin(0).unwrap();
        let index = PinIndex::try_from(0).unwrap();
        let output = session.register_snapshot().unwrap().direction(index);
        assert_eq!(output, gpio.get_pin_mode(0).unwrap() == PinMode::Output);
        assert_eq!(gpio.get_pin_mode(0).unwrap(), PinMode::Input);
        assert!(sim.calls().is_empty());
        assert_eq!(sim.mask(), 0x11);

        gpio.set_pin_mode(0, PinMode::Output).unwrap();
        assert_eq!(sim.mask(), 0x10);
        assert_eq!(gpio.toggle_pin(0).unwrap(), PinLevel::High);
        assert_eq!(sim.mask(), 0x11);
    }

    #[test]
    fn pull_modes_are_unsupported() {
        let (_sim, session) = setup();
        let gpio = session.gpio().unwrap();
        gpio.open_pin(0).unwrap();
        assert!(!gpio.is_pin_mode_supported(PinMode::InputPullUp));
        assert!(gpio.is_pin_mode_supported(PinMode::Output));
        assert!(matches!(
            gpio.set_pin_mode(0, PinMode::InputPullUp),
            Err(Error::UnsupportedMode(PinMode::InputPullUp))
        ));
    }

    #[test]
    fn events_are_not_supported() {
        let (_sim, session) = setup();
        let gpio = session.gpio().unwrap();
        assert!(matches!(
            gpio.wait_for_event(0, PinEvent::Rising, Duration::from_millis(10)),
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(
            gpio.register_callback(0, PinEvent::Falling, |_, _| {}),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn names_resolve_through_controller() {
        let (_sim, session) = setup();
        let gpio = session.gpio().unwrap();
        assert_eq!(gpio.pin_count(), 4);
        assert_eq!(gpio.pin_number("cbus2").unwrap(), 2);
        assert!(matches!(gpio.pin_number("CBUS4"), Err(Error::PinNotFound(_))));
    }

    #[test]
    fn concurrent_writers_never_lose_updates() {
        const WRITES: usize = 40;
        let (sim, session) = setup();
        let gpio = session.gpio().unwrap();
        for pin in [0, 1] {
            gpio.open_pin(pin).unwrap();
            gpio.set_pin_mode(pin, PinMode::Output).unwrap();
        }
        // Widen the window between computing a mask and landing it.
        sim.set_push_delay(Duration::from_micros(200));
        sim.clear_calls();

        thread::scope(|s| {
            for pin in [0, 1] {
                let session = &session;
                s.spawn(move || {
                    let gpio = session.gpio().unwrap();
                    for i in 0..WRITES {
                        gpio.write_pin(pin, PinLevel::from(i % 2 == 0)).unwrap();
                    }
                });
            }
        });

        let pushes = sim.pushed_masks();
        assert_eq!(pushes.len(), 2 * WRITES);
        // Every write flips exactly one pin; a lost update would show up as a
        // push that also reverts the other pin's bit.
        let mut previous = 0x30;
        for mask in pushes {
            assert_eq!(mask & 0xf0, 0x30);
            assert_eq!((previous ^ mask).count_ones(), 1, "{previous:#04x} -> {mask:#04x}");
            previous = mask;
        }
        assert_eq!(sim.mask(), 0x30);
        assert_eq!(mask(&session), 0x30);
    }
}
