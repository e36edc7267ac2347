//! Simulated FT232R transport.
//!
//! An in-memory stand-in for the bridge chip, used by the test suite and by
//! the monitor daemon's dry-run mode. Clones share the same device state, so a
//! test can hand one clone to a [`crate::session::DeviceSession`] and keep
//! another to inject faults, drive input levels and inspect what was pushed.
//!
//! Only calls that succeed are recorded in the call history.

use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{BitMode, FtStatus, Purge, Transport, TransportError, TransportResult};

/// Transport operations, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Open,
    Reset,
    SetBitMode,
    BitMode,
    Read,
    Write,
    SetBaudRate,
    SetDataCharacteristics,
    SetFlowControl,
    SetTimeouts,
    Purge,
    QueueStatus,
}

/// A completed transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Open,
    Reset,
    SetBitMode { mask: u8, mode: BitMode },
    BitMode,
    Read { requested: usize, returned: usize },
    Write { requested: usize, accepted: usize },
    SetBaudRate(u32),
    SetDataCharacteristics { word_length: u8, stop_bits: u8, parity: u8 },
    SetFlowControl { flow: u16, xon: u8, xoff: u8 },
    SetTimeouts { read_ms: Option<u32>, write_ms: Option<u32> },
    Purge(Purge),
    QueueStatus,
}

struct SimState {
    open: bool,
    mode: BitMode,
    mask: u8,
    /// Levels driven onto the lines from outside, seen on input pins
    external_levels: u8,
    /// Bits OR-ed into every bit-mode read, to model undefined upper bits
    read_noise: u8,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    /// Bytes emitted into the receive queue when CBUS bit-bang is entered
    mode_switch_junk: Vec<u8>,
    write_limit: Option<usize>,
    push_delay: Duration,
    failures: HashMap<Op, FtStatus>,
    calls: Vec<Call>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            open: false,
            mode: BitMode::Reset,
            mask: 0,
            external_levels: 0,
            read_noise: 0,
            rx: VecDeque::new(),
            tx: Vec::new(),
            mode_switch_junk: Vec::new(),
            write_limit: None,
            push_delay: Duration::ZERO,
            failures: HashMap::new(),
            calls: Vec::new(),
        }
    }
}

/// Simulated bridge chip.
#[derive(Clone, Default)]
pub struct SimulatedFt232r {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedFt232r {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `junk` into the receive queue each time CBUS bit-bang is entered.
    pub fn with_mode_switch_junk(self, junk: &[u8]) -> Self {
        self.state.lock().mode_switch_junk = junk.to_vec();
        self
    }

    /// OR `noise` into every bit-mode read.
    pub fn with_read_noise(self, noise: u8) -> Self {
        self.state.lock().read_noise = noise;
        self
    }

    /// Make the next call of `op` fail with `status`.
    pub fn fail_next(&self, op: Op, status: FtStatus) {
        self.state.lock().failures.insert(op, status);
    }

    /// Drive an input line from outside the chip.
    pub fn set_external_level(&self, index: u8, high: bool) {
        let mut state = self.state.lock();
        if high {
            state.external_levels |= 1 << index;
        } else {
            state.external_levels &= !(1 << index);
        }
    }

    /// Queue bytes as if received on the UART.
    pub fn feed_rx(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes.iter().copied());
    }

    /// Take everything written to the UART so far.
    pub fn take_tx(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().tx)
    }

    /// Accept at most `limit` bytes per write.
    pub fn limit_writes(&self, limit: usize) {
        self.state.lock().write_limit = Some(limit);
    }

    /// Stall every bit-mode push for `delay`, outside the simulator's lock.
    pub fn set_push_delay(&self, delay: Duration) {
        self.state.lock().push_delay = delay;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Every mask pushed under CBUS bit-bang, in order.
    pub fn pushed_masks(&self) -> Vec<u8> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::SetBitMode {
                    mask,
                    mode: BitMode::CbusBitbang,
                } => Some(*mask),
                _ => None,
            })
            .collect()
    }

    pub fn mask(&self) -> u8 {
        self.state.lock().mask
    }

    pub fn mode(&self) -> BitMode {
        self.state.lock().mode
    }

    pub fn rx_pending(&self) -> usize {
        self.state.lock().rx.len()
    }

    fn begin(&self, op: Op) -> TransportResult<MutexGuard<'_, SimState>> {
        let mut state = self.state.lock();
        if let Some(status) = state.failures.remove(&op) {
            return Err(TransportError::new(status));
        }
        if op != Op::Open && !state.open {
            return Err(TransportError::new(FtStatus::DeviceNotOpened));
        }
        Ok(state)
    }
}

impl Transport for SimulatedFt232r {
    fn open(&mut self) -> TransportResult<()> {
        let mut state = self.begin(Op::Open)?;
        state.open = true;
        state.calls.push(Call::Open);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn reset(&mut self) -> TransportResult<()> {
        let mut state = self.begin(Op::Reset)?;
        state.mode = BitMode::Reset;
        state.mask = 0;
        state.rx.clear();
        state.calls.push(Call::Reset);
        Ok(())
    }

    fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> TransportResult<()> {
        let delay = self.begin(Op::SetBitMode)?.push_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if mode == BitMode::CbusBitbang && state.mode != BitMode::CbusBitbang {
            let junk = state.mode_switch_junk.clone();
            state.rx.extend(junk);
        }
        state.mode = mode;
        state.mask = mask;
        state.calls.push(Call::SetBitMode { mask, mode });
        Ok(())
    }

    fn bit_mode(&mut self) -> TransportResult<u8> {
        let mut state = self.begin(Op::BitMode)?;
        let levels = if state.mode == BitMode::CbusBitbang {
            let outputs = state.mask >> 4;
            (state.mask & outputs) | (state.external_levels & !outputs)
        } else {
            state.external_levels
        };
        state.calls.push(Call::BitMode);
        Ok((levels & 0x0f) | state.read_noise)
    }

    fn read(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        let mut state = self.begin(Op::Read)?;
        let count = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..count)) {
            *slot = byte;
        }
        state.calls.push(Call::Read {
            requested: buf.len(),
            returned: count,
        });
        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> TransportResult<usize> {
        let mut state = self.begin(Op::Write)?;
        let accepted = state.write_limit.map_or(buf.len(), |limit| buf.len().min(limit));
        state.tx.extend_from_slice(&buf[..accepted]);
        state.calls.push(Call::Write {
            requested: buf.len(),
            accepted,
        });
        Ok(accepted)
    }

    fn set_baud_rate(&mut self, baud: u32) -> TransportResult<()> {
        let mut state = self.begin(Op::SetBaudRate)?;
        state.calls.push(Call::SetBaudRate(baud));
        Ok(())
    }

    fn set_data_characteristics(
        &mut self,
        word_length: u8,
        stop_bits: u8,
        parity: u8,
    ) -> TransportResult<()> {
        let mut state = self.begin(Op::SetDataCharacteristics)?;
        state.calls.push(Call::SetDataCharacteristics {
            word_length,
            stop_bits,
            parity,
        });
        Ok(())
    }

    fn set_flow_control(&mut self, flow: u16, xon: u8, xoff: u8) -> TransportResult<()> {
        let mut state = self.begin(Op::SetFlowControl)?;
        state.calls.push(Call::SetFlowControl { flow, xon, xoff });
        Ok(())
    }

    fn set_timeouts(&mut self, read_ms: Option<u32>, write_ms: Option<u32>) -> TransportResult<()> {
        let mut state = self.begin(Op::SetTimeouts)?;
        state.calls.push(Call::SetTimeouts { read_ms, write_ms });
        Ok(())
    }

    fn purge(&mut self, buffers: Purge) -> TransportResult<()> {
        let mut state = self.begin(Op::Purge)?;
        if buffers.contains(Purge::RX) {
            state.rx.clear();
        }
        if buffers.contains(Purge::TX) {
            state.tx.clear();
        }
        state.calls.push(Call::Purge(buffers));
        Ok(())
    }

    fn queue_status(&mut self) -> TransportResult<usize> {
        let mut state = self.begin(Op::QueueStatus)?;
        state.calls.push(Call::QueueStatus);
        Ok(state.rx.len())
    }
}
