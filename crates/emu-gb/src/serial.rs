use crate::bus::GbEvent;
use crate::interrupts::{Interrupts, Signal};
use emu_core::clock::{Clock, ClockListener, Tick};
use emu_core::savestate::{self, SaveStateError};
use serde::{Deserialize, Serialize};

/// 8192 Hz bit clock: 512 machine ticks per bit, eight bits per transfer.
const TRANSFER_TICKS: Tick = 8 * 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialState {
    pub version: u32,
    pub sb: u8,
    pub sc: u8,
    pub done_tick: Tick,
    pub output: Vec<u8>,
}

pub const SERIAL_STATE_VERSION: u32 = 1;

/// SB/SC link port. With no peer attached a transfer shifts in $FF; every
/// byte shifted out is captured so test harnesses can read what a ROM
/// printed over the link.
#[derive(Debug, Clone, Default)]
pub struct Serial {
    sb: u8,
    sc: u8,
    done_tick: Tick,
    output: Vec<u8>,
}

impl Serial {
    pub fn new() -> Serial {
        Serial::default()
    }

    pub fn reset(&mut self) {
        self.sb = 0;
        self.sc = 0;
        self.done_tick = 0;
        self.output.clear();
    }

    /// Bytes the program has pushed out the wire so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    fn transfer_active(&self) -> bool {
        self.sc & 0x81 == 0x81
    }

    pub fn begin_frame(&mut self, clock: &mut Clock<GbEvent>) {
        if self.transfer_active() {
            clock.add_event(GbEvent::SerialDone, self.done_tick);
        }
    }

    pub fn read_sb(&self) -> u8 {
        self.sb
    }

    pub fn write_sb(&mut self, value: u8) {
        self.sb = value;
    }

    pub fn read_sc(&self) -> u8 {
        0x7E | self.sc
    }

    /// Bit 7 with the internal-clock bit starts a transfer. The outgoing
    /// byte is captured here: programs often queue the next byte before
    /// the previous transfer window has elapsed.
    pub fn write_sc(&mut self, clock: &mut Clock<GbEvent>, tick: Tick, value: u8) {
        self.sc = value & 0x81;
        if self.transfer_active() {
            self.output.push(self.sb);
            self.done_tick = tick + TRANSFER_TICKS;
            clock.add_event(GbEvent::SerialDone, self.done_tick);
        }
    }

    pub fn on_transfer_done(&mut self, interrupts: &mut Interrupts, tick: Tick) {
        if tick != self.done_tick || !self.transfer_active() {
            return;
        }
        // No peer: all ones clock in.
        self.sb = 0xFF;
        self.sc &= !0x80;
        interrupts.raise(Signal::Serial);
    }

    pub fn save_state(&self) -> SerialState {
        SerialState {
            version: SERIAL_STATE_VERSION,
            sb: self.sb,
            sc: self.sc,
            done_tick: self.done_tick,
            output: self.output.clone(),
        }
    }

    pub fn restore_state(&mut self, state: &SerialState) -> Result<(), SaveStateError> {
        savestate::check_version("serial", state.version, SERIAL_STATE_VERSION)?;
        self.sb = state.sb;
        self.sc = state.sc;
        self.done_tick = state.done_tick;
        self.output = state.output.clone();
        Ok(())
    }
}

impl ClockListener for Serial {
    fn set_desired_ticks(&mut self, _ticks: Tick) {}

    fn advance_clock(&mut self, ticks: Tick) {
        self.done_tick -= ticks;
    }

    fn reset_clock(&mut self) {
        self.done_tick = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_captures_the_byte_and_raises_serial() {
        let mut serial = Serial::new();
        let mut clock = Clock::new();
        let mut ints = Interrupts::new();

        serial.write_sb(b'P');
        serial.write_sc(&mut clock, 100, 0x81);
        assert_eq!(clock.pending_events(), 1);

        serial.on_transfer_done(&mut ints, serial.done_tick);
        assert_eq!(serial.output(), b"P");
        assert_eq!(serial.read_sb(), 0xFF);
        assert_eq!(serial.read_sc() & 0x80, 0, "transfer flag cleared");
        assert_ne!(ints.read_if() & 0x08, 0);
    }

    #[test]
    fn external_clock_never_completes() {
        let mut serial = Serial::new();
        let mut clock = Clock::new();
        serial.write_sb(0x42);
        serial.write_sc(&mut clock, 0, 0x80); // external clock, no peer
        assert_eq!(clock.pending_events(), 0);
    }

    #[test]
    fn successive_transfers_build_a_message() {
        let mut serial = Serial::new();
        let mut clock = Clock::new();
        let mut ints = Interrupts::new();
        for &byte in b"Passed\n" {
            serial.write_sb(byte);
            serial.write_sc(&mut clock, 0, 0x81);
            serial.on_transfer_done(&mut ints, serial.done_tick);
        }
        assert_eq!(serial.output(), b"Passed\n");
    }
}
