use crate::bus::GbEvent;
use crate::interrupts::{Interrupts, Signal};
use emu_core::clock::{Clock, ClockListener, Tick};
use emu_core::savestate::{self, SaveStateError};
use serde::{Deserialize, Serialize};

/// Machine ticks per TIMA step for each TAC rate selection.
const TAC_PERIODS: [Tick; 4] = [1024, 16, 64, 256];

/// DIV steps once every 256 machine ticks (16384 Hz) and wraps at 256.
const DIV_PERIOD: Tick = 256;
const DIV_CYCLE: Tick = DIV_PERIOD * 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub version: u32,
    pub tac: u8,
    pub tma: u8,
    pub tima_base: u16,
    pub base_tick: Tick,
    pub div_base_tick: Tick,
    pub overflow_tick: Tick,
}

pub const TIMER_STATE_VERSION: u32 = 1;

/// DIV/TIMA/TMA/TAC. TIMA is computed from elapsed ticks on demand and the
/// overflow is predicted as a clock event instead of counting every step.
#[derive(Debug, Clone)]
pub struct Timer {
    tac: u8,
    tma: u8,
    /// TIMA value as of `base_tick`.
    tima_base: u16,
    base_tick: Tick,
    div_base_tick: Tick,
    overflow_tick: Tick,
}

impl Timer {
    pub fn new() -> Timer {
        Timer {
            tac: 0,
            tma: 0,
            tima_base: 0,
            base_tick: 0,
            div_base_tick: 0,
            overflow_tick: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Timer::new();
    }

    fn enabled(&self) -> bool {
        self.tac & 0x04 != 0
    }

    fn period(&self) -> Tick {
        TAC_PERIODS[(self.tac & 0x03) as usize]
    }

    fn tima_at(&self, tick: Tick) -> u16 {
        if self.enabled() {
            self.tima_base + ((tick - self.base_tick) / self.period()) as u16
        } else {
            self.tima_base
        }
    }

    fn schedule(&mut self, clock: &mut Clock<GbEvent>, tick: Tick) {
        if !self.enabled() {
            return;
        }
        let remaining = 0x100 - self.tima_at(tick).min(0xFF);
        self.overflow_tick = tick + remaining as Tick * self.period();
        clock.add_event(GbEvent::TimerOverflow, self.overflow_tick);
    }

    /// Frame boundaries clear the event queue; re-post the predicted
    /// overflow.
    pub fn begin_frame(&mut self, clock: &mut Clock<GbEvent>) {
        if self.enabled() {
            clock.add_event(GbEvent::TimerOverflow, self.overflow_tick);
        }
    }

    pub fn on_overflow(
        &mut self,
        clock: &mut Clock<GbEvent>,
        interrupts: &mut Interrupts,
        tick: Tick,
    ) {
        if tick != self.overflow_tick {
            return; // stale event from a reschedule
        }
        self.tima_base = self.tma as u16;
        self.base_tick = tick;
        interrupts.raise(Signal::Timer);
        self.schedule(clock, tick);
    }

    // --- register file ---------------------------------------------------

    pub fn read_div(&self, tick: Tick) -> u8 {
        (((tick - self.div_base_tick) / DIV_PERIOD) & 0xFF) as u8
    }

    /// Any write resets DIV and the shared prescaler.
    pub fn write_div(&mut self, clock: &mut Clock<GbEvent>, tick: Tick) {
        self.div_base_tick = tick;
        self.tima_base = self.tima_at(tick);
        self.base_tick = tick;
        self.schedule(clock, tick);
    }

    pub fn read_tima(&self, tick: Tick) -> u8 {
        self.tima_at(tick) as u8
    }

    pub fn write_tima(&mut self, clock: &mut Clock<GbEvent>, tick: Tick, value: u8) {
        self.tima_base = value as u16;
        self.base_tick = tick;
        self.schedule(clock, tick);
    }

    pub fn read_tma(&self) -> u8 {
        self.tma
    }

    pub fn write_tma(&mut self, value: u8) {
        self.tma = value;
    }

    pub fn read_tac(&self) -> u8 {
        0xF8 | self.tac
    }

    pub fn write_tac(&mut self, clock: &mut Clock<GbEvent>, tick: Tick, value: u8) {
        // Latch the counter under the old rate before switching.
        self.tima_base = self.tima_at(tick);
        self.base_tick = tick;
        self.tac = value & 0x07;
        self.schedule(clock, tick);
    }

    // --- serialization ---------------------------------------------------

    pub fn save_state(&self) -> TimerState {
        TimerState {
            version: TIMER_STATE_VERSION,
            tac: self.tac,
            tma: self.tma,
            tima_base: self.tima_base,
            base_tick: self.base_tick,
            div_base_tick: self.div_base_tick,
            overflow_tick: self.overflow_tick,
        }
    }

    pub fn restore_state(&mut self, state: &TimerState) -> Result<(), SaveStateError> {
        savestate::check_version("timer", state.version, TIMER_STATE_VERSION)?;
        self.tac = state.tac;
        self.tma = state.tma;
        self.tima_base = state.tima_base;
        self.base_tick = state.base_tick;
        self.div_base_tick = state.div_base_tick;
        self.overflow_tick = state.overflow_tick;
        Ok(())
    }
}

impl ClockListener for Timer {
    fn set_desired_ticks(&mut self, _ticks: Tick) {}

    fn advance_clock(&mut self, ticks: Tick) {
        self.base_tick -= ticks;
        self.overflow_tick -= ticks;
        self.div_base_tick -= ticks;
        // Keep the free-running DIV phase bounded across very long runs.
        if self.div_base_tick < -DIV_CYCLE {
            self.div_base_tick = self.div_base_tick.rem_euclid(DIV_CYCLE) - DIV_CYCLE;
        }
        if !self.enabled() && self.base_tick < -DIV_CYCLE {
            self.base_tick = 0;
        }
    }

    fn reset_clock(&mut self) {
        self.base_tick = 0;
        self.div_base_tick = 0;
        self.overflow_tick = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_counts_at_16384_hz() {
        let timer = Timer::new();
        assert_eq!(timer.read_div(0), 0);
        assert_eq!(timer.read_div(256), 1);
        assert_eq!(timer.read_div(256 * 256), 0, "wraps at 256 steps");
    }

    #[test]
    fn div_write_resets_the_count() {
        let mut timer = Timer::new();
        let mut clock = Clock::new();
        timer.write_div(&mut clock, 1000);
        assert_eq!(timer.read_div(1000), 0);
        assert_eq!(timer.read_div(1256), 1);
    }

    #[test]
    fn tima_advances_at_the_selected_rate() {
        let mut timer = Timer::new();
        let mut clock = Clock::new();
        timer.write_tac(&mut clock, 0, 0x05); // enabled, 16-tick period
        assert_eq!(timer.read_tima(0), 0);
        assert_eq!(timer.read_tima(160), 10);
    }

    #[test]
    fn overflow_reloads_tma_and_raises_the_interrupt() {
        let mut timer = Timer::new();
        let mut clock = Clock::new();
        let mut ints = Interrupts::new();
        timer.write_tma(0xF0);
        timer.write_tima(&mut clock, 0, 0xFE);
        timer.write_tac(&mut clock, 0, 0x05);

        // Two steps of 16 ticks to overflow.
        let overflow = timer.overflow_tick;
        assert_eq!(overflow, 32);
        timer.on_overflow(&mut clock, &mut ints, overflow);
        assert_eq!(timer.read_tima(overflow), 0xF0);
        assert_ne!(ints.read_if() & 0x04, 0);
    }

    #[test]
    fn stale_overflow_events_are_ignored() {
        let mut timer = Timer::new();
        let mut clock = Clock::new();
        let mut ints = Interrupts::new();
        timer.write_tima(&mut clock, 0, 0xFE);
        timer.write_tac(&mut clock, 0, 0x05);
        let stale = timer.overflow_tick;
        timer.write_tima(&mut clock, 0, 0x00); // reschedules
        timer.on_overflow(&mut clock, &mut ints, stale);
        assert_eq!(ints.read_if() & 0x04, 0);
    }

    #[test]
    fn disabled_timer_holds_its_value() {
        let mut timer = Timer::new();
        let mut clock = Clock::new();
        timer.write_tima(&mut clock, 0, 0x42);
        assert_eq!(timer.read_tima(100_000), 0x42);
    }
}
