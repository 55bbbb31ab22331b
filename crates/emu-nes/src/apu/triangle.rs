use super::units::LengthCounter;
use serde::{Deserialize, Serialize};

#[rustfmt::skip]
const SEQUENCE: [u8; 32] = [
    15, 14, 13, 12, 11, 10,  9,  8,  7,  6,  5,  4,  3,  2,  1,  0,
     0,  1,  2,  3,  4,  5,  6,  7,  8,  9, 10, 11, 12, 13, 14, 15,
];

/// Triangle voice: 32-step sequence clocked at CPU rate, gated by both the
/// length counter and the linear counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    master_clock_divider: u32,
    enabled: bool,
    control: bool,
    linear_reload_value: u8,
    linear_counter: u8,
    linear_reload: bool,
    timer_period: u16,
    timer_tick: u32,
    sequence_pos: u8,
    pub length: LengthCounter,
}

impl Triangle {
    pub fn new(master_clock_divider: u32) -> Triangle {
        Triangle {
            master_clock_divider,
            enabled: false,
            control: false,
            linear_reload_value: 0,
            linear_counter: 0,
            linear_reload: false,
            timer_period: 0,
            timer_tick: 0,
            sequence_pos: 0,
            length: LengthCounter::new(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.length.set_enabled(enabled);
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// $4008: control flag + linear counter reload value.
    pub fn write_linear(&mut self, value: u8) {
        self.control = value & 0x80 != 0;
        self.length.set_halt(self.control);
        self.linear_reload_value = value & 0x7F;
    }

    /// $400A
    pub fn write_timer_low(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x0700) | value as u16;
    }

    /// $400B
    pub fn write_timer_high(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | (((value & 0x07) as u16) << 8);
        self.length.load_index(value >> 3);
        self.linear_reload = true;
    }

    pub fn update(&mut self, ticks: u32) {
        if !self.length.active() || self.linear_counter == 0 {
            return;
        }
        // Ultrasonic periods would just thrash the sequencer; hold instead.
        if self.timer_period < 2 {
            return;
        }
        let period = (self.timer_period as u32 + 1) * self.master_clock_divider;
        self.timer_tick += ticks;
        while self.timer_tick >= period {
            self.timer_tick -= period;
            self.sequence_pos = (self.sequence_pos + 1) & 31;
        }
    }

    pub fn clock_quarter(&mut self) {
        if self.linear_reload {
            self.linear_counter = self.linear_reload_value;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        if !self.control {
            self.linear_reload = false;
        }
    }

    pub fn clock_half(&mut self) {
        self.length.clock();
    }

    pub fn output(&self) -> u8 {
        if !self.enabled {
            return 0;
        }
        SEQUENCE[self.sequence_pos as usize]
    }
}
