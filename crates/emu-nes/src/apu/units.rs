use serde::{Deserialize, Serialize};

/* Source: nes-test-roms/apu_test/source/2-len_table.s
   table:  .byte 10, 254, 20,  2, 40,  4, 80,  6
           .byte 160,  8, 60, 10, 14, 12, 26, 14
           .byte 12,  16, 24, 18, 48, 20, 96, 22
           .byte 192, 24, 72, 26, 16, 28, 32, 30
*/
#[rustfmt::skip]
const LENGTH_LOOKUP: [u8; 32] = [
    10, 254, 20,  2, 40,  4, 80,  6,
    160,  8, 60, 10, 14, 12, 26, 14,
    12,  16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

/// Note-cutoff counter clocked at half-frame rate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthCounter {
    enabled: bool,
    halted: bool,
    value: u8,
}

impl LengthCounter {
    pub fn new() -> LengthCounter {
        LengthCounter::default()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.value = 0;
        }
    }

    pub fn set_halt(&mut self, halted: bool) {
        self.halted = halted;
    }

    pub fn load_index(&mut self, index: u8) {
        // ignore load when the channel is disabled
        if !self.enabled {
            return;
        }
        self.value = LENGTH_LOOKUP[(index & 0x1F) as usize];
    }

    pub fn clock(&mut self) {
        if self.value > 0 && !self.halted {
            self.value -= 1;
        }
    }

    pub fn active(&self) -> bool {
        self.value > 0
    }
}

/// Amplitude decay unit clocked at quarter-frame rate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    start: bool,
    loop_flag: bool,
    constant: bool,
    period: u8,
    divider: u8,
    decay: u8,
}

impl Envelope {
    pub fn new() -> Envelope {
        Envelope::default()
    }

    /// Register bits: ..LC VVVV (loop/halt, constant volume, period).
    pub fn write_control(&mut self, value: u8) {
        self.loop_flag = value & 0x20 != 0;
        self.constant = value & 0x10 != 0;
        self.period = value & 0x0F;
    }

    pub fn restart(&mut self) {
        self.start = true;
    }

    pub fn clock(&mut self) {
        if self.start {
            self.start = false;
            self.decay = 15;
            self.divider = self.period;
            return;
        }
        if self.divider > 0 {
            self.divider -= 1;
            return;
        }
        self.divider = self.period;
        if self.decay > 0 {
            self.decay -= 1;
        } else if self.loop_flag {
            self.decay = 15;
        }
    }

    pub fn volume(&self) -> u8 {
        if self.constant { self.period } else { self.decay }
    }
}

/// Pulse frequency modulation unit clocked at half-frame rate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sweep {
    enabled: bool,
    period: u8,
    negate: bool,
    shift: u8,
    divider: u8,
    reload: bool,
    // Pulse 1 negates with ones' complement, pulse 2 with two's.
    ones_complement: bool,
}

impl Sweep {
    pub fn new(ones_complement: bool) -> Sweep {
        Sweep {
            ones_complement,
            ..Sweep::default()
        }
    }

    pub fn write_control(&mut self, value: u8) {
        self.enabled = value & 0x80 != 0;
        self.period = (value >> 4) & 0x07;
        self.negate = value & 0x08 != 0;
        self.shift = value & 0x07;
        self.reload = true;
    }

    pub fn target_period(&self, current: u16) -> u16 {
        let change = current >> self.shift;
        if self.negate {
            let delta = if self.ones_complement { change + 1 } else { change };
            current.saturating_sub(delta)
        } else {
            current + change
        }
    }

    /// True when the sweep unit forces the channel silent.
    pub fn mutes(&self, current: u16) -> bool {
        current < 8 || (!self.negate && self.target_period(current) > 0x7FF)
    }

    /// Half-frame clock; returns the new period when an update fires.
    pub fn clock(&mut self, current: u16) -> Option<u16> {
        let mut updated = None;
        if self.divider == 0 && self.enabled && self.shift > 0 && !self.mutes(current) {
            updated = Some(self.target_period(current) & 0x7FF);
        }
        if self.divider == 0 || self.reload {
            self.divider = self.period;
            self.reload = false;
        } else {
            self.divider -= 1;
        }
        updated
    }
}
