mod noise;
mod square;
mod units;
mod wave;

use crate::bus::GbEvent;
use emu_core::clock::{Clock, ClockListener, Tick};
use emu_core::savestate::{self, SaveStateError};
use noise::Noise;
use serde::{Deserialize, Serialize};
use square::Square;
use wave::Wave;

const MASTER_CLOCK_FREQUENCY: u32 = 4_194_304;

/// 512 Hz frame sequencer.
const SEQUENCER_PERIOD: Tick = (MASTER_CLOCK_FREQUENCY / 512) as Tick;

const REG_BASE: u32 = 0x10;
const WAVE_RAM_BASE: u32 = 0x30;

/// Read-back OR masks for $FF10-$FF2F; unused bits always read as ones.
#[rustfmt::skip]
const READ_MASKS: [u8; 0x20] = [
    0x80, 0x3F, 0x00, 0xFF, 0xBF, // NR10-NR14
    0xFF, 0x3F, 0x00, 0xFF, 0xBF, // NR20-NR24
    0x7F, 0xFF, 0x9F, 0xFF, 0xBF, // NR30-NR34
    0xFF, 0xFF, 0x00, 0x00, 0xBF, // NR40-NR44
    0x00, 0x00, 0x70,             // NR50-NR52
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioState {
    pub version: u32,
    pub power: bool,
    pub nr50: u8,
    pub nr51: u8,
    pub regs: Vec<u8>,
    pub wave_ram: Vec<u8>,
    pub square1: Square,
    pub square2: Square,
    pub wave: Wave,
    pub noise: Noise,
    pub sequence_step: u32,
    pub sequence_tick: Tick,
    pub sample_tick: Tick,
    pub updated_tick: Tick,
    pub desired_ticks: Tick,
}

pub const AUDIO_STATE_VERSION: u32 = 1;

/// Four-voice audio unit. Voices are pulled forward on demand; the frame
/// sequencer steps length, sweep and envelope units from clock events at
/// the 512 Hz cadence.
pub struct Audio {
    power: bool,
    nr50: u8,
    nr51: u8,
    regs: [u8; 0x20],
    wave_ram: [u8; 16],

    square1: Square,
    square2: Square,
    wave: Wave,
    noise: Noise,

    sequence_step: u32,
    sequence_tick: Tick,

    buffer: Vec<i16>,
    buffer_pos: usize,
    sample_period: Tick,
    sample_tick: Tick,
    last_sample: i16,

    updated_tick: Tick,
    desired_ticks: Tick,
}

impl Audio {
    pub fn new() -> Audio {
        // Post-boot defaults: full volume, everything routed.
        let mut regs = [0u8; 0x20];
        regs[0x14] = 0x77;
        regs[0x15] = 0xF3;
        Audio {
            power: true,
            nr50: 0x77,
            nr51: 0xF3,
            regs,
            wave_ram: [0; 16],
            square1: Square::new(true),
            square2: Square::new(false),
            wave: Wave::new(),
            noise: Noise::new(),
            sequence_step: 0,
            sequence_tick: SEQUENCER_PERIOD,
            buffer: Vec::new(),
            buffer_pos: 0,
            sample_period: 0,
            sample_tick: 0,
            last_sample: 0,
            updated_tick: 0,
            desired_ticks: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Audio {
            buffer: std::mem::take(&mut self.buffer),
            sample_period: self.sample_period,
            ..Audio::new()
        };
    }

    pub fn set_sound_samples_per_frame(&mut self, samples: usize) {
        self.buffer = vec![0; samples];
        self.buffer_pos = 0;
        if samples > 0 {
            self.sample_period = (MASTER_CLOCK_FREQUENCY / (60 * samples as u32) + 1) as Tick;
        }
    }

    pub fn sound_buffer(&self) -> &[i16] {
        &self.buffer
    }

    pub fn begin_frame(&mut self, clock: &mut Clock<GbEvent>) {
        self.buffer_pos = 0;
        clock.add_event(GbEvent::ApuSequence, self.sequence_tick);
    }

    pub fn end_frame(&mut self) {
        while self.buffer_pos < self.buffer.len() {
            self.buffer[self.buffer_pos] = self.last_sample;
            self.buffer_pos += 1;
        }
    }

    // --- register file ($FF10-$FF3F relative to $FF00) --------------------

    pub fn reg_read(&mut self, tick: Tick, index: u32) -> u8 {
        if index >= WAVE_RAM_BASE {
            return self.wave_ram[(index - WAVE_RAM_BASE) as usize];
        }
        let rel = (index - REG_BASE) as usize;
        match index {
            0x26 => {
                self.advance_voices(tick);
                let mut value = 0x70;
                if self.power {
                    value |= 0x80;
                }
                if self.square1.enabled() {
                    value |= 0x01;
                }
                if self.square2.enabled() {
                    value |= 0x02;
                }
                if self.wave.enabled() {
                    value |= 0x04;
                }
                if self.noise.enabled() {
                    value |= 0x08;
                }
                value
            }
            _ => self.regs[rel] | READ_MASKS[rel],
        }
    }

    pub fn reg_write(&mut self, tick: Tick, index: u32, value: u8) {
        if index >= WAVE_RAM_BASE {
            self.wave_ram[(index - WAVE_RAM_BASE) as usize] = value;
            return;
        }
        if !self.power && index != 0x26 {
            log::trace!("APU write while powered off: ${:04X}", 0xFF00 + index);
            return;
        }
        self.advance_voices(tick);
        self.regs[(index - REG_BASE) as usize] = value;

        match index {
            0x10 => self.square1.write_sweep(value),
            0x11 => self.square1.write_length(value),
            0x12 => self.square1.write_envelope(value),
            0x13 => self.square1.write_freq_low(value),
            0x14 => self.square1.write_freq_high(value),

            0x16 => self.square2.write_length(value),
            0x17 => self.square2.write_envelope(value),
            0x18 => self.square2.write_freq_low(value),
            0x19 => self.square2.write_freq_high(value),

            0x1A => self.wave.write_dac(value),
            0x1B => self.wave.write_length(value),
            0x1C => self.wave.write_level(value),
            0x1D => self.wave.write_freq_low(value),
            0x1E => self.wave.write_freq_high(value),

            0x20 => self.noise.write_length(value),
            0x21 => self.noise.write_envelope(value),
            0x22 => self.noise.write_poly(value),
            0x23 => self.noise.write_control(value),

            0x24 => self.nr50 = value,
            0x25 => self.nr51 = value,
            0x26 => {
                let power = value & 0x80 != 0;
                if self.power && !power {
                    self.power_off();
                }
                if !self.power && power {
                    self.sequence_step = 0;
                }
                self.power = power;
            }
            _ => {
                log::debug!("write to unimplemented APU register ${:04X}", 0xFF00 + index);
            }
        }
    }

    /// Powering the unit down zeroes the whole register file; wave RAM
    /// survives.
    fn power_off(&mut self) {
        self.regs = [0; 0x20];
        self.nr50 = 0;
        self.nr51 = 0;
        self.square1 = Square::new(true);
        self.square2 = Square::new(false);
        self.wave = Wave::new();
        self.noise = Noise::new();
    }

    // --- frame sequencer -------------------------------------------------

    pub fn on_sequence_event(&mut self, clock: &mut Clock<GbEvent>, tick: Tick) {
        if tick != self.sequence_tick {
            return;
        }
        self.advance_voices(tick);

        if self.power {
            let step = self.sequence_step % 8;
            if step % 2 == 0 {
                self.square1.clock_length();
                self.square2.clock_length();
                self.wave.clock_length();
                self.noise.clock_length();
            }
            if step == 2 || step == 6 {
                self.square1.clock_sweep();
            }
            if step == 7 {
                self.square1.clock_envelope();
                self.square2.clock_envelope();
                self.noise.clock_envelope();
            }
        }
        self.sequence_step += 1;

        self.sequence_tick = tick + SEQUENCER_PERIOD;
        clock.add_event(GbEvent::ApuSequence, self.sequence_tick);
    }

    // --- sampling --------------------------------------------------------

    fn advance_voices(&mut self, to: Tick) {
        let elapsed = to - self.updated_tick;
        if elapsed <= 0 {
            return;
        }
        let ticks = elapsed as u32;
        self.square1.update(ticks);
        self.square2.update(ticks);
        self.wave.update(ticks, &self.wave_ram);
        self.noise.update(ticks);
        self.updated_tick = to;
    }

    /// NR51 routes each voice to each output terminal; NR50 scales the
    /// terminals, and the mono host buffer carries their average.
    fn mix(&self) -> i16 {
        if !self.power {
            return 0;
        }
        let outputs = [
            self.square1.output(),
            self.square2.output(),
            self.wave.output(),
            self.noise.output(),
        ];
        let mut so1 = 0u32;
        let mut so2 = 0u32;
        for (i, &out) in outputs.iter().enumerate() {
            if self.nr51 & (1 << i) != 0 {
                so1 += out as u32;
            }
            if self.nr51 & (1 << (i + 4)) != 0 {
                so2 += out as u32;
            }
        }
        let right = so1 * ((self.nr50 & 0x07) as u32 + 1);
        let left = so2 * (((self.nr50 >> 4) & 0x07) as u32 + 1);
        (((left + right) as f32 / 960.0) * 32767.0 / 2.0) as i16
    }

    pub fn execute(&mut self) {
        let target = self.desired_ticks;
        while self.sample_period > 0
            && self.sample_tick <= target
            && self.buffer_pos < self.buffer.len()
        {
            let at = self.sample_tick;
            self.advance_voices(at);
            let sample = self.mix();
            self.buffer[self.buffer_pos] = sample;
            self.buffer_pos += 1;
            self.last_sample = sample;
            self.sample_tick += self.sample_period;
        }
        self.advance_voices(target);
    }

    // --- serialization ---------------------------------------------------

    pub fn save_state(&self) -> AudioState {
        AudioState {
            version: AUDIO_STATE_VERSION,
            power: self.power,
            nr50: self.nr50,
            nr51: self.nr51,
            regs: self.regs.to_vec(),
            wave_ram: self.wave_ram.to_vec(),
            square1: self.square1.clone(),
            square2: self.square2.clone(),
            wave: self.wave.clone(),
            noise: self.noise.clone(),
            sequence_step: self.sequence_step,
            sequence_tick: self.sequence_tick,
            sample_tick: self.sample_tick,
            updated_tick: self.updated_tick,
            desired_ticks: self.desired_ticks,
        }
    }

    pub fn restore_state(&mut self, state: &AudioState) -> Result<(), SaveStateError> {
        savestate::check_version("audio", state.version, AUDIO_STATE_VERSION)?;
        if state.regs.len() != self.regs.len() || state.wave_ram.len() != self.wave_ram.len() {
            return Err(SaveStateError::InvalidState("audio register file size"));
        }
        self.power = state.power;
        self.nr50 = state.nr50;
        self.nr51 = state.nr51;
        self.regs.copy_from_slice(&state.regs);
        self.wave_ram.copy_from_slice(&state.wave_ram);
        self.square1 = state.square1.clone();
        self.square2 = state.square2.clone();
        self.wave = state.wave.clone();
        self.noise = state.noise.clone();
        self.sequence_step = state.sequence_step;
        self.sequence_tick = state.sequence_tick;
        self.sample_tick = state.sample_tick;
        self.updated_tick = state.updated_tick;
        self.desired_ticks = state.desired_ticks;
        Ok(())
    }
}

impl ClockListener for Audio {
    fn set_desired_ticks(&mut self, ticks: Tick) {
        self.desired_ticks = ticks;
    }

    fn advance_clock(&mut self, ticks: Tick) {
        self.sequence_tick -= ticks;
        self.sample_tick -= ticks;
        self.updated_tick -= ticks;
        self.desired_ticks -= ticks;
    }

    fn reset_clock(&mut self) {
        self.sequence_tick = SEQUENCER_PERIOD;
        self.sample_tick = 0;
        self.updated_tick = 0;
        self.desired_ticks = 0;
    }
}

#[cfg(test)]
mod audio_tests;
