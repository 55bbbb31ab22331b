mod dmc;
mod noise;
mod pulse;
mod triangle;
mod units;

use crate::bus::{NesEvent, NesPort};
use crate::joypad::Joypad;
use bitflags::bitflags;
use dmc::Dmc;
use emu_core::clock::{Clock, ClockListener, Tick};
use emu_core::input::Buttons;
use emu_core::membus::MemoryBus;
use emu_core::regbank::{RegAccess, RegisterBank};
use emu_core::savestate::{self, SaveStateError};
use noise::Noise;
use pulse::Pulse;
use serde::{Deserialize, Serialize};
use triangle::Triangle;

pub const APU_REGISTER_COUNT: usize = 0x20;

bitflags! {
    /// $4015 bit assignments, shared by the enable write and status read.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChannelStatus: u8 {
        const PULSE_1   = 0x01;
        const PULSE_2   = 0x02;
        const TRIANGLE  = 0x04;
        const NOISE     = 0x08;
        const DMC       = 0x10;
        const FRAME_IRQ = 0x40;
        const DMC_IRQ   = 0x80;
    }
}

const REG_SND_CHN: u32 = 0x15;
const REG_JOY1: u32 = 0x16;
const REG_JOY2: u32 = 0x17;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApuState {
    pub version: u32,
    pub pulse1: Pulse,
    pub pulse2: Pulse,
    pub triangle: Triangle,
    pub noise: Noise,
    pub dmc: Dmc,
    pub mode5: bool,
    pub irq_inhibit: bool,
    pub frame_irq: bool,
    pub sequence_step: u32,
    pub sequence_tick: Tick,
    pub sample_tick: Tick,
    pub updated_tick: Tick,
    pub desired_ticks: Tick,
    pub joypads: [Joypad; 2],
    pub shadow: Vec<u8>,
}

pub const APU_STATE_VERSION: u32 = 1;

/// Audio unit. Voices are pulled forward whenever a sample is due or a
/// register/sequencer interaction needs their current state; the frame
/// sequencer runs as clock events at the quarter-frame cadence.
pub struct Apu {
    master_clock_divider: u32,
    registers: RegisterBank,

    pulse1: Pulse,
    pulse2: Pulse,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,

    mode5: bool,
    irq_inhibit: bool,
    frame_irq: bool,
    sequence_step: u32,
    sequence_tick: Tick,
    quarter_ticks: Tick,

    joypads: [Joypad; 2],

    buffer: Vec<i16>,
    buffer_pos: usize,
    sample_period: Tick,
    sample_tick: Tick,
    last_sample: i16,
    master_clock_frequency: u32,

    updated_tick: Tick,
    desired_ticks: Tick,
}

impl Apu {
    pub fn new(master_clock_divider: u32, master_clock_frequency: u32) -> Apu {
        let mut registers = RegisterBank::new(0x4000, APU_REGISTER_COUNT);
        define_registers(&mut registers);

        Apu {
            master_clock_divider,
            registers,
            pulse1: Pulse::new(master_clock_divider, true),
            pulse2: Pulse::new(master_clock_divider, false),
            triangle: Triangle::new(master_clock_divider),
            noise: Noise::new(master_clock_divider),
            dmc: Dmc::new(master_clock_divider),
            mode5: false,
            irq_inhibit: false,
            frame_irq: false,
            sequence_step: 0,
            sequence_tick: (master_clock_frequency / 240) as Tick,
            quarter_ticks: (master_clock_frequency / 240) as Tick,
            joypads: [Joypad::new(), Joypad::new()],
            buffer: Vec::new(),
            buffer_pos: 0,
            sample_period: 0,
            sample_tick: 0,
            last_sample: 0,
            master_clock_frequency,
            updated_tick: 0,
            desired_ticks: 0,
        }
    }

    pub fn reset(&mut self) {
        let divider = self.master_clock_divider;
        self.pulse1 = Pulse::new(divider, true);
        self.pulse2 = Pulse::new(divider, false);
        self.triangle = Triangle::new(divider);
        self.noise = Noise::new(divider);
        self.dmc = Dmc::new(divider);
        self.mode5 = false;
        self.irq_inhibit = false;
        self.frame_irq = false;
        self.sequence_step = 0;
        self.sequence_tick = self.quarter_ticks;
        self.sample_tick = 0;
        self.updated_tick = 0;
        self.buffer_pos = 0;
        self.last_sample = 0;
    }

    /// Derive the tick-per-sample rate from the per-frame sample count the
    /// host asked for.
    pub fn set_sound_samples_per_frame(&mut self, samples: usize) {
        self.buffer = vec![0; samples];
        self.buffer_pos = 0;
        if samples > 0 {
            self.sample_period =
                (self.master_clock_frequency / (60 * samples as u32) + 1) as Tick;
        }
    }

    pub fn sound_buffer(&self) -> &[i16] {
        &self.buffer
    }

    pub fn set_controller(&mut self, index: usize, buttons: Buttons) {
        if index < self.joypads.len() {
            self.joypads[index].set_buttons(buttons);
        }
    }

    pub fn irq_line(&self) -> bool {
        (self.frame_irq && !self.irq_inhibit) || self.dmc.irq_flag
    }

    pub fn begin_frame(&mut self, clock: &mut Clock<NesEvent>) {
        self.buffer_pos = 0;
        clock.add_event(NesEvent::ApuSequence, self.sequence_tick);
    }

    /// Pad out whatever the sample cadence left unfilled this frame.
    pub fn end_frame(&mut self) {
        while self.buffer_pos < self.buffer.len() {
            self.buffer[self.buffer_pos] = self.last_sample;
            self.buffer_pos += 1;
        }
    }

    // --- register file ---------------------------------------------------

    pub fn reg_read(&mut self, mem: &MemoryBus<NesPort>, tick: Tick, addr: u32) -> u8 {
        let value = match addr {
            REG_SND_CHN => {
                self.advance_voices(mem, tick);
                let mut status = ChannelStatus::empty();
                status.set(ChannelStatus::PULSE_1, self.pulse1.length.active());
                status.set(ChannelStatus::PULSE_2, self.pulse2.length.active());
                status.set(ChannelStatus::TRIANGLE, self.triangle.length.active());
                status.set(ChannelStatus::NOISE, self.noise.length.active());
                status.set(ChannelStatus::DMC, self.dmc.active());
                status.set(ChannelStatus::FRAME_IRQ, self.frame_irq && !self.irq_inhibit);
                status.set(ChannelStatus::DMC_IRQ, self.dmc.irq_flag);
                // Reading status acknowledges the frame interrupt, not the
                // DMC interrupt.
                self.frame_irq = false;
                status.bits()
            }
            REG_JOY1 => self.joypads[0].read(),
            REG_JOY2 => self.joypads[1].read(),
            _ => self.registers.shadow(addr as usize),
        };
        self.registers.traced_read(addr as usize, value)
    }

    pub fn reg_write(
        &mut self,
        clock: &mut Clock<NesEvent>,
        mem: &MemoryBus<NesPort>,
        tick: Tick,
        addr: u32,
        value: u8,
    ) {
        self.advance_voices(mem, tick);
        self.registers.traced_write(addr as usize, value);
        match addr {
            0x00 => self.pulse1.write_control(value),
            0x01 => self.pulse1.write_sweep(value),
            0x02 => self.pulse1.write_timer_low(value),
            0x03 => self.pulse1.write_timer_high(value),

            0x04 => self.pulse2.write_control(value),
            0x05 => self.pulse2.write_sweep(value),
            0x06 => self.pulse2.write_timer_low(value),
            0x07 => self.pulse2.write_timer_high(value),

            0x08 => self.triangle.write_linear(value),
            0x09 => { /* unused */ }
            0x0A => self.triangle.write_timer_low(value),
            0x0B => self.triangle.write_timer_high(value),

            0x0C => self.noise.write_control(value),
            0x0D => { /* unused */ }
            0x0E => self.noise.write_mode(value),
            0x0F => self.noise.write_length(value),

            0x10 => self.dmc.write_control(value),
            0x11 => self.dmc.write_level(value),
            0x12 => self.dmc.write_address(value),
            0x13 => self.dmc.write_length(value),

            REG_SND_CHN => {
                let enables = ChannelStatus::from_bits_truncate(value);
                self.pulse1.set_enabled(enables.contains(ChannelStatus::PULSE_1));
                self.pulse2.set_enabled(enables.contains(ChannelStatus::PULSE_2));
                self.triangle.set_enabled(enables.contains(ChannelStatus::TRIANGLE));
                self.noise.set_enabled(enables.contains(ChannelStatus::NOISE));
                self.dmc.set_enabled(enables.contains(ChannelStatus::DMC));
                // Writing the status register clears the DMC interrupt.
                self.dmc.irq_flag = false;
            }
            REG_JOY1 => {
                // Strobe is shared by both pads.
                self.joypads[0].write_strobe(value);
                self.joypads[1].write_strobe(value);
            }
            REG_JOY2 => {
                self.mode5 = value & 0x80 != 0;
                self.irq_inhibit = value & 0x40 != 0;
                if self.irq_inhibit {
                    self.frame_irq = false;
                }
                self.sequence_step = 0;
                self.sequence_tick = tick + self.quarter_ticks;
                clock.add_event(NesEvent::ApuSequence, self.sequence_tick);
                if self.mode5 {
                    // Entering 5-step mode clocks everything immediately.
                    self.clock_quarter();
                    self.clock_half();
                }
            }
            _ => {
                log::debug!("APU write to unimplemented register ${:04X}", 0x4000 + addr);
            }
        }
    }

    // --- frame sequencer -------------------------------------------------

    /// Quarter-frame event. Stale events from a $4017 reschedule carry the
    /// wrong tick and are dropped.
    pub fn on_sequence_event(
        &mut self,
        clock: &mut Clock<NesEvent>,
        mem: &MemoryBus<NesPort>,
        tick: Tick,
    ) {
        if tick != self.sequence_tick {
            return;
        }
        self.advance_voices(mem, tick);

        if self.mode5 {
            match self.sequence_step % 5 {
                0 | 2 => self.clock_quarter(),
                1 | 4 => {
                    self.clock_quarter();
                    self.clock_half();
                }
                _ => { /* step 3 idles */ }
            }
        } else {
            self.clock_quarter();
            match self.sequence_step % 4 {
                1 => self.clock_half(),
                3 => {
                    self.clock_half();
                    if !self.irq_inhibit {
                        self.frame_irq = true;
                    }
                }
                _ => {}
            }
        }
        self.sequence_step += 1;

        self.sequence_tick = tick + self.quarter_ticks;
        clock.add_event(NesEvent::ApuSequence, self.sequence_tick);
    }

    fn clock_quarter(&mut self) {
        self.pulse1.clock_quarter();
        self.pulse2.clock_quarter();
        self.triangle.clock_quarter();
        self.noise.clock_quarter();
    }

    fn clock_half(&mut self) {
        self.pulse1.clock_half();
        self.pulse2.clock_half();
        self.triangle.clock_half();
        self.noise.clock_half();
    }

    // --- sampling --------------------------------------------------------

    fn advance_voices(&mut self, mem: &MemoryBus<NesPort>, to: Tick) {
        let elapsed = to - self.updated_tick;
        if elapsed <= 0 {
            return;
        }
        let ticks = elapsed as u32;
        self.pulse1.update(ticks);
        self.pulse2.update(ticks);
        self.triangle.update(ticks);
        self.noise.update(ticks);
        self.dmc.update(ticks, mem);
        self.updated_tick = to;
    }

    fn mix(&self) -> i16 {
        // Linear approximation of the canonical mixer, see
        // https://www.nesdev.org/wiki/APU_Mixer
        let pulse = (self.pulse1.output() + self.pulse2.output()) as f32;
        let tnd = 0.00851 * self.triangle.output() as f32
            + 0.00494 * self.noise.output() as f32
            + 0.00335 * self.dmc.output() as f32;
        let mixed = 0.00752 * pulse + tnd;
        (mixed * 32767.0) as i16
    }

    pub fn execute(&mut self, mem: &MemoryBus<NesPort>) {
        let target = self.desired_ticks;
        while self.sample_period > 0
            && self.sample_tick <= target
            && self.buffer_pos < self.buffer.len()
        {
            let at = self.sample_tick;
            self.advance_voices(mem, at);
            let sample = self.mix();
            self.buffer[self.buffer_pos] = sample;
            self.buffer_pos += 1;
            self.last_sample = sample;
            self.sample_tick += self.sample_period;
        }
        self.advance_voices(mem, target);
    }

    // --- serialization ---------------------------------------------------

    pub fn save_state(&self) -> ApuState {
        ApuState {
            version: APU_STATE_VERSION,
            pulse1: self.pulse1.clone(),
            pulse2: self.pulse2.clone(),
            triangle: self.triangle.clone(),
            noise: self.noise.clone(),
            dmc: self.dmc.clone(),
            mode5: self.mode5,
            irq_inhibit: self.irq_inhibit,
            frame_irq: self.frame_irq,
            sequence_step: self.sequence_step,
            sequence_tick: self.sequence_tick,
            sample_tick: self.sample_tick,
            updated_tick: self.updated_tick,
            desired_ticks: self.desired_ticks,
            joypads: self.joypads.clone(),
            shadow: self.registers.shadow_bytes().to_vec(),
        }
    }

    pub fn restore_state(&mut self, state: &ApuState) -> Result<(), SaveStateError> {
        savestate::check_version("apu", state.version, APU_STATE_VERSION)?;
        if !self.registers.restore_shadow(&state.shadow) {
            return Err(SaveStateError::InvalidState("apu register shadow size"));
        }
        self.pulse1 = state.pulse1.clone();
        self.pulse2 = state.pulse2.clone();
        self.triangle = state.triangle.clone();
        self.noise = state.noise.clone();
        self.dmc = state.dmc.clone();
        self.mode5 = state.mode5;
        self.irq_inhibit = state.irq_inhibit;
        self.frame_irq = state.frame_irq;
        self.sequence_step = state.sequence_step;
        self.sequence_tick = state.sequence_tick;
        self.sample_tick = state.sample_tick;
        self.updated_tick = state.updated_tick;
        self.desired_ticks = state.desired_ticks;
        self.joypads = state.joypads.clone();
        Ok(())
    }
}

impl ClockListener for Apu {
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
        self.sequence_tick = self.quarter_ticks;
        self.sample_tick = 0;
        self.updated_tick = 0;
        self.desired_ticks = 0;
    }
}

fn define_registers(bank: &mut RegisterBank) {
    bank.define(0x00, "SQ1_VOL", "Pulse 1 control", RegAccess::Write);
    bank.define(0x01, "SQ1_SWEEP", "Pulse 1 sweep", RegAccess::Write);
    bank.define(0x02, "SQ1_LO", "Pulse 1 timer low", RegAccess::Write);
    bank.define(0x03, "SQ1_HI", "Pulse 1 length/timer high", RegAccess::Write);
    bank.define(0x04, "SQ2_VOL", "Pulse 2 control", RegAccess::Write);
    bank.define(0x05, "SQ2_SWEEP", "Pulse 2 sweep", RegAccess::Write);
    bank.define(0x06, "SQ2_LO", "Pulse 2 timer low", RegAccess::Write);
    bank.define(0x07, "SQ2_HI", "Pulse 2 length/timer high", RegAccess::Write);
    bank.define(0x08, "TRI_LINEAR", "Triangle linear counter", RegAccess::Write);
    bank.define(0x0A, "TRI_LO", "Triangle timer low", RegAccess::Write);
    bank.define(0x0B, "TRI_HI", "Triangle length/timer high", RegAccess::Write);
    bank.define(0x0C, "NOISE_VOL", "Noise control", RegAccess::Write);
    bank.define(0x0E, "NOISE_LO", "Noise mode/period", RegAccess::Write);
    bank.define(0x0F, "NOISE_HI", "Noise length", RegAccess::Write);
    bank.define(0x10, "DMC_FREQ", "DMC control", RegAccess::Write);
    bank.define(0x11, "DMC_RAW", "DMC direct load", RegAccess::Write);
    bank.define(0x12, "DMC_START", "DMC sample address", RegAccess::Write);
    bank.define(0x13, "DMC_LEN", "DMC sample length", RegAccess::Write);
    bank.define(0x14, "OAM_DMA", "Sprite memory DMA", RegAccess::Write);
    bank.define(0x15, "SND_CHN", "Channel enable/status", RegAccess::ReadWrite);
    bank.define(0x16, "JOY1", "Controller 1 data/strobe", RegAccess::ReadWrite);
    bank.define(0x17, "JOY2", "Controller 2 data/frame counter", RegAccess::ReadWrite);
}

#[cfg(test)]
mod apu_tests;
