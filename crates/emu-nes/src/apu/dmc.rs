use crate::bus::NesPort;
use emu_core::membus::{Fetched, MemoryBus};
use serde::{Deserialize, Serialize};

/// NTSC DMC rates in CPU cycles per output bit.
#[rustfmt::skip]
const RATE_TABLE: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

/// Delta modulation voice. The reader pulls sample bytes straight off the
/// CPU bus; fetches happen as elapsed ticks are consumed, without stealing
/// CPU cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dmc {
    master_clock_divider: u32,
    irq_enabled: bool,
    loop_flag: bool,
    rate_index: u8,
    output_level: u8,
    sample_address: u16,
    sample_length: u16,
    current_address: u16,
    bytes_remaining: u16,
    shift: u8,
    bits_remaining: u8,
    buffer: Option<u8>,
    silence: bool,
    timer_tick: u32,
    pub irq_flag: bool,
}

impl Dmc {
    pub fn new(master_clock_divider: u32) -> Dmc {
        Dmc {
            master_clock_divider,
            irq_enabled: false,
            loop_flag: false,
            rate_index: 0,
            output_level: 0,
            sample_address: 0xC000,
            sample_length: 1,
            current_address: 0xC000,
            bytes_remaining: 0,
            shift: 0,
            bits_remaining: 8,
            buffer: None,
            silence: true,
            timer_tick: 0,
            irq_flag: false,
        }
    }

    /// $4010: IRQ enable, loop, rate.
    pub fn write_control(&mut self, value: u8) {
        self.irq_enabled = value & 0x80 != 0;
        self.loop_flag = value & 0x40 != 0;
        self.rate_index = value & 0x0F;
        if !self.irq_enabled {
            self.irq_flag = false;
        }
    }

    /// $4011: direct 7-bit level load.
    pub fn write_level(&mut self, value: u8) {
        self.output_level = value & 0x7F;
    }

    /// $4012: sample start = $C000 + value * 64.
    pub fn write_address(&mut self, value: u8) {
        self.sample_address = 0xC000 + (value as u16) * 64;
    }

    /// $4013: sample length = value * 16 + 1.
    pub fn write_length(&mut self, value: u8) {
        self.sample_length = (value as u16) * 16 + 1;
    }

    /// $4015 enable bit: restarts an exhausted sample, disable flushes.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.bytes_remaining = 0;
        } else if self.bytes_remaining == 0 {
            self.restart_sample();
        }
    }

    pub fn active(&self) -> bool {
        self.bytes_remaining > 0
    }

    fn restart_sample(&mut self) {
        self.current_address = self.sample_address;
        self.bytes_remaining = self.sample_length;
    }

    fn fetch_byte(&mut self, mem: &MemoryBus<NesPort>) {
        if self.buffer.is_some() || self.bytes_remaining == 0 {
            return;
        }
        let value = match mem.read_uncached(self.current_address as u32) {
            Fetched::Value(value) => value,
            // Sample data normally lives in ROM; a register hit reads as 0.
            Fetched::Io(..) => 0,
        };
        self.buffer = Some(value);
        self.current_address = self.current_address.checked_add(1).unwrap_or(0x8000);
        self.bytes_remaining -= 1;
        if self.bytes_remaining == 0 {
            if self.loop_flag {
                self.restart_sample();
            } else if self.irq_enabled {
                self.irq_flag = true;
            }
        }
    }

    pub fn update(&mut self, ticks: u32, mem: &MemoryBus<NesPort>) {
        self.fetch_byte(mem);
        let period =
            RATE_TABLE[self.rate_index as usize] as u32 * self.master_clock_divider;
        self.timer_tick += ticks;
        while self.timer_tick >= period {
            self.timer_tick -= period;
            self.clock_bit(mem);
        }
    }

    fn clock_bit(&mut self, mem: &MemoryBus<NesPort>) {
        if self.bits_remaining == 8 {
            match self.buffer.take() {
                Some(byte) => {
                    self.shift = byte;
                    self.silence = false;
                }
                None => self.silence = true,
            }
            self.fetch_byte(mem);
        }
        if !self.silence {
            if self.shift & 1 != 0 {
                if self.output_level <= 125 {
                    self.output_level += 2;
                }
            } else if self.output_level >= 2 {
                self.output_level -= 2;
            }
        }
        self.shift >>= 1;
        self.bits_remaining -= 1;
        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
        }
    }

    pub fn output(&self) -> u8 {
        self.output_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::membus::{Access, Table};

    fn rom_bus(fill: u8) -> MemoryBus<NesPort> {
        let mut mem: MemoryBus<NesPort> = MemoryBus::new(16, 10).unwrap();
        let rom: std::sync::Arc<[u8]> = vec![fill; 0x8000].into();
        let slot = mem.add_rom_slot(rom);
        let access = mem.add_access(Access::Mem { slot, base: 0 });
        mem.add_range(Table::Read, 0x8000, 0xFFFF, access).unwrap();
        mem
    }

    #[test]
    fn all_ones_sample_ramps_level_up() {
        let mem = rom_bus(0xFF);
        let mut dmc = Dmc::new(12);
        dmc.write_control(0x0F); // fastest rate
        dmc.write_address(0x00);
        dmc.write_length(0x01);
        dmc.set_enabled(true);

        let period = 54 * 12;
        dmc.update(period * 16, &mem);
        assert!(dmc.output() >= 32, "level climbed, got {}", dmc.output());
    }

    #[test]
    fn sample_end_raises_irq_when_enabled() {
        let mem = rom_bus(0x00);
        let mut dmc = Dmc::new(12);
        dmc.write_control(0x8F);
        dmc.write_address(0x00);
        dmc.write_length(0x00); // one byte
        dmc.set_enabled(true);

        let period = 54 * 12;
        dmc.update(period * 20, &mem);
        assert!(dmc.irq_flag);
        assert!(!dmc.active());
    }

    #[test]
    fn loop_mode_restarts_instead_of_irq() {
        let mem = rom_bus(0x00);
        let mut dmc = Dmc::new(12);
        dmc.write_control(0xCF);
        dmc.write_address(0x04);
        dmc.write_length(0x00);
        dmc.set_enabled(true);

        let period = 54 * 12;
        dmc.update(period * 64, &mem);
        assert!(!dmc.irq_flag);
        assert!(dmc.active(), "looping sample never exhausts");
    }

    #[test]
    fn disabling_clears_bytes_remaining() {
        let mem = rom_bus(0x00);
        let mut dmc = Dmc::new(12);
        dmc.write_address(0x00);
        dmc.write_length(0x10);
        dmc.set_enabled(true);
        assert!(dmc.active());
        dmc.set_enabled(false);
        assert!(!dmc.active());
    }
}
