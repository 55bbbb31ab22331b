use super::{Mapper, MapperBus, bank_base};
use crate::bus::NesPort;
use crate::rom::Mirroring;
use emu_core::clock::Tick;
use emu_core::membus::{Access, AccessId, BusError, Table};
use emu_core::savestate::{self, SaveStateError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Mmc1State {
    version: u32,
    shift: u8,
    shift_count: u8,
    control: u8,
    chr_bank0: u8,
    chr_bank1: u8,
    prg_bank: u8,
}

const STATE_VERSION: u32 = 1;

/// Mapper 1: a 5-bit serial latch collects writes to $8000-$FFFF; the
/// fifth write commits to one of four registers selected by address bits
/// 13-14.
pub struct Mmc1 {
    prg_access: [AccessId; 2],
    shift: u8,
    shift_count: u8,
    control: u8,
    chr_bank0: u8,
    chr_bank1: u8,
    prg_bank: u8,
}

impl Mmc1 {
    pub fn new() -> Mmc1 {
        Mmc1 {
            prg_access: [0; 2],
            shift: 0,
            shift_count: 0,
            // Power-on: PRG mode 3 (switch $8000, fix last at $C000).
            control: 0x0C,
            chr_bank0: 0,
            chr_bank1: 0,
            prg_bank: 0,
        }
    }

    fn apply(&mut self, bus: &mut MapperBus<'_>) {
        let slot = bus.prg_slot;
        let prg_size = bus.prg_size;
        let last_bank = (prg_size - 0x4000) as u32;

        match (self.control >> 2) & 0x03 {
            // 32K switching ignores the low bank bit.
            0 | 1 => {
                let base = bank_base((self.prg_bank & 0x0E) as u32 >> 1, 0x8000, prg_size);
                bus.mem.set_access(self.prg_access[0], Access::Mem { slot, base });
                bus.mem
                    .set_access(self.prg_access[1], Access::Mem { slot, base: base + 0x4000 });
            }
            2 => {
                let base = bank_base((self.prg_bank & 0x0F) as u32, 0x4000, prg_size);
                bus.mem.set_access(self.prg_access[0], Access::Mem { slot, base: 0 });
                bus.mem.set_access(self.prg_access[1], Access::Mem { slot, base });
            }
            _ => {
                let base = bank_base((self.prg_bank & 0x0F) as u32, 0x4000, prg_size);
                bus.mem.set_access(self.prg_access[0], Access::Mem { slot, base });
                bus.mem
                    .set_access(self.prg_access[1], Access::Mem { slot, base: last_bank });
            }
        }

        let chr_size = bus.ppu.chr_size();
        if self.control & 0x10 == 0 {
            // 8K CHR mode.
            let base = bank_base((self.chr_bank0 >> 1) as u32, 0x2000, chr_size);
            bus.ppu.set_chr_bank_8k(base);
        } else {
            bus.ppu
                .set_chr_bank_4k(0, bank_base(self.chr_bank0 as u32, 0x1000, chr_size));
            bus.ppu
                .set_chr_bank_4k(1, bank_base(self.chr_bank1 as u32, 0x1000, chr_size));
        }

        let mirroring = match self.control & 0x03 {
            0 => Mirroring::Single0,
            1 => Mirroring::Single1,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        };
        bus.ppu.set_mirroring(mirroring);
    }
}

impl Mapper for Mmc1 {
    fn initialize(&mut self, bus: &mut MapperBus<'_>) -> Result<(), BusError> {
        let slot = bus.prg_slot;
        self.prg_access = [
            bus.mem.add_access(Access::Mem { slot, base: 0 }),
            bus.mem.add_access(Access::Mem { slot, base: 0 }),
        ];
        bus.mem.add_range(Table::Read, 0x8000, 0xBFFF, self.prg_access[0])?;
        bus.mem.add_range(Table::Read, 0xC000, 0xFFFF, self.prg_access[1])?;

        let trap = bus.mem.add_access(Access::Io(NesPort::CartWrite));
        bus.mem.add_range(Table::Write, 0x8000, 0xFFFF, trap)?;

        self.apply(bus);
        Ok(())
    }

    fn reset(&mut self, bus: &mut MapperBus<'_>) {
        self.shift = 0;
        self.shift_count = 0;
        self.control = 0x0C;
        self.chr_bank0 = 0;
        self.chr_bank1 = 0;
        self.prg_bank = 0;
        self.apply(bus);
    }

    fn cpu_write(&mut self, bus: &mut MapperBus<'_>, _tick: Tick, addr: u16, value: u8) {
        if value & 0x80 != 0 {
            // Reset bit: clear the latch and restore the fixed-last PRG mode.
            self.shift = 0;
            self.shift_count = 0;
            self.control |= 0x0C;
            self.apply(bus);
            return;
        }

        self.shift = (self.shift >> 1) | ((value & 1) << 4);
        self.shift_count += 1;
        if self.shift_count < 5 {
            return;
        }

        let data = self.shift;
        self.shift = 0;
        self.shift_count = 0;
        match (addr >> 13) & 0x03 {
            0 => self.control = data,
            1 => self.chr_bank0 = data,
            2 => self.chr_bank1 = data,
            _ => self.prg_bank = data,
        }
        self.apply(bus);
    }

    fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        savestate::encode(&Mmc1State {
            version: STATE_VERSION,
            shift: self.shift,
            shift_count: self.shift_count,
            control: self.control,
            chr_bank0: self.chr_bank0,
            chr_bank1: self.chr_bank1,
            prg_bank: self.prg_bank,
        })
    }

    fn restore_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let state: Mmc1State = savestate::decode(bytes)?;
        savestate::check_version("mapper", state.version, STATE_VERSION)?;
        self.shift = state.shift;
        self.shift_count = state.shift_count;
        self.control = state.control;
        self.chr_bank0 = state.chr_bank0;
        self.chr_bank1 = state.chr_bank1;
        self.prg_bank = state.prg_bank;
        Ok(())
    }
}
