use super::{Mapper, MapperBus, bank_base};
use crate::bus::NesPort;
use crate::rom::Mirroring;
use emu_core::clock::Tick;
use emu_core::membus::{Access, AccessId, BusError, Table};
use emu_core::savestate::{self, SaveStateError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Mmc3State {
    version: u32,
    bank_select: u8,
    bank_registers: [u8; 8],
    prg_mode: bool,
    chr_mode: bool,
    mirroring_flag: u8,
    wram_protect: u8,
    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,
}

const STATE_VERSION: u32 = 1;

/// Mapper 4: eight bank ports plus a scanline counter clocked from the
/// start of each rendered line, standing in for the PPU A12 rise.
pub struct Mmc3 {
    prg_access: [AccessId; 4],
    four_screen: bool,

    bank_select: u8,
    bank_registers: [u8; 8],
    prg_mode: bool,
    chr_mode: bool,
    mirroring_flag: u8,
    wram_protect: u8,

    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,
}

impl Mmc3 {
    pub fn new(mirroring: Mirroring) -> Mmc3 {
        Mmc3 {
            prg_access: [0; 4],
            four_screen: mirroring == Mirroring::FourScreen,
            bank_select: 0,
            bank_registers: [0; 8],
            prg_mode: false,
            chr_mode: false,
            mirroring_flag: 0,
            wram_protect: 0,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
        }
    }

    fn apply(&mut self, bus: &mut MapperBus<'_>) {
        let slot = bus.prg_slot;
        let prg_size = bus.prg_size;
        let bank_8k = |bank: u8| bank_base(bank as u32, 0x2000, prg_size);
        let last = bank_8k((prg_size / 0x2000 - 1) as u8);
        let second_last = bank_8k((prg_size / 0x2000 - 2) as u8);

        let r6 = bank_8k(self.bank_registers[6]);
        let r7 = bank_8k(self.bank_registers[7]);
        let layout = if self.prg_mode {
            [second_last, r7, r6, last]
        } else {
            [r6, r7, second_last, last]
        };
        for (&access, &base) in self.prg_access.iter().zip(layout.iter()) {
            bus.mem.set_access(access, Access::Mem { slot, base });
        }

        let chr_size = bus.ppu.chr_size();
        let bank_1k = |bank: u8| bank_base(bank as u32, 0x0400, chr_size);
        // Two 2K windows plus four 1K windows, halves swapped by CHR mode.
        let flip = if self.chr_mode { 4 } else { 0 };
        let r0 = self.bank_registers[0] & 0xFE;
        let r1 = self.bank_registers[1] & 0xFE;
        bus.ppu.set_chr_bank_1k(flip, bank_1k(r0));
        bus.ppu.set_chr_bank_1k(flip + 1, bank_1k(r0 + 1));
        bus.ppu.set_chr_bank_1k(flip + 2, bank_1k(r1));
        bus.ppu.set_chr_bank_1k(flip + 3, bank_1k(r1 + 1));
        for i in 0..4 {
            bus.ppu
                .set_chr_bank_1k((4 - flip) + i, bank_1k(self.bank_registers[2 + i]));
        }

        if !self.four_screen {
            let mirroring = if self.mirroring_flag & 1 == 0 {
                Mirroring::Vertical
            } else {
                Mirroring::Horizontal
            };
            bus.ppu.set_mirroring(mirroring);
        }
    }
}

impl Mapper for Mmc3 {
    fn initialize(&mut self, bus: &mut MapperBus<'_>) -> Result<(), BusError> {
        let slot = bus.prg_slot;
        self.prg_access = [
            bus.mem.add_access(Access::Mem { slot, base: 0 }),
            bus.mem.add_access(Access::Mem { slot, base: 0 }),
            bus.mem.add_access(Access::Mem { slot, base: 0 }),
            bus.mem.add_access(Access::Mem { slot, base: 0 }),
        ];
        for (i, &access) in self.prg_access.iter().enumerate() {
            let start = 0x8000 + i as u32 * 0x2000;
            bus.mem.add_range(Table::Read, start, start + 0x1FFF, access)?;
        }
        let trap = bus.mem.add_access(Access::Io(NesPort::CartWrite));
        bus.mem.add_range(Table::Write, 0x8000, 0xFFFF, trap)?;

        self.apply(bus);
        Ok(())
    }

    fn reset(&mut self, bus: &mut MapperBus<'_>) {
        self.bank_select = 0;
        self.bank_registers = [0; 8];
        self.prg_mode = false;
        self.chr_mode = false;
        self.mirroring_flag = 0;
        self.wram_protect = 0;
        self.irq_latch = 0;
        self.irq_counter = 0;
        self.irq_reload = false;
        self.irq_enabled = false;
        self.irq_pending = false;
        self.apply(bus);
    }

    fn cpu_write(&mut self, bus: &mut MapperBus<'_>, _tick: Tick, addr: u16, value: u8) {
        match (addr & 0xE001, addr & 1) {
            (0x8000, _) => {
                self.bank_select = value & 0x07;
                self.prg_mode = value & 0x40 != 0;
                self.chr_mode = value & 0x80 != 0;
                self.apply(bus);
            }
            (0x8001, _) => {
                self.bank_registers[self.bank_select as usize] = value;
                self.apply(bus);
            }
            (0xA000, _) => {
                self.mirroring_flag = value & 1;
                self.apply(bus);
            }
            (0xA001, _) => {
                // RAM protect bits; PRG-RAM stays writable in this core.
                self.wram_protect = value;
                log::debug!("MMC3 WRAM protect <- ${value:02X}");
            }
            (0xC000, _) => self.irq_latch = value,
            (0xC001, _) => self.irq_reload = true,
            (0xE000, _) => {
                self.irq_enabled = false;
                self.irq_pending = false;
            }
            (0xE001, _) => self.irq_enabled = true,
            _ => {}
        }
    }

    fn on_visible_line(&mut self, _tick: Tick) {
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }
        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
        }
    }

    fn wants_scanline_events(&self) -> bool {
        true
    }

    fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        savestate::encode(&Mmc3State {
            version: STATE_VERSION,
            bank_select: self.bank_select,
            bank_registers: self.bank_registers,
            prg_mode: self.prg_mode,
            chr_mode: self.chr_mode,
            mirroring_flag: self.mirroring_flag,
            wram_protect: self.wram_protect,
            irq_latch: self.irq_latch,
            irq_counter: self.irq_counter,
            irq_reload: self.irq_reload,
            irq_enabled: self.irq_enabled,
            irq_pending: self.irq_pending,
        })
    }

    fn restore_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let state: Mmc3State = savestate::decode(bytes)?;
        savestate::check_version("mapper", state.version, STATE_VERSION)?;
        self.bank_select = state.bank_select;
        self.bank_registers = state.bank_registers;
        self.prg_mode = state.prg_mode;
        self.chr_mode = state.chr_mode;
        self.mirroring_flag = state.mirroring_flag;
        self.wram_protect = state.wram_protect;
        self.irq_latch = state.irq_latch;
        self.irq_counter = state.irq_counter;
        self.irq_reload = state.irq_reload;
        self.irq_enabled = state.irq_enabled;
        self.irq_pending = state.irq_pending;
        Ok(())
    }
}
