use super::{Mapper, MapperBus, bank_base};
use crate::bus::NesPort;
use emu_core::clock::Tick;
use emu_core::membus::{Access, AccessId, BusError, Table};
use emu_core::savestate::{self, SaveStateError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct UxRomState {
    version: u32,
    bank: u8,
}

const STATE_VERSION: u32 = 1;

/// Mapper 2: one switchable 16K bank at $8000, the last bank fixed at
/// $C000. Any write to cartridge space selects the low bank.
pub struct UxRom {
    switch_access: AccessId,
    bank: u8,
}

impl UxRom {
    pub fn new() -> UxRom {
        UxRom {
            switch_access: 0,
            bank: 0,
        }
    }
}

impl Mapper for UxRom {
    fn initialize(&mut self, bus: &mut MapperBus<'_>) -> Result<(), BusError> {
        self.switch_access = bus.mem.add_access(Access::Mem { slot: bus.prg_slot, base: 0 });
        let last = bus.mem.add_access(Access::Mem {
            slot: bus.prg_slot,
            base: (bus.prg_size - 0x4000) as u32,
        });
        bus.mem.add_range(Table::Read, 0x8000, 0xBFFF, self.switch_access)?;
        bus.mem.add_range(Table::Read, 0xC000, 0xFFFF, last)?;

        let trap = bus.mem.add_access(Access::Io(NesPort::CartWrite));
        bus.mem.add_range(Table::Write, 0x8000, 0xFFFF, trap)?;
        Ok(())
    }

    fn reset(&mut self, bus: &mut MapperBus<'_>) {
        self.bank = 0;
        let slot = bus.prg_slot;
        bus.mem.set_access(self.switch_access, Access::Mem { slot, base: 0 });
    }

    fn cpu_write(&mut self, bus: &mut MapperBus<'_>, _tick: Tick, _addr: u16, value: u8) {
        self.bank = value & 0x0F;
        let base = bank_base(self.bank as u32, 0x4000, bus.prg_size);
        let slot = bus.prg_slot;
        bus.mem.set_access(self.switch_access, Access::Mem { slot, base });
    }

    fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        savestate::encode(&UxRomState {
            version: STATE_VERSION,
            bank: self.bank,
        })
    }

    fn restore_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let state: UxRomState = savestate::decode(bytes)?;
        savestate::check_version("mapper", state.version, STATE_VERSION)?;
        self.bank = state.bank;
        Ok(())
    }
}
