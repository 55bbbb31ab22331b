use super::{Mapper, MapperBus, bank_base};
use emu_core::membus::{Access, BusError, Table};
use emu_core::savestate::{self, SaveStateError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct NromState {
    version: u32,
}

const STATE_VERSION: u32 = 1;

/// Mapper 0: fixed PRG wiring, no registers. 16K images mirror into both
/// halves of cartridge space.
pub struct Nrom;

impl Nrom {
    pub fn new() -> Nrom {
        Nrom
    }
}

impl Mapper for Nrom {
    fn initialize(&mut self, bus: &mut MapperBus<'_>) -> Result<(), BusError> {
        let low = bus.mem.add_access(Access::Mem { slot: bus.prg_slot, base: 0 });
        let high = bus.mem.add_access(Access::Mem {
            slot: bus.prg_slot,
            base: bank_base(1, 0x4000, bus.prg_size),
        });
        bus.mem.add_range(Table::Read, 0x8000, 0xBFFF, low)?;
        bus.mem.add_range(Table::Read, 0xC000, 0xFFFF, high)?;
        Ok(())
    }

    fn reset(&mut self, _bus: &mut MapperBus<'_>) {}

    fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        savestate::encode(&NromState { version: STATE_VERSION })
    }

    fn restore_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let state: NromState = savestate::decode(bytes)?;
        savestate::check_version("mapper", state.version, STATE_VERSION)
    }
}
