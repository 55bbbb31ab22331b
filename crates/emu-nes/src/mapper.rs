mod mmc1;
mod mmc3;
mod nrom;
mod uxrom;

use crate::bus::NesPort;
use crate::ppu::Ppu;
use crate::rom::{Rom, RomError};
use emu_core::clock::Tick;
use emu_core::membus::{BusError, MemoryBus, SlotId};
use emu_core::savestate::SaveStateError;

pub use mmc1::Mmc1;
pub use mmc3::Mmc3;
pub use nrom::Nrom;
pub use uxrom::UxRom;

/// Everything a mapper may rewire: the CPU bus (PRG windows, write traps)
/// and the PPU (CHR windows, mirroring).
pub struct MapperBus<'a> {
    pub mem: &'a mut MemoryBus<NesPort>,
    pub ppu: &'a mut Ppu,
    pub prg_slot: SlotId,
    pub prg_size: usize,
}

/// Cartridge hardware contract. Bank state restores through the bus
/// snapshot; only mapper-private latches live in the mapper's own state.
pub trait Mapper {
    /// Install the PRG/CHR view and any write traps.
    fn initialize(&mut self, bus: &mut MapperBus<'_>) -> Result<(), BusError>;

    fn reset(&mut self, bus: &mut MapperBus<'_>);

    fn begin_frame(&mut self) {}

    /// CPU write into cartridge space ($8000-$FFFF).
    fn cpu_write(&mut self, _bus: &mut MapperBus<'_>, _tick: Tick, _addr: u16, _value: u8) {}

    /// Start-of-visible-line notification, delivered only to mappers that
    /// ask for it while rendering is enabled.
    fn on_visible_line(&mut self, _tick: Tick) {}

    fn wants_scanline_events(&self) -> bool {
        false
    }

    fn irq_pending(&self) -> bool {
        false
    }

    /// Mapper-private latch state (banking itself lives in the bus state).
    fn save_state(&self) -> Result<Vec<u8>, SaveStateError>;

    fn restore_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError>;
}

/// Compile-time mapper registry.
pub fn create_mapper(rom: &Rom) -> Result<Box<dyn Mapper>, RomError> {
    let desc = rom.description();
    match desc.mapper {
        0 => Ok(Box::new(Nrom::new())),
        1 => Ok(Box::new(Mmc1::new())),
        2 => Ok(Box::new(UxRom::new())),
        4 => Ok(Box::new(Mmc3::new(desc.mirroring))),
        id => Err(RomError::UnsupportedMapper(id)),
    }
}

/// Clamp a bank selection to the banks the cartridge actually has.
pub(crate) fn bank_base(bank: u32, bank_size: u32, total_size: usize) -> u32 {
    let count = (total_size as u32 / bank_size).max(1);
    (bank % count) * bank_size
}

#[cfg(test)]
mod mapper_tests;
