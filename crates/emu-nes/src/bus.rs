use crate::apu::Apu;
use crate::cpu::CpuIo;
use crate::mapper::{Mapper, MapperBus};
use crate::ppu::Ppu;
use emu_core::clock::{Clock, Tick};
use emu_core::membus::{Accessor, Fetched, MemoryBus, SlotId};
use serde::{Deserialize, Serialize};

/// I/O ports on the CPU bus. Everything else resolves to direct memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NesPort {
    PpuRegs,
    ApuRegs,
    CartWrite,
    OpenBus,
}

/// Timer-event payloads routed by the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NesEvent {
    VBlankStart,
    VBlankEnd,
    ApuSequence,
    VisibleLine,
}

/// Interrupt plumbing between components and the CPU. The NMI edge is
/// latched here; the IRQ level is computed from its sources on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSignals {
    pub nmi: bool,
}

/// The CPU's window onto the machine for one execute slice: the paged bus
/// plus the devices its I/O ports route to.
pub struct CpuBus<'a> {
    pub mem: &'a mut MemoryBus<NesPort>,
    pub ppu: &'a mut Ppu,
    pub apu: &'a mut Apu,
    pub mapper: &'a mut dyn Mapper,
    pub clock: &'a mut Clock<NesEvent>,
    pub signals: &'a mut CpuSignals,
    pub prg_slot: SlotId,
    pub prg_size: usize,
}

impl CpuBus<'_> {
    fn io_read(&mut self, port: NesPort, tick: Tick, rel: u32) -> u8 {
        match port {
            NesPort::PpuRegs => self.ppu.reg_read(tick, rel),
            NesPort::ApuRegs => self.apu.reg_read(self.mem, tick, rel),
            // The cartridge write trap never lands on the read table.
            NesPort::CartWrite | NesPort::OpenBus => 0xFF,
        }
    }

    fn io_write(&mut self, port: NesPort, tick: Tick, rel: u32, value: u8) {
        match port {
            NesPort::PpuRegs => {
                if self.ppu.reg_write(tick, rel, value) {
                    self.signals.nmi = true;
                }
            }
            NesPort::ApuRegs => {
                if rel == 0x14 {
                    self.oam_dma(tick, value);
                } else {
                    self.apu.reg_write(self.clock, self.mem, tick, rel, value);
                }
            }
            NesPort::CartWrite => {
                let mut mapper_bus = MapperBus {
                    mem: &mut *self.mem,
                    ppu: &mut *self.ppu,
                    prg_slot: self.prg_slot,
                    prg_size: self.prg_size,
                };
                self.mapper
                    .cpu_write(&mut mapper_bus, tick, 0x8000 + rel as u16, value);
            }
            NesPort::OpenBus => {}
        }
    }

    /// $4014: copy one CPU page into OAM in a single step. The transfer is
    /// atomic at the write's tick; the real machine would stall the CPU for
    /// 513 cycles, which this core does not model.
    fn oam_dma(&mut self, tick: Tick, page: u8) {
        let mut data = [0u8; 256];
        for (i, out) in data.iter_mut().enumerate() {
            let addr = ((page as u32) << 8) | i as u32;
            *out = match self.mem.read_uncached(addr) {
                Fetched::Value(value) => value,
                Fetched::Io(..) => 0,
            };
        }
        self.ppu.write_oam_dma(tick, &data);
    }
}

impl CpuIo for CpuBus<'_> {
    #[inline]
    fn read(&mut self, acc: &mut Accessor, tick: Tick, addr: u16) -> u8 {
        match self.mem.read(acc, addr as u32) {
            Fetched::Value(value) => value,
            Fetched::Io(port, rel) => self.io_read(port, tick, rel),
        }
    }

    #[inline]
    fn write(&mut self, acc: &mut Accessor, tick: Tick, addr: u16, value: u8) {
        if let Some((port, rel)) = self.mem.write(acc, addr as u32, value) {
            self.io_write(port, tick, rel, value);
        }
    }

    fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.signals.nmi)
    }

    fn irq_line(&self) -> bool {
        self.apu.irq_line() || self.mapper.irq_pending()
    }
}
