use crate::apu::{Apu, ApuState};
use crate::bus::{CpuBus, CpuSignals, NesEvent, NesPort};
use crate::cpu::{Cpu, CpuState};
use crate::mapper::{Mapper, MapperBus, create_mapper};
use crate::ppu::{FRAME_WIDTH, Ppu, PpuState};
use crate::rom::{Rom, RomError};
use emu_core::api::EmuContext;
use emu_core::clock::{Clock, ClockListener, ClockState, Tick};
use emu_core::input::Buttons;
use emu_core::membus::{Access, BusState, MemoryBus, SlotId};
use emu_core::savestate::{self, SaveStateError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MASTER_CLOCK_FREQUENCY_NTSC: u32 = 21_477_272;
pub const MASTER_CLOCK_CPU_DIVIDER_NTSC: u32 = 12;
pub const MASTER_CLOCK_PPU_DIVIDER_NTSC: u32 = 4;

// 261 full lines plus the half-line that makes NTSC come out at 60.1 Hz.
pub const MASTER_CLOCK_PER_FRAME_NTSC: Tick =
    ((341 * 261 + 340) * MASTER_CLOCK_PPU_DIVIDER_NTSC + MASTER_CLOCK_PPU_DIVIDER_NTSC / 2)
        as Tick;

pub const DISPLAY_SIZE_X: u32 = 256;
pub const DISPLAY_SIZE_Y: u32 = 224;

/// The NTSC screen crops the top and bottom 8 of the 240 rendered lines.
const OVERSCAN_LINES: usize = 8;

const MEM_SIZE_LOG2: u32 = 16;
const MEM_PAGE_SIZE_LOG2: u32 = 10;

const CPU_RAM_SIZE: usize = 0x0800;
const SAVE_RAM_SIZE: usize = 0x2000;

const LINE_TICKS: Tick = (341 * MASTER_CLOCK_PPU_DIVIDER_NTSC) as Tick;
const VISIBLE_LINES: i32 = 240;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NesContextState {
    version: u32,
    clock: ClockState,
    cpu: CpuState,
    ppu: PpuState,
    apu: ApuState,
    bus: BusState<NesPort>,
    signals: CpuSignals,
    mapper: Vec<u8>,
}

const CONTEXT_STATE_VERSION: u32 = 1;

/// One NES gameplay session: clock, buses, CPU, PPU, APU, mapper and RAM,
/// assembled around a shared ROM image.
pub struct NesContext {
    rom: Arc<Rom>,
    clock: Clock<NesEvent>,
    mem: MemoryBus<NesPort>,
    cpu: Cpu,
    ppu: Ppu,
    apu: Apu,
    mapper: Box<dyn Mapper>,
    signals: CpuSignals,
    prg_slot: SlotId,
    save_ram_slot: SlotId,
    fault: bool,
    video: Vec<u32>,
}

impl NesContext {
    pub fn new(rom: Arc<Rom>) -> Result<NesContext, RomError> {
        let desc = *rom.description();
        let mut mem: MemoryBus<NesPort> =
            MemoryBus::new(MEM_SIZE_LOG2, MEM_PAGE_SIZE_LOG2).map_err(|err| {
                RomError::InvalidFormat(format!("bus construction failed: {err}"))
            })?;

        let map = |err| RomError::InvalidFormat(format!("memory map install failed: {err}"));

        // Anything not claimed below reads as open bus.
        let open_bus = mem.add_access(Access::Io(NesPort::OpenBus));
        mem.add_range_rw(0x0000, 0xFFFF, open_bus).map_err(map)?;

        // 2KB of work RAM mirrored four times.
        let cpu_ram = mem.add_ram_slot(CPU_RAM_SIZE);
        let ram_access = mem.add_access(Access::Mem { slot: cpu_ram, base: 0 });
        for mirror in 0..4u32 {
            let start = mirror * 0x0800;
            mem.add_range_rw(start, start + 0x07FF, ram_access).map_err(map)?;
        }

        let ppu_regs = mem.add_access(Access::Io(NesPort::PpuRegs));
        mem.add_range_rw(0x2000, 0x3FFF, ppu_regs).map_err(map)?;

        let apu_regs = mem.add_access(Access::Io(NesPort::ApuRegs));
        mem.add_range_rw(0x4000, 0x401F, apu_regs).map_err(map)?;

        let save_ram_slot = mem.add_ram_slot(SAVE_RAM_SIZE);
        let save_ram = mem.add_access(Access::Mem { slot: save_ram_slot, base: 0 });
        mem.add_range_rw(0x6000, 0x7FFF, save_ram).map_err(map)?;

        let prg_slot = mem.add_rom_slot(Arc::clone(rom.prg_rom()));

        let mut ppu = Ppu::new(MASTER_CLOCK_PPU_DIVIDER_NTSC, rom.chr_rom(), desc.mirroring);
        let mut mapper = create_mapper(&rom)?;
        {
            let mut mapper_bus = MapperBus {
                mem: &mut mem,
                ppu: &mut ppu,
                prg_slot,
                prg_size: rom.prg_rom().len(),
            };
            mapper.initialize(&mut mapper_bus).map_err(map)?;
        }

        let mut context = NesContext {
            rom,
            clock: Clock::new(),
            mem,
            cpu: Cpu::new(MASTER_CLOCK_CPU_DIVIDER_NTSC),
            ppu,
            apu: Apu::new(
                MASTER_CLOCK_CPU_DIVIDER_NTSC,
                MASTER_CLOCK_FREQUENCY_NTSC,
            ),
            mapper,
            signals: CpuSignals::default(),
            prg_slot,
            save_ram_slot,
            fault: false,
            video: vec![0; (DISPLAY_SIZE_X * DISPLAY_SIZE_Y) as usize],
        };
        context.power_on();
        Ok(context)
    }

    fn power_on(&mut self) {
        let prg_slot = self.prg_slot;
        let prg_size = self.rom.prg_rom().len();
        let NesContext {
            clock,
            mem,
            cpu,
            ppu,
            apu,
            mapper,
            signals,
            ..
        } = self;
        let mut bus = CpuBus {
            mem,
            ppu,
            apu,
            mapper: mapper.as_mut(),
            clock,
            signals,
            prg_slot,
            prg_size,
        };
        cpu.power_on(&mut bus);
    }

    fn run_clock_frame(&mut self) {
        let prg_slot = self.prg_slot;
        let prg_size = self.rom.prg_rom().len();
        let scanline_events = self.mapper.wants_scanline_events();

        let NesContext {
            clock,
            mem,
            cpu,
            ppu,
            apu,
            mapper,
            signals,
            ..
        } = self;

        ppu.begin_frame(clock);
        apu.begin_frame(clock);
        mapper.begin_frame();
        if scanline_events {
            clock.add_event(NesEvent::VisibleLine, 0);
        }

        clock.begin_execute(MASTER_CLOCK_PER_FRAME_NTSC);
        while let Some(desired) = clock.next_step() {
            // Every listener learns the horizon first, then they execute in
            // registration order: CPU, PPU, APU.
            cpu.set_desired_ticks(desired);
            ppu.set_desired_ticks(desired);
            apu.set_desired_ticks(desired);
            {
                let mut bus = CpuBus {
                    mem: &mut *mem,
                    ppu: &mut *ppu,
                    apu: &mut *apu,
                    mapper: mapper.as_mut(),
                    clock: &mut *clock,
                    signals: &mut *signals,
                    prg_slot,
                    prg_size,
                };
                cpu.execute(&mut bus);
            }
            ppu.execute();
            apu.execute(mem);

            while let Some((tick, event)) = clock.pop_due_event() {
                match event {
                    NesEvent::VBlankStart => {
                        if ppu.on_vblank_start() {
                            signals.nmi = true;
                        }
                    }
                    NesEvent::VBlankEnd => ppu.on_vblank_end(),
                    NesEvent::ApuSequence => apu.on_sequence_event(clock, mem, tick),
                    NesEvent::VisibleLine => {
                        if ppu.rendering_enabled() {
                            mapper.on_visible_line(tick);
                        }
                        let line = tick / LINE_TICKS + 1;
                        if line < VISIBLE_LINES {
                            clock.add_event(NesEvent::VisibleLine, line * LINE_TICKS);
                        }
                    }
                }
            }
        }

        let target = clock.advance();
        cpu.advance_clock(target);
        ppu.advance_clock(target);
        apu.advance_clock(target);
        clock.clear_events();
        apu.end_frame();
    }

    fn blit(&mut self) {
        let src = self.ppu.frame_buffer();
        for row in 0..DISPLAY_SIZE_Y as usize {
            let src_start = (row + OVERSCAN_LINES) * FRAME_WIDTH;
            let dst_start = row * FRAME_WIDTH;
            self.video[dst_start..dst_start + FRAME_WIDTH]
                .copy_from_slice(&src[src_start..src_start + FRAME_WIDTH]);
        }
    }

    pub fn rom(&self) -> &Arc<Rom> {
        &self.rom
    }
}

impl EmuContext for NesContext {
    fn display_size(&self) -> (u32, u32) {
        (DISPLAY_SIZE_X, DISPLAY_SIZE_Y)
    }

    fn reset(&mut self) {
        self.clock.reset();
        self.cpu.reset_clock();
        self.ppu.reset_clock();
        self.apu.reset_clock();
        self.ppu.reset();
        self.apu.reset();
        self.signals = CpuSignals::default();
        self.fault = false;

        let prg_slot = self.prg_slot;
        let prg_size = self.rom.prg_rom().len();
        let NesContext {
            clock,
            mem,
            cpu,
            ppu,
            apu,
            mapper,
            signals,
            ..
        } = self;
        {
            let mut mapper_bus = MapperBus {
                mem: &mut *mem,
                ppu: &mut *ppu,
                prg_slot,
                prg_size,
            };
            mapper.reset(&mut mapper_bus);
        }
        let mut bus = CpuBus {
            mem: &mut *mem,
            ppu: &mut *ppu,
            apu: &mut *apu,
            mapper: mapper.as_mut(),
            clock: &mut *clock,
            signals: &mut *signals,
            prg_slot,
            prg_size,
        };
        cpu.reset(&mut bus);
    }

    fn set_controller(&mut self, index: u32, buttons: Buttons) {
        self.apu.set_controller(index as usize, buttons);
    }

    fn set_sound_samples_per_frame(&mut self, samples: usize) {
        self.apu.set_sound_samples_per_frame(samples);
    }

    fn run_frame(&mut self) -> bool {
        if self.fault {
            return false;
        }
        self.run_clock_frame();
        self.blit();
        if self.cpu.error().is_some() {
            log::warn!("context poisoned: {:?}", self.cpu.error());
            self.fault = true;
            return false;
        }
        true
    }

    fn video(&self) -> &[u32] {
        &self.video
    }

    fn audio(&self) -> &[i16] {
        self.apu.sound_buffer()
    }

    fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        let state = NesContextState {
            version: CONTEXT_STATE_VERSION,
            clock: self.clock.save_state(),
            cpu: self.cpu.save_state(),
            ppu: self.ppu.save_state(),
            apu: self.apu.save_state(),
            bus: self.mem.save_state(),
            signals: self.signals,
            mapper: self.mapper.save_state()?,
        };
        savestate::encode(&state)
    }

    fn load_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let state: NesContextState = savestate::decode(bytes)?;
        savestate::check_version("context", state.version, CONTEXT_STATE_VERSION)?;
        if !self.clock.restore_state(&state.clock) {
            return Err(SaveStateError::InvalidState("clock mid-frame"));
        }
        self.cpu.restore_state(&state.cpu)?;
        self.ppu.restore_state(&state.ppu)?;
        self.apu.restore_state(&state.apu)?;
        if !self.mem.restore_state(&state.bus) {
            return Err(SaveStateError::InvalidState("cpu bus shape"));
        }
        self.mapper.restore_state(&state.mapper)?;
        self.signals = state.signals;
        self.fault = false;
        Ok(())
    }

    fn save_game_data(&self) -> Result<Vec<u8>, SaveStateError> {
        savestate::encode(&self.mem.slot(self.save_ram_slot).to_vec())
    }

    fn load_game_data(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let data: Vec<u8> = savestate::decode(bytes)?;
        match self.mem.slot_mut(self.save_ram_slot) {
            Some(slot) if slot.len() == data.len() => {
                slot.copy_from_slice(&data);
                Ok(())
            }
            _ => Err(SaveStateError::InvalidState("save RAM size mismatch")),
        }
    }

    fn read8(&mut self, addr: u32) -> u8 {
        match self.mem.read_uncached(addr & 0xFFFF) {
            emu_core::membus::Fetched::Value(value) => value,
            emu_core::membus::Fetched::Io(..) => 0,
        }
    }

    fn write8(&mut self, addr: u32, value: u8) {
        // Debug pokes only touch direct memory; device ports need a tick.
        self.mem.write_uncached(addr & 0xFFFF, value);
    }
}

#[cfg(test)]
mod context_tests;
