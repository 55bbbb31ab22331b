use crate::audio::{Audio, AudioState};
use crate::bus::{CpuBus, GbEvent, GbPort};
use crate::cpu::{Cpu, CpuState};
use crate::interrupts::{InterruptState, Interrupts, Signal};
use crate::joypad::Joypad;
use crate::mapper::{GbMapperBus, Mapper, create_mapper};
use crate::rom::{Rom, RomError};
use crate::serial::{Serial, SerialState};
use crate::timer::{Timer, TimerState};
use crate::video::{DISPLAY_SIZE_X, DISPLAY_SIZE_Y, Model, Video, VideoState};
use emu_core::api::EmuContext;
use emu_core::clock::{Clock, ClockListener, ClockState, Tick};
use emu_core::input::Buttons;
use emu_core::membus::{Access, AccessId, BusState, MemoryBus, SlotId};
use emu_core::regbank::{RegAccess, RegisterBank};
use emu_core::savestate::{self, SaveStateError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MASTER_CLOCK_FREQUENCY_GB: u32 = 4_194_304;
pub const MASTER_CLOCK_PER_FRAME: Tick = 456 * 154;

const MEM_SIZE_LOG2: u32 = 16;
const MEM_PAGE_SIZE_LOG2: u32 = 10;

const HRAM_SIZE: usize = 0x7F;
const OAM_SIZE: usize = 0xA0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GbContextState {
    version: u32,
    clock: ClockState,
    cpu: CpuState,
    video: VideoState,
    audio: AudioState,
    timer: TimerState,
    serial: SerialState,
    joypad: Joypad,
    interrupts: InterruptState,
    bus: BusState<GbPort>,
    io_shadow: Vec<u8>,
    mapper: Vec<u8>,
}

const CONTEXT_STATE_VERSION: u32 = 1;

/// One Game Boy gameplay session; the `model` flag selects the monochrome
/// or color machine wired around the same core.
pub struct GbContext {
    rom: Arc<Rom>,
    model: Model,
    clock: Clock<GbEvent>,
    mem: MemoryBus<GbPort>,
    cpu: Cpu,
    video: Video,
    audio: Audio,
    timer: Timer,
    serial: Serial,
    joypad: Joypad,
    interrupts: Interrupts,
    mapper: Box<dyn Mapper>,
    io_bank: RegisterBank,

    rom_slot: SlotId,
    vram_slot: SlotId,
    oam_slot: SlotId,
    wram_slot: SlotId,
    vram_access: AccessId,
    wram_banked_access: AccessId,

    fault: bool,
    video_out: Vec<u32>,
}

impl GbContext {
    pub fn new(rom: Arc<Rom>, model: Model) -> Result<GbContext, RomError> {
        let desc = rom.description().clone();
        let map = |err| RomError::InvalidFormat(format!("memory map install failed: {err}"));

        let mut mem: MemoryBus<GbPort> = MemoryBus::new(MEM_SIZE_LOG2, MEM_PAGE_SIZE_LOG2)
            .map_err(|err| RomError::InvalidFormat(format!("bus construction failed: {err}")))?;

        // Anything unclaimed reads as open bus, including $FEA0-$FEFF.
        let open_bus = mem.add_access(Access::Io(GbPort::OpenBus));
        mem.add_range_rw(0x0000, 0xFFFF, open_bus).map_err(map)?;

        let rom_slot = mem.add_rom_slot(Arc::clone(rom.content()));

        let vram_size = if model == Model::Gbc { 0x4000 } else { 0x2000 };
        let vram_slot = mem.add_ram_slot(vram_size);
        let vram_access = mem.add_access(Access::Mem { slot: vram_slot, base: 0 });
        mem.add_range_rw(0x8000, 0x9FFF, vram_access).map_err(map)?;

        let wram_size = if model == Model::Gbc { 0x8000 } else { 0x2000 };
        let wram_slot = mem.add_ram_slot(wram_size);
        let wram_fixed = mem.add_access(Access::Mem { slot: wram_slot, base: 0 });
        let wram_banked_access = mem.add_access(Access::Mem { slot: wram_slot, base: 0x1000 });
        mem.add_range_rw(0xC000, 0xCFFF, wram_fixed).map_err(map)?;
        mem.add_range_rw(0xD000, 0xDFFF, wram_banked_access).map_err(map)?;
        // Echo RAM mirrors both windows.
        mem.add_range_rw(0xE000, 0xEFFF, wram_fixed).map_err(map)?;
        mem.add_range_rw(0xF000, 0xFDFF, wram_banked_access).map_err(map)?;

        let oam_slot = mem.add_ram_slot(OAM_SIZE);
        let oam_access = mem.add_access(Access::Mem { slot: oam_slot, base: 0 });
        mem.add_range_rw(0xFE00, 0xFE9F, oam_access).map_err(map)?;

        let io_regs = mem.add_access(Access::Io(GbPort::IoRegs));
        mem.add_range_rw(0xFF00, 0xFFFF, io_regs).map_err(map)?;

        // High RAM carves a direct window out of the register space.
        let hram_slot = mem.add_ram_slot(HRAM_SIZE);
        let hram_access = mem.add_access(Access::Mem { slot: hram_slot, base: 0 });
        mem.add_range_rw(0xFF80, 0xFFFE, hram_access).map_err(map)?;

        let mut mapper = create_mapper(&desc);
        {
            let mut mapper_bus = GbMapperBus {
                mem: &mut mem,
                rom_slot,
                rom_size: rom.content().len(),
            };
            mapper.initialize(&mut mapper_bus).map_err(map)?;
        }

        let mut io_bank = RegisterBank::new(0xFF00, 0x100);
        define_io_registers(&mut io_bank);

        Ok(GbContext {
            model,
            clock: Clock::new(),
            mem,
            cpu: Cpu::new(1),
            video: Video::new(model, vram_slot, oam_slot),
            audio: Audio::new(),
            timer: Timer::new(),
            serial: Serial::new(),
            joypad: Joypad::new(),
            interrupts: Interrupts::new(),
            mapper,
            io_bank,
            rom_slot,
            vram_slot,
            oam_slot,
            wram_slot,
            vram_access,
            wram_banked_access,
            fault: false,
            video_out: vec![0; DISPLAY_SIZE_X * DISPLAY_SIZE_Y],
            rom,
        })
    }

    pub fn rom(&self) -> &Arc<Rom> {
        &self.rom
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// Bytes the ROM pushed out the serial port; blargg's suites print
    /// their verdict here.
    pub fn serial_output(&self) -> &[u8] {
        self.serial.output()
    }

    fn run_clock_frame(&mut self) {
        let rom_slot = self.rom_slot;
        let rom_size = self.rom.content().len();
        let model = self.model;
        let vram_slot = self.vram_slot;
        let oam_slot = self.oam_slot;
        let wram_slot = self.wram_slot;
        let vram_access = self.vram_access;
        let wram_banked_access = self.wram_banked_access;

        let GbContext {
            clock,
            mem,
            cpu,
            video,
            audio,
            timer,
            serial,
            joypad,
            interrupts,
            mapper,
            io_bank,
            ..
        } = self;

        video.begin_frame(clock);
        audio.begin_frame(clock);
        timer.begin_frame(clock);
        serial.begin_frame(clock);
        mapper.begin_frame();

        clock.begin_execute(MASTER_CLOCK_PER_FRAME);
        while let Some(desired) = clock.next_step() {
            // Every listener learns the horizon first, then they execute in
            // registration order: CPU, video, audio.
            cpu.set_desired_ticks(desired);
            video.set_desired_ticks(desired);
            audio.set_desired_ticks(desired);
            {
                let mut bus = CpuBus {
                    mem: &mut *mem,
                    video: &mut *video,
                    audio: &mut *audio,
                    timer: &mut *timer,
                    serial: &mut *serial,
                    joypad: &mut *joypad,
                    interrupts: &mut *interrupts,
                    mapper: mapper.as_mut(),
                    clock: &mut *clock,
                    io_bank: &mut *io_bank,
                    model,
                    rom_slot,
                    rom_size,
                    vram_slot,
                    oam_slot,
                    wram_slot,
                    vram_access,
                    wram_banked_access,
                };
                cpu.execute(&mut bus);
            }
            video.execute(mem);
            audio.execute();

            while let Some((tick, event)) = clock.pop_due_event() {
                match event {
                    GbEvent::LcdLine(line) => video.on_lcd_line(clock, interrupts, line, tick),
                    GbEvent::Hblank(line) => video.on_hblank(interrupts, line),
                    GbEvent::TimerOverflow => timer.on_overflow(clock, interrupts, tick),
                    GbEvent::SerialDone => serial.on_transfer_done(interrupts, tick),
                    GbEvent::ApuSequence => audio.on_sequence_event(clock, tick),
                }
            }
        }

        let target = clock.advance();
        cpu.advance_clock(target);
        video.advance_clock(target);
        audio.advance_clock(target);
        timer.advance_clock(target);
        serial.advance_clock(target);
        clock.clear_events();
        audio.end_frame();
    }
}

impl EmuContext for GbContext {
    fn display_size(&self) -> (u32, u32) {
        (DISPLAY_SIZE_X as u32, DISPLAY_SIZE_Y as u32)
    }

    fn reset(&mut self) {
        self.clock.reset();
        self.cpu.reset_clock();
        self.video.reset_clock();
        self.audio.reset_clock();
        self.timer.reset_clock();
        self.serial.reset_clock();

        self.cpu.reset();
        self.video.reset();
        self.audio.reset();
        self.timer.reset();
        self.serial.reset();
        self.joypad.reset();
        self.interrupts.reset();
        self.fault = false;

        let rom_slot = self.rom_slot;
        let rom_size = self.rom.content().len();
        let GbContext { mem, mapper, .. } = self;
        let mut mapper_bus = GbMapperBus {
            mem,
            rom_slot,
            rom_size,
        };
        mapper.reset(&mut mapper_bus);
    }

    fn set_controller(&mut self, index: u32, buttons: Buttons) {
        // One pad on the machine itself.
        if index == 0 && self.joypad.set_buttons(buttons) {
            self.interrupts.raise(Signal::Joypad);
        }
    }

    fn set_sound_samples_per_frame(&mut self, samples: usize) {
        self.audio.set_sound_samples_per_frame(samples);
    }

    fn run_frame(&mut self) -> bool {
        if self.fault {
            return false;
        }
        self.run_clock_frame();
        self.video_out.copy_from_slice(self.video.frame_buffer());
        if self.cpu.error().is_some() {
            log::warn!("context poisoned: {:?}", self.cpu.error());
            self.fault = true;
            return false;
        }
        true
    }

    fn video(&self) -> &[u32] {
        &self.video_out
    }

    fn audio(&self) -> &[i16] {
        self.audio.sound_buffer()
    }

    fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        let state = GbContextState {
            version: CONTEXT_STATE_VERSION,
            clock: self.clock.save_state(),
            cpu: self.cpu.save_state(),
            video: self.video.save_state(),
            audio: self.audio.save_state(),
            timer: self.timer.save_state(),
            serial: self.serial.save_state(),
            joypad: self.joypad,
            interrupts: self.interrupts.save_state(),
            bus: self.mem.save_state(),
            io_shadow: self.io_bank.shadow_bytes().to_vec(),
            mapper: self.mapper.save_state()?,
        };
        savestate::encode(&state)
    }

    fn load_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let state: GbContextState = savestate::decode(bytes)?;
        savestate::check_version("context", state.version, CONTEXT_STATE_VERSION)?;
        if !self.clock.restore_state(&state.clock) {
            return Err(SaveStateError::InvalidState("clock mid-frame"));
        }
        self.cpu.restore_state(&state.cpu)?;
        self.video.restore_state(&state.video)?;
        self.audio.restore_state(&state.audio)?;
        self.timer.restore_state(&state.timer)?;
        self.serial.restore_state(&state.serial)?;
        self.interrupts.restore_state(&state.interrupts)?;
        if !self.mem.restore_state(&state.bus) {
            return Err(SaveStateError::InvalidState("cpu bus shape"));
        }
        if !self.io_bank.restore_shadow(&state.io_shadow) {
            return Err(SaveStateError::InvalidState("io shadow size"));
        }
        self.mapper.restore_state(&state.mapper)?;
        self.joypad = state.joypad;
        self.fault = false;
        Ok(())
    }

    fn save_game_data(&self) -> Result<Vec<u8>, SaveStateError> {
        self.mapper.save_game_data(&self.mem)
    }

    fn load_game_data(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let GbContext { mem, mapper, .. } = self;
        mapper.load_game_data(mem, bytes)
    }

    fn read8(&mut self, addr: u32) -> u8 {
        match self.mem.read_uncached(addr & 0xFFFF) {
            emu_core::membus::Fetched::Value(value) => value,
            emu_core::membus::Fetched::Io(..) => 0,
        }
    }

    fn write8(&mut self, addr: u32, value: u8) {
        self.mem.write_uncached(addr & 0xFFFF, value);
    }
}

fn define_io_registers(bank: &mut RegisterBank) {
    bank.define(0x00, "JOYP", "Joypad", RegAccess::ReadWrite);
    bank.define(0x01, "SB", "Serial transfer data", RegAccess::ReadWrite);
    bank.define(0x02, "SC", "Serial transfer control", RegAccess::ReadWrite);
    bank.define(0x04, "DIV", "Divider register", RegAccess::ReadWrite);
    bank.define(0x05, "TIMA", "Timer counter", RegAccess::ReadWrite);
    bank.define(0x06, "TMA", "Timer modulo", RegAccess::ReadWrite);
    bank.define(0x07, "TAC", "Timer control", RegAccess::ReadWrite);
    bank.define(0x0F, "IF", "Interrupt flag", RegAccess::ReadWrite);
    bank.define(0x10, "NR10", "Channel 1 sweep", RegAccess::ReadWrite);
    bank.define(0x11, "NR11", "Channel 1 length/duty", RegAccess::ReadWrite);
    bank.define(0x12, "NR12", "Channel 1 envelope", RegAccess::ReadWrite);
    bank.define(0x13, "NR13", "Channel 1 frequency low", RegAccess::Write);
    bank.define(0x14, "NR14", "Channel 1 frequency high", RegAccess::ReadWrite);
    bank.define(0x16, "NR21", "Channel 2 length/duty", RegAccess::ReadWrite);
    bank.define(0x17, "NR22", "Channel 2 envelope", RegAccess::ReadWrite);
    bank.define(0x18, "NR23", "Channel 2 frequency low", RegAccess::Write);
    bank.define(0x19, "NR24", "Channel 2 frequency high", RegAccess::ReadWrite);
    bank.define(0x1A, "NR30", "Channel 3 enable", RegAccess::ReadWrite);
    bank.define(0x1B, "NR31", "Channel 3 length", RegAccess::ReadWrite);
    bank.define(0x1C, "NR32", "Channel 3 level", RegAccess::ReadWrite);
    bank.define(0x1D, "NR33", "Channel 3 frequency low", RegAccess::Write);
    bank.define(0x1E, "NR34", "Channel 3 frequency high", RegAccess::ReadWrite);
    bank.define(0x20, "NR41", "Channel 4 length", RegAccess::ReadWrite);
    bank.define(0x21, "NR42", "Channel 4 envelope", RegAccess::ReadWrite);
    bank.define(0x22, "NR43", "Channel 4 polynomial", RegAccess::ReadWrite);
    bank.define(0x23, "NR44", "Channel 4 control", RegAccess::ReadWrite);
    bank.define(0x24, "NR50", "Master volume", RegAccess::ReadWrite);
    bank.define(0x25, "NR51", "Output routing", RegAccess::ReadWrite);
    bank.define(0x26, "NR52", "Sound on/off", RegAccess::ReadWrite);
    bank.define(0x40, "LCDC", "LCD control", RegAccess::ReadWrite);
    bank.define(0x41, "STAT", "LCD status", RegAccess::ReadWrite);
    bank.define(0x42, "SCY", "Scroll Y", RegAccess::ReadWrite);
    bank.define(0x43, "SCX", "Scroll X", RegAccess::ReadWrite);
    bank.define(0x44, "LY", "LCD Y coordinate", RegAccess::Read);
    bank.define(0x45, "LYC", "LY compare", RegAccess::ReadWrite);
    bank.define(0x46, "DMA", "OAM DMA start", RegAccess::Write);
    bank.define(0x47, "BGP", "BG palette", RegAccess::ReadWrite);
    bank.define(0x48, "OBP0", "Object palette 0", RegAccess::ReadWrite);
    bank.define(0x49, "OBP1", "Object palette 1", RegAccess::ReadWrite);
    bank.define(0x4A, "WY", "Window Y", RegAccess::ReadWrite);
    bank.define(0x4B, "WX", "Window X minus 7", RegAccess::ReadWrite);
    bank.define(0x4D, "KEY1", "Speed switch (CGB)", RegAccess::ReadWrite);
    bank.define(0x4F, "VBK", "VRAM bank (CGB)", RegAccess::ReadWrite);
    bank.define(0x51, "HDMA1", "DMA source high (CGB)", RegAccess::Write);
    bank.define(0x52, "HDMA2", "DMA source low (CGB)", RegAccess::Write);
    bank.define(0x53, "HDMA3", "DMA destination high (CGB)", RegAccess::Write);
    bank.define(0x54, "HDMA4", "DMA destination low (CGB)", RegAccess::Write);
    bank.define(0x55, "HDMA5", "DMA length/mode (CGB)", RegAccess::ReadWrite);
    bank.define(0x68, "BGPI", "BG palette index (CGB)", RegAccess::ReadWrite);
    bank.define(0x69, "BGPD", "BG palette data (CGB)", RegAccess::ReadWrite);
    bank.define(0x6A, "OBPI", "Object palette index (CGB)", RegAccess::ReadWrite);
    bank.define(0x6B, "OBPD", "Object palette data (CGB)", RegAccess::ReadWrite);
    bank.define(0x70, "SVBK", "WRAM bank (CGB)", RegAccess::ReadWrite);
    bank.define(0xFF, "IE", "Interrupt enable", RegAccess::ReadWrite);
}

#[cfg(test)]
mod context_tests;
