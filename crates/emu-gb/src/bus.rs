use crate::audio::Audio;
use crate::cpu::GbIo;
use crate::interrupts::Interrupts;
use crate::joypad::Joypad;
use crate::mapper::{GbMapperBus, Mapper};
use crate::serial::Serial;
use crate::timer::Timer;
use crate::video::{Model, Video};
use emu_core::clock::{Clock, Tick};
use emu_core::membus::{Access, AccessId, Accessor, Fetched, MemoryBus, SlotId};
use emu_core::regbank::RegisterBank;
use serde::{Deserialize, Serialize};

/// I/O ports on the CPU bus. RAM, ROM views, VRAM and OAM resolve to
/// direct memory; the rest routes through here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GbPort {
    IoRegs,
    CartWrite,
    CartRam,
    OpenBus,
}

/// Timer-event payloads routed by the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GbEvent {
    LcdLine(u8),
    Hblank(u8),
    TimerOverflow,
    SerialDone,
    ApuSequence,
}

/// The CPU's window onto the machine for one execute slice.
pub struct CpuBus<'a> {
    pub mem: &'a mut MemoryBus<GbPort>,
    pub video: &'a mut Video,
    pub audio: &'a mut Audio,
    pub timer: &'a mut Timer,
    pub serial: &'a mut Serial,
    pub joypad: &'a mut Joypad,
    pub interrupts: &'a mut Interrupts,
    pub mapper: &'a mut dyn Mapper,
    pub clock: &'a mut Clock<GbEvent>,
    pub io_bank: &'a mut RegisterBank,

    pub model: Model,
    pub rom_slot: SlotId,
    pub rom_size: usize,
    pub vram_slot: SlotId,
    pub oam_slot: SlotId,
    pub wram_slot: SlotId,
    pub vram_access: AccessId,
    pub wram_banked_access: AccessId,
}

impl CpuBus<'_> {
    fn io_read(&mut self, port: GbPort, tick: Tick, rel: u32) -> u8 {
        match port {
            GbPort::IoRegs => self.io_reg_read(tick, rel),
            GbPort::CartRam => self.mapper.ram_read(0xA000 + rel as u16),
            GbPort::CartWrite | GbPort::OpenBus => 0xFF,
        }
    }

    fn io_write(&mut self, port: GbPort, tick: Tick, rel: u32, value: u8) {
        match port {
            GbPort::IoRegs => self.io_reg_write(tick, rel, value),
            GbPort::CartRam => self.mapper.ram_write(0xA000 + rel as u16, value),
            GbPort::CartWrite => {
                let mut mapper_bus = GbMapperBus {
                    mem: &mut *self.mem,
                    rom_slot: self.rom_slot,
                    rom_size: self.rom_size,
                };
                self.mapper.cpu_write(&mut mapper_bus, tick, rel as u16, value);
            }
            GbPort::OpenBus => {}
        }
    }

    fn io_reg_read(&mut self, tick: Tick, index: u32) -> u8 {
        let value = match index {
            0x00 => self.joypad.read(),
            0x01 => self.serial.read_sb(),
            0x02 => self.serial.read_sc(),
            0x04 => self.timer.read_div(tick),
            0x05 => self.timer.read_tima(tick),
            0x06 => self.timer.read_tma(),
            0x07 => self.timer.read_tac(),
            0x0F => self.interrupts.read_if(),
            0x10..=0x3F => self.audio.reg_read(tick, index),
            0x40 => self.video.read_lcdc(),
            0x41 => self.video.read_stat(tick),
            0x42 => self.video.read_scy(),
            0x43 => self.video.read_scx(),
            0x44 => self.video.read_ly(tick),
            0x45 => self.video.read_lyc(),
            0x46 => self.video.read_dma(),
            0x47 => self.video.read_bgp(),
            0x48 => self.video.read_obp0(),
            0x49 => self.video.read_obp1(),
            0x4A => self.video.read_wy(),
            0x4B => self.video.read_wx(),
            0x4F if self.model == Model::Gbc => self.video.read_vbk(),
            0x68 if self.model == Model::Gbc => self.video.read_bgpi(),
            0x69 if self.model == Model::Gbc => self.video.read_bgpd(),
            0x6A if self.model == Model::Gbc => self.video.read_obpi(),
            0x6B if self.model == Model::Gbc => self.video.read_obpd(),
            0x70 if self.model == Model::Gbc => self.io_bank.shadow(index as usize),
            0xFF => self.interrupts.read_ie(),
            _ => self.io_bank.shadow(index as usize),
        };
        self.io_bank.traced_read(index as usize, value)
    }

    fn io_reg_write(&mut self, tick: Tick, index: u32, value: u8) {
        self.io_bank.traced_write(index as usize, value);
        match index {
            0x00 => self.joypad.write(value),
            0x01 => self.serial.write_sb(value),
            0x02 => self.serial.write_sc(self.clock, tick, value),
            0x04 => self.timer.write_div(self.clock, tick),
            0x05 => self.timer.write_tima(self.clock, tick, value),
            0x06 => self.timer.write_tma(value),
            0x07 => self.timer.write_tac(self.clock, tick, value),
            0x0F => self.interrupts.write_if(value),
            0x10..=0x3F => self.audio.reg_write(tick, index, value),
            0x40 => self.video.write_lcdc(self.mem, tick, value),
            0x41 => self.video.write_stat(value),
            0x42 => self.video.write_scy(self.mem, tick, value),
            0x43 => self.video.write_scx(self.mem, tick, value),
            0x44 => { /* LY is read-only */ }
            0x45 => self.video.write_lyc(value),
            0x46 => {
                let page = self.video.write_dma(self.mem, tick, value);
                self.oam_dma(page);
            }
            0x47 => self.video.write_bgp(self.mem, tick, value),
            0x48 => self.video.write_obp0(self.mem, tick, value),
            0x49 => self.video.write_obp1(self.mem, tick, value),
            0x4A => self.video.write_wy(self.mem, tick, value),
            0x4B => self.video.write_wx(self.mem, tick, value),
            0x4F if self.model == Model::Gbc => {
                let bank = self.video.write_vbk(value);
                let slot = self.vram_slot;
                self.mem.set_access(
                    self.vram_access,
                    Access::Mem { slot, base: bank as u32 * 0x2000 },
                );
            }
            0x55 if self.model == Model::Gbc => self.vram_dma(tick, value),
            0x68 if self.model == Model::Gbc => self.video.write_bgpi(value),
            0x69 if self.model == Model::Gbc => self.video.write_bgpd(self.mem, tick, value),
            0x6A if self.model == Model::Gbc => self.video.write_obpi(value),
            0x6B if self.model == Model::Gbc => self.video.write_obpd(self.mem, tick, value),
            0x70 if self.model == Model::Gbc => {
                // SVBK: WRAM bank 1-7 in the $D000 window.
                let bank = (value & 0x07).max(1);
                let slot = self.wram_slot;
                self.mem.set_access(
                    self.wram_banked_access,
                    Access::Mem { slot, base: bank as u32 * 0x1000 },
                );
            }
            0xFF => self.interrupts.write_ie(value),
            _ => { /* shadow byte already holds the write */ }
        }
    }

    /// $FF46: atomic 160-byte OAM upload from `page << 8`.
    fn oam_dma(&mut self, page: u8) {
        let base = (page as u32) << 8;
        let mut data = [0u8; 0xA0];
        for (i, out) in data.iter_mut().enumerate() {
            *out = match self.mem.read_uncached(base + i as u32) {
                Fetched::Value(value) => value,
                Fetched::Io(..) => 0xFF,
            };
        }
        if let Some(oam) = self.mem.slot_mut(self.oam_slot) {
            oam.copy_from_slice(&data);
        }
    }

    /// $FF55: CGB VRAM DMA. The hblank-paced mode is folded into one
    /// immediate transfer.
    fn vram_dma(&mut self, tick: Tick, value: u8) {
        let src = u16::from_be_bytes([
            self.io_bank.shadow(0x51),
            self.io_bank.shadow(0x52),
        ]) & 0xFFF0;
        let dst = (u16::from_be_bytes([
            self.io_bank.shadow(0x53),
            self.io_bank.shadow(0x54),
        ]) & 0x1FF0) as u32;
        let length = ((value & 0x7F) as u32 + 1) * 16;
        if value & 0x80 != 0 {
            log::debug!("HDMA hblank transfer folded into an immediate copy");
        }

        self.video.catch_up(self.mem, tick);
        let bank = self.video.vram_bank() as u32 * 0x2000;
        for i in 0..length {
            let byte = match self.mem.read_uncached(src as u32 + i) {
                Fetched::Value(byte) => byte,
                Fetched::Io(..) => 0xFF,
            };
            if let Some(vram) = self.mem.slot_mut(self.vram_slot) {
                let offset = (bank + ((dst + i) & 0x1FFF)) as usize;
                vram[offset] = byte;
            }
        }
        // Completed transfers read back $FF.
        self.io_bank.set_shadow(0x55, 0xFF);
    }
}

impl GbIo for CpuBus<'_> {
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

    fn pending_interrupts(&self) -> u8 {
        self.interrupts.pending()
    }

    fn acknowledge_interrupt(&mut self, bit: u8) {
        self.interrupts.acknowledge(bit);
    }
}
