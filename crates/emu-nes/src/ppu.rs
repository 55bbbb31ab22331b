mod tables;

use crate::bus::NesEvent;
use crate::rom::Mirroring;
use emu_core::clock::{Clock, ClockListener, Tick};
use emu_core::membus::{Access, AccessId, Accessor, BusState, Fetched, MemoryBus, SlotId, Table};
use emu_core::savestate::{self, SaveStateError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tables::{BIT_EXPAND, MASTER_PALETTE};

pub const FRAME_WIDTH: usize = 256;
pub const FRAME_HEIGHT: usize = 240;

const DOTS_PER_LINE: i32 = 341;
const VISIBLE_LINES: i32 = 240;
const VBLANK_LINE: i32 = 241;
const PRERENDER_LINE: i32 = 261;

const CTRL_NAMETABLE: u8 = 0x03;
const CTRL_INCREMENT: u8 = 0x04;
const CTRL_SPRITE_TABLE: u8 = 0x08;
const CTRL_BG_TABLE: u8 = 0x10;
const CTRL_SPRITE_SIZE: u8 = 0x20;
const CTRL_NMI_ENABLE: u8 = 0x80;

const MASK_SHOW_BG_LEFT: u8 = 0x02;
const MASK_SHOW_SPRITES_LEFT: u8 = 0x04;
const MASK_SHOW_BG: u8 = 0x08;
const MASK_SHOW_SPRITES: u8 = 0x10;

const SPRITES_PER_LINE: usize = 8;

/// Ports on the PPU's private bus. Pattern and nametable traffic goes to
/// direct memory; only palette RAM needs a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PpuPort {
    Palette,
}

#[derive(Debug, Clone, Copy, Default)]
struct LineSprite {
    x: u8,
    attr: u8,
    pattern_low: u8,
    pattern_high: u8,
    sprite_zero: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpuState {
    pub version: u32,
    pub ctrl: u8,
    pub mask: u8,
    pub oam_addr: u8,
    pub data_buffer: u8,
    pub vram_addr: u16,
    pub temp_addr: u16,
    pub fine_x: u8,
    pub write_toggle: bool,
    pub scanline_addr: u16,
    pub addr_dirty: bool,
    pub vblank_flag: bool,
    pub sprite_zero_hit: bool,
    pub sprite_overflow: bool,
    pub oam: Vec<u8>,
    pub palette: Vec<u8>,
    pub rendered_tick: Tick,
    pub desired_ticks: Tick,
    pub bus: BusState<PpuPort>,
}

pub const PPU_STATE_VERSION: u32 = 1;

/// Scanline-based picture unit. Lines are rasterized on demand: any
/// register access first renders everything the elapsed ticks have emitted,
/// so mid-frame writes land on the exact line they would affect.
pub struct Ppu {
    divider: u32,
    line_ticks: i32,

    ctrl: u8,
    mask: u8,
    oam_addr: u8,
    data_buffer: u8,

    // Loopy scroll state plus the per-line render address.
    vram_addr: u16,
    temp_addr: u16,
    fine_x: u8,
    write_toggle: bool,
    scanline_addr: u16,
    addr_dirty: bool,

    vblank_flag: bool,
    sprite_zero_hit: bool,
    sprite_overflow: bool,

    oam: [u8; 256],
    palette: [u8; 32],

    mem: MemoryBus<PpuPort>,
    mem_read_acc: Accessor,
    mem_write_acc: Accessor,
    // Pattern space as eight 1KB windows; mappers re-point these for any
    // banking granularity without touching the page tables.
    chr_access: [AccessId; 8],
    nametable_access: [AccessId; 4],
    nametable_slot: SlotId,
    chr_slot: SlotId,
    four_screen: bool,

    rendered_tick: Tick,
    desired_ticks: Tick,
    current_line: i32,
    line_sprites: [LineSprite; SPRITES_PER_LINE],
    line_sprite_count: usize,

    frame: Vec<u32>,
}

impl Ppu {
    pub fn new(divider: u32, chr_rom: &Arc<[u8]>, mirroring: Mirroring) -> Self {
        let mut mem = MemoryBus::new(14, 10).expect("static geometry");

        let four_screen = mirroring == Mirroring::FourScreen;
        let nametable_slot = mem.add_ram_slot(if four_screen { 0x1000 } else { 0x0800 });

        // Pattern memory is RAM only when the cartridge ships no CHR-ROM.
        let chr_slot = if chr_rom.is_empty() {
            mem.add_ram_slot(0x2000)
        } else {
            mem.add_rom_slot(Arc::clone(chr_rom))
        };

        let mut chr_access = [0; 8];
        for (i, access) in chr_access.iter_mut().enumerate() {
            *access = mem.add_access(Access::Mem { slot: chr_slot, base: i as u32 * 0x0400 });
        }
        let nametable_access = [
            mem.add_access(Access::Mem { slot: nametable_slot, base: 0 }),
            mem.add_access(Access::Mem { slot: nametable_slot, base: 0 }),
            mem.add_access(Access::Mem { slot: nametable_slot, base: 0 }),
            mem.add_access(Access::Mem { slot: nametable_slot, base: 0 }),
        ];
        let palette_access = mem.add_access(Access::Io(PpuPort::Palette));

        for (i, &access) in chr_access.iter().enumerate() {
            let start = i as u32 * 0x0400;
            mem.add_range_rw(start, start + 0x03FF, access).expect("pattern range");
        }
        for (i, &access) in nametable_access.iter().enumerate() {
            let start = 0x2000 + i as u32 * 0x0400;
            mem.add_range_rw(start, start + 0x03FF, access).expect("nametable range");
            // $3000-$3EFF mirrors the nametables; the last window stops
            // short of palette space.
            let mirror = start + 0x1000;
            let mirror_end = (mirror + 0x03FF).min(0x3EFF);
            mem.add_range_rw(mirror, mirror_end, access).expect("nametable mirror");
        }
        mem.add_range_rw(0x3F00, 0x3FFF, palette_access).expect("palette range");

        let mut ppu = Self {
            divider,
            line_ticks: DOTS_PER_LINE * divider as i32,
            ctrl: 0,
            mask: 0,
            oam_addr: 0,
            data_buffer: 0,
            vram_addr: 0,
            temp_addr: 0,
            fine_x: 0,
            write_toggle: false,
            scanline_addr: 0,
            addr_dirty: false,
            vblank_flag: false,
            sprite_zero_hit: false,
            sprite_overflow: false,
            oam: [0; 256],
            palette: [0; 32],
            mem,
            mem_read_acc: Accessor::new(Table::Read),
            mem_write_acc: Accessor::new(Table::Write),
            chr_access,
            nametable_access,
            nametable_slot,
            chr_slot,
            four_screen,
            rendered_tick: 0,
            desired_ticks: 0,
            current_line: -1,
            line_sprites: [LineSprite::default(); SPRITES_PER_LINE],
            line_sprite_count: 0,
            frame: vec![0; FRAME_WIDTH * FRAME_HEIGHT],
        };
        ppu.set_mirroring(mirroring);
        ppu
    }

    pub fn reset(&mut self) {
        self.ctrl = 0;
        self.mask = 0;
        self.oam_addr = 0;
        self.data_buffer = 0;
        self.vram_addr = 0;
        self.temp_addr = 0;
        self.fine_x = 0;
        self.write_toggle = false;
        self.scanline_addr = 0;
        self.addr_dirty = false;
        self.vblank_flag = false;
        self.sprite_zero_hit = false;
        self.sprite_overflow = false;
        self.current_line = -1;
        self.line_sprite_count = 0;
        self.frame.fill(0);
    }

    pub fn frame_buffer(&self) -> &[u32] {
        &self.frame
    }

    pub fn divider(&self) -> u32 {
        self.divider
    }

    #[inline]
    pub fn tick_of(&self, line: i32, dot: i32) -> Tick {
        (line * DOTS_PER_LINE + dot) * self.divider as i32
    }

    pub fn rendering_enabled(&self) -> bool {
        self.mask & (MASK_SHOW_BG | MASK_SHOW_SPRITES) != 0
    }

    pub fn chr_slot(&self) -> SlotId {
        self.chr_slot
    }

    pub fn chr_size(&self) -> usize {
        self.mem.slot(self.chr_slot).len()
    }

    /// Point one 1KB pattern window at `base` within CHR memory.
    pub fn set_chr_bank_1k(&mut self, window: usize, base: u32) {
        let slot = self.chr_slot;
        self.mem.set_access(self.chr_access[window], Access::Mem { slot, base });
    }

    /// 4KB banking: windows `index*4 ..` track consecutive kilobytes.
    pub fn set_chr_bank_4k(&mut self, index: usize, base: u32) {
        for i in 0..4 {
            self.set_chr_bank_1k(index * 4 + i, base + i as u32 * 0x0400);
        }
    }

    pub fn set_chr_bank_8k(&mut self, base: u32) {
        for i in 0..8 {
            self.set_chr_bank_1k(i, base + i as u32 * 0x0400);
        }
    }

    pub fn set_mirroring(&mut self, mirroring: Mirroring) {
        if self.four_screen {
            // Cartridge supplies the extra RAM; all four tables are unique.
            for (i, &access) in self.nametable_access.iter().enumerate() {
                let slot = self.nametable_slot;
                self.mem.set_access(access, Access::Mem { slot, base: i as u32 * 0x0400 });
            }
            return;
        }
        let bases: [u32; 4] = match mirroring {
            Mirroring::Horizontal => [0, 0, 0x0400, 0x0400],
            Mirroring::Vertical => [0, 0x0400, 0, 0x0400],
            Mirroring::Single0 => [0, 0, 0, 0],
            Mirroring::Single1 => [0x0400, 0x0400, 0x0400, 0x0400],
            Mirroring::FourScreen => [0, 0x0400, 0, 0x0400],
        };
        for (&access, &base) in self.nametable_access.iter().zip(bases.iter()) {
            let slot = self.nametable_slot;
            self.mem.set_access(access, Access::Mem { slot, base });
        }
    }

    /// Schedule this frame's fixed raster events.
    pub fn begin_frame(&mut self, clock: &mut Clock<NesEvent>) {
        clock.add_event(NesEvent::VBlankStart, self.tick_of(VBLANK_LINE, 1));
        clock.add_event(NesEvent::VBlankEnd, self.tick_of(PRERENDER_LINE, 1));
        self.current_line = -1;
        if self.rendering_enabled() {
            self.scanline_addr = self.temp_addr & 0x7FFF;
            self.addr_dirty = false;
        }
    }

    /// VBlank entry. Returns true when the CPU should take an NMI.
    pub fn on_vblank_start(&mut self) -> bool {
        self.vblank_flag = true;
        self.ctrl & CTRL_NMI_ENABLE != 0
    }

    pub fn on_vblank_end(&mut self) {
        self.vblank_flag = false;
        self.sprite_zero_hit = false;
        self.sprite_overflow = false;
    }

    // --- private bus helpers ---------------------------------------------

    fn mem_read(&mut self, addr: u16) -> u8 {
        match self.mem.read(&mut self.mem_read_acc, (addr & 0x3FFF) as u32) {
            Fetched::Value(value) => value,
            Fetched::Io(PpuPort::Palette, rel) => self.palette[palette_index(rel)],
        }
    }

    fn mem_write(&mut self, addr: u16, value: u8) {
        if let Some((PpuPort::Palette, rel)) =
            self.mem.write(&mut self.mem_write_acc, (addr & 0x3FFF) as u32, value)
        {
            self.palette[palette_index(rel)] = value & 0x3F;
        }
    }

    // --- register file ---------------------------------------------------

    /// CPU read of $2000-$3FFF (mirrored every 8 bytes).
    pub fn reg_read(&mut self, tick: Tick, addr: u32) -> u8 {
        match addr & 7 {
            0x2 => {
                self.catch_up(tick);
                let mut status = self.data_buffer & 0x1F;
                if self.vblank_flag {
                    status |= 0x80;
                }
                if self.sprite_zero_hit {
                    status |= 0x40;
                }
                if self.sprite_overflow {
                    status |= 0x20;
                }
                // Reading status clears vblank and resets the write toggle.
                self.vblank_flag = false;
                self.write_toggle = false;
                status
            }
            0x4 => self.oam[self.oam_addr as usize],
            0x7 => {
                let addr = self.vram_addr & 0x3FFF;
                let value = if addr >= 0x3F00 {
                    // Palette reads bypass the buffer; the buffer still
                    // picks up the nametable byte underneath.
                    self.data_buffer = self.mem_read(addr & 0x2FFF);
                    self.palette[palette_index((addr - 0x3F00) as u32)]
                } else {
                    let buffered = self.data_buffer;
                    self.data_buffer = self.mem_read(addr);
                    buffered
                };
                self.increment_vram_addr();
                value
            }
            _ => {
                log::debug!("read of write-only PPU register ${:04X}", 0x2000 + (addr & 7));
                self.data_buffer
            }
        }
    }

    /// CPU write to $2000-$3FFF. Returns true when the write must raise an
    /// NMI right away (enabling NMI while the vblank flag is up).
    pub fn reg_write(&mut self, tick: Tick, addr: u32, value: u8) -> bool {
        match addr & 7 {
            0x0 => {
                self.catch_up(tick);
                let was_enabled = self.ctrl & CTRL_NMI_ENABLE != 0;
                self.ctrl = value;
                self.temp_addr =
                    (self.temp_addr & !0x0C00) | (((value & CTRL_NAMETABLE) as u16) << 10);
                let now_enabled = self.ctrl & CTRL_NMI_ENABLE != 0;
                return self.vblank_flag && now_enabled && !was_enabled;
            }
            0x1 => {
                self.catch_up(tick);
                self.mask = value;
            }
            0x3 => self.oam_addr = value,
            0x4 => {
                self.catch_up(tick);
                self.oam[self.oam_addr as usize] = value;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            }
            0x5 => {
                self.catch_up(tick);
                if !self.write_toggle {
                    self.temp_addr = (self.temp_addr & !0x001F) | (value >> 3) as u16;
                    self.fine_x = value & 7;
                } else {
                    self.temp_addr = (self.temp_addr & !0x73E0)
                        | (((value & 0xF8) as u16) << 2)
                        | (((value & 0x07) as u16) << 12);
                }
                self.write_toggle = !self.write_toggle;
            }
            0x6 => {
                self.catch_up(tick);
                if !self.write_toggle {
                    self.temp_addr =
                        (self.temp_addr & 0x00FF) | (((value & 0x3F) as u16) << 8);
                } else {
                    self.temp_addr = (self.temp_addr & 0xFF00) | value as u16;
                    self.vram_addr = self.temp_addr;
                    self.addr_dirty = true;
                }
                self.write_toggle = !self.write_toggle;
            }
            0x7 => {
                self.catch_up(tick);
                let addr = self.vram_addr & 0x3FFF;
                self.mem_write(addr, value);
                self.increment_vram_addr();
            }
            _ => {
                log::debug!("write to read-only PPU register ${:04X}", 0x2000 + (addr & 7));
            }
        }
        false
    }

    fn increment_vram_addr(&mut self) {
        let step = if self.ctrl & CTRL_INCREMENT != 0 { 32 } else { 1 };
        self.vram_addr = self.vram_addr.wrapping_add(step) & 0x7FFF;
    }

    /// Atomic OAM DMA upload; honors the current OAM address like the
    /// register-by-register path would.
    pub fn write_oam_dma(&mut self, tick: Tick, data: &[u8; 256]) {
        self.catch_up(tick);
        for &byte in data.iter() {
            self.oam[self.oam_addr as usize] = byte;
            self.oam_addr = self.oam_addr.wrapping_add(1);
        }
    }

    // --- rendering -------------------------------------------------------

    pub fn catch_up(&mut self, tick: Tick) {
        self.render_to(tick.min(self.desired_ticks));
    }

    fn render_to(&mut self, target: Tick) {
        if target <= self.rendered_tick {
            return;
        }
        let visible_end = self.tick_of(VISIBLE_LINES, 0);
        while self.rendered_tick < target {
            if self.rendered_tick >= visible_end {
                self.rendered_tick = target;
                break;
            }
            let line = self.rendered_tick / self.line_ticks;
            let line_base = line * self.line_ticks;
            let line_end = line_base + self.line_ticks;
            let span_end = target.min(line_end);

            let from_dot = (self.rendered_tick - line_base) / self.divider as i32;
            let to_dot = (span_end - line_base) / self.divider as i32;
            self.render_span(line, from_dot, to_dot);

            if span_end == line_end {
                self.finish_line();
            }
            self.rendered_tick = span_end;
        }
    }

    fn prepare_line(&mut self, line: i32) {
        self.current_line = line;
        if self.rendering_enabled() {
            if self.addr_dirty {
                self.scanline_addr = self.vram_addr & 0x7FFF;
                self.addr_dirty = false;
            } else {
                // Reload the horizontal bits from t, as the real raster
                // does at the end of every line.
                self.scanline_addr =
                    (self.scanline_addr & !0x041F) | (self.temp_addr & 0x041F);
            }
        }
        self.evaluate_sprites(line);
    }

    fn finish_line(&mut self) {
        if self.rendering_enabled() {
            self.scanline_addr = increment_fine_y(self.scanline_addr);
        }
        self.current_line = -1;
    }

    fn render_span(&mut self, line: i32, from_dot: i32, to_dot: i32) {
        if line >= VISIBLE_LINES {
            return;
        }
        if self.current_line != line {
            self.prepare_line(line);
        }

        // Dots 1-256 emit pixels.
        let from_x = (from_dot - 1).clamp(0, FRAME_WIDTH as i32) as usize;
        let to_x = (to_dot - 1).clamp(0, FRAME_WIDTH as i32) as usize;
        if from_x >= to_x {
            return;
        }

        let backdrop = self.palette[0];
        let bg_enabled = self.mask & MASK_SHOW_BG != 0;
        let sprites_enabled = self.mask & MASK_SHOW_SPRITES != 0;

        let mut bg_pixels = [0u8; FRAME_WIDTH];
        if bg_enabled {
            self.fetch_background(from_x, to_x, &mut bg_pixels);
        }

        for x in from_x..to_x {
            let mut bg_pixel = bg_pixels[x];
            if x < 8 && self.mask & MASK_SHOW_BG_LEFT == 0 {
                bg_pixel = 0;
            }

            let mut color_index = if bg_pixel & 0x03 != 0 {
                self.palette[bg_pixel as usize]
            } else {
                backdrop
            };

            if sprites_enabled {
                if let Some((sprite_pixel, behind, zero)) = self.sprite_pixel_at(x) {
                    if zero && bg_pixel & 0x03 != 0 && x < 255 && bg_enabled {
                        self.sprite_zero_hit = true;
                    }
                    if !behind || bg_pixel & 0x03 == 0 {
                        color_index = self.palette[0x10 + sprite_pixel as usize];
                    }
                }
            }

            self.frame[line as usize * FRAME_WIDTH + x] =
                MASTER_PALETTE[(color_index & 0x3F) as usize];
        }
    }

    /// Fill `out[from_x..to_x]` with background palette indices (attribute
    /// select in bits 2-3, pattern in bits 0-1; 0 means transparent).
    fn fetch_background(&mut self, from_x: usize, to_x: usize, out: &mut [u8; FRAME_WIDTH]) {
        let fine_y = (self.scanline_addr >> 12) & 7;
        let bg_table: u16 = if self.ctrl & CTRL_BG_TABLE != 0 { 0x1000 } else { 0 };

        let mut x = from_x;
        while x < to_x {
            let scroll = x as u16 + self.fine_x as u16;
            let tile_step = scroll / 8;
            let fine = (scroll % 8) as usize;

            let addr = advance_coarse_x(self.scanline_addr, tile_step);
            let name = self.mem_read(0x2000 | (addr & 0x0FFF));
            let attr_addr =
                0x23C0 | (addr & 0x0C00) | ((addr >> 4) & 0x38) | ((addr >> 2) & 0x07);
            let attr = self.mem_read(attr_addr);
            let quadrant = ((addr >> 4) & 4) | (addr & 2);
            let palette_select = (attr >> quadrant) & 0x03;

            let pattern_addr = bg_table + name as u16 * 16 + fine_y;
            let low = self.mem_read(pattern_addr);
            let high = self.mem_read(pattern_addr + 8);
            let low_bits = &BIT_EXPAND[low as usize];
            let high_bits = &BIT_EXPAND[high as usize];

            let mut fine = fine;
            while fine < 8 && x < to_x {
                let pixel = low_bits[fine] | (high_bits[fine] << 1);
                out[x] = if pixel == 0 { 0 } else { (palette_select << 2) | pixel };
                fine += 1;
                x += 1;
            }
        }
    }

    fn sprite_pixel_at(&self, x: usize) -> Option<(u8, bool, bool)> {
        if x < 8 && self.mask & MASK_SHOW_SPRITES_LEFT == 0 {
            return None;
        }
        for sprite in self.line_sprites[..self.line_sprite_count].iter() {
            let sx = sprite.x as usize;
            if x < sx || x >= sx + 8 {
                continue;
            }
            let fine = x - sx;
            let pixel =
                BIT_EXPAND[sprite.pattern_low as usize][fine]
                    | (BIT_EXPAND[sprite.pattern_high as usize][fine] << 1);
            if pixel == 0 {
                continue;
            }
            let palette = sprite.attr & 0x03;
            let behind = sprite.attr & 0x20 != 0;
            return Some(((palette << 2) | pixel, behind, sprite.sprite_zero));
        }
        None
    }

    /// Line-limit sprite selection: first eight in OAM order win, the ninth
    /// sets the overflow flag.
    fn evaluate_sprites(&mut self, line: i32) {
        self.line_sprite_count = 0;
        if self.mask & MASK_SHOW_SPRITES == 0 {
            return;
        }
        let height = if self.ctrl & CTRL_SPRITE_SIZE != 0 { 16 } else { 8 };

        for index in 0..64 {
            let base = index * 4;
            let y = self.oam[base] as i32;
            let row = line - (y + 1);
            if row < 0 || row >= height {
                continue;
            }
            if self.line_sprite_count == SPRITES_PER_LINE {
                self.sprite_overflow = true;
                break;
            }

            let tile = self.oam[base + 1];
            let attr = self.oam[base + 2];
            let mut row = row;
            if attr & 0x80 != 0 {
                row = height - 1 - row;
            }

            let pattern_addr = if height == 16 {
                let table = (tile & 0x01) as u16 * 0x1000;
                let tile = (tile & 0xFE) as u16 + if row >= 8 { 1 } else { 0 };
                table + tile * 16 + (row as u16 & 7)
            } else {
                let table: u16 = if self.ctrl & CTRL_SPRITE_TABLE != 0 { 0x1000 } else { 0 };
                table + tile as u16 * 16 + row as u16
            };

            let mut pattern_low = self.mem_read(pattern_addr);
            let mut pattern_high = self.mem_read(pattern_addr + 8);
            if attr & 0x40 != 0 {
                pattern_low = pattern_low.reverse_bits();
                pattern_high = pattern_high.reverse_bits();
            }

            self.line_sprites[self.line_sprite_count] = LineSprite {
                x: self.oam[base + 3],
                attr,
                pattern_low,
                pattern_high,
                sprite_zero: index == 0,
            };
            self.line_sprite_count += 1;
        }
    }

    // --- serialization ---------------------------------------------------

    pub fn save_state(&self) -> PpuState {
        PpuState {
            version: PPU_STATE_VERSION,
            ctrl: self.ctrl,
            mask: self.mask,
            oam_addr: self.oam_addr,
            data_buffer: self.data_buffer,
            vram_addr: self.vram_addr,
            temp_addr: self.temp_addr,
            fine_x: self.fine_x,
            write_toggle: self.write_toggle,
            scanline_addr: self.scanline_addr,
            addr_dirty: self.addr_dirty,
            vblank_flag: self.vblank_flag,
            sprite_zero_hit: self.sprite_zero_hit,
            sprite_overflow: self.sprite_overflow,
            oam: self.oam.to_vec(),
            palette: self.palette.to_vec(),
            rendered_tick: self.rendered_tick,
            desired_ticks: self.desired_ticks,
            bus: self.mem.save_state(),
        }
    }

    pub fn restore_state(&mut self, state: &PpuState) -> Result<(), SaveStateError> {
        savestate::check_version("ppu", state.version, PPU_STATE_VERSION)?;
        if state.oam.len() != self.oam.len() || state.palette.len() != self.palette.len() {
            return Err(SaveStateError::InvalidState("ppu buffer sizes"));
        }
        if !self.mem.restore_state(&state.bus) {
            return Err(SaveStateError::InvalidState("ppu bus shape"));
        }
        self.ctrl = state.ctrl;
        self.mask = state.mask;
        self.oam_addr = state.oam_addr;
        self.data_buffer = state.data_buffer;
        self.vram_addr = state.vram_addr;
        self.temp_addr = state.temp_addr;
        self.fine_x = state.fine_x;
        self.write_toggle = state.write_toggle;
        self.scanline_addr = state.scanline_addr;
        self.addr_dirty = state.addr_dirty;
        self.vblank_flag = state.vblank_flag;
        self.sprite_zero_hit = state.sprite_zero_hit;
        self.sprite_overflow = state.sprite_overflow;
        self.oam.copy_from_slice(&state.oam);
        self.palette.copy_from_slice(&state.palette);
        self.rendered_tick = state.rendered_tick;
        self.desired_ticks = state.desired_ticks;
        self.current_line = -1;
        self.line_sprite_count = 0;
        Ok(())
    }
}

impl ClockListener for Ppu {
    fn set_desired_ticks(&mut self, ticks: Tick) {
        self.desired_ticks = ticks;
    }

    fn advance_clock(&mut self, ticks: Tick) {
        self.rendered_tick -= ticks;
        self.desired_ticks -= ticks;
    }

    fn reset_clock(&mut self) {
        self.rendered_tick = 0;
        self.desired_ticks = 0;
    }
}

impl Ppu {
    /// Listener execute: emit everything up to the horizon.
    pub fn execute(&mut self) {
        self.render_to(self.desired_ticks);
    }
}

#[inline]
fn palette_index(rel: u32) -> usize {
    let index = (rel & 0x1F) as usize;
    // $3F10/$3F14/$3F18/$3F1C mirror the backdrop entries.
    if index >= 0x10 && index % 4 == 0 { index - 0x10 } else { index }
}

/// Step the coarse X component of a scanline address, toggling the
/// horizontal nametable on wraparound.
fn advance_coarse_x(addr: u16, tiles: u16) -> u16 {
    let coarse = addr & 0x1F;
    let total = coarse + tiles;
    let mut out = (addr & !0x001F) | (total & 0x1F);
    if (total >> 5) & 1 != 0 {
        out ^= 0x0400;
    }
    out
}

/// End-of-line vertical increment with the row-29 nametable toggle.
fn increment_fine_y(addr: u16) -> u16 {
    let mut addr = addr;
    if addr & 0x7000 != 0x7000 {
        return addr + 0x1000;
    }
    addr &= !0x7000;
    let mut coarse_y = (addr >> 5) & 0x1F;
    match coarse_y {
        29 => {
            coarse_y = 0;
            addr ^= 0x0800;
        }
        31 => coarse_y = 0,
        _ => coarse_y += 1,
    }
    (addr & !0x03E0) | (coarse_y << 5)
}
