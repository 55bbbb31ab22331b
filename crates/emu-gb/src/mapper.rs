use crate::bus::GbPort;
use crate::rom::{self, Description, ROM_BANK_SIZE};
use emu_core::clock::Tick;
use emu_core::membus::{Access, AccessId, BusError, MemoryBus, SlotId, Table};
use emu_core::savestate::{self, SaveStateError};
use serde::{Deserialize, Serialize};

const RAM_BANK_SIZE: usize = 0x2000;

pub struct GbMapperBus<'a> {
    pub mem: &'a mut MemoryBus<GbPort>,
    pub rom_slot: SlotId,
    pub rom_size: usize,
}

/// Cartridge hardware: two ROM view slots plus the external RAM window,
/// driven by write traps over the ROM address range. Bank selections
/// restore through the bus snapshot; only protocol latches live in the
/// mapper's own state.
pub trait Mapper {
    fn initialize(&mut self, bus: &mut GbMapperBus<'_>) -> Result<(), BusError>;

    fn reset(&mut self, bus: &mut GbMapperBus<'_>);

    /// CPU write into $0000-$7FFF.
    fn cpu_write(&mut self, _bus: &mut GbMapperBus<'_>, _tick: Tick, _addr: u16, _value: u8) {}

    /// External-RAM window traffic while it is callback-routed (disabled
    /// RAM, MBC2's internal array, MBC3's RTC registers).
    fn ram_read(&mut self, _addr: u16) -> u8 {
        0xFF
    }

    fn ram_write(&mut self, _addr: u16, _value: u8) {}

    /// Once per video frame; MBC3 advances its wall clock from here so
    /// save states stay deterministic.
    fn begin_frame(&mut self) {}

    /// Battery-backed contents, when the cartridge has any.
    fn save_game_data(&self, mem: &MemoryBus<GbPort>) -> Result<Vec<u8>, SaveStateError>;

    fn load_game_data(
        &mut self,
        mem: &mut MemoryBus<GbPort>,
        bytes: &[u8],
    ) -> Result<(), SaveStateError>;

    fn save_state(&self) -> Result<Vec<u8>, SaveStateError>;

    fn restore_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError>;
}

pub fn create_mapper(desc: &Description) -> Box<dyn Mapper> {
    let base = Base::new(desc);
    match desc.mapper {
        rom::Mapper::Rom => Box::new(RomOnly { base }),
        rom::Mapper::Mbc1 => Box::new(Mbc1::new(base)),
        rom::Mapper::Mbc2 => Box::new(Mbc2::new(base)),
        rom::Mapper::Mbc3 => Box::new(Mbc3::new(base)),
        rom::Mapper::Mbc5 => Box::new(Mbc5::new(base)),
    }
}

// --- shared plumbing ------------------------------------------------------

#[derive(Debug, Clone)]
struct Base {
    rom_access: [AccessId; 2],
    ram_access: Option<AccessId>,
    ram_slot: Option<SlotId>,
    ram_size: usize,
    battery: bool,
    rom_bank: [u32; 2],
    ram_bank: u32,
    ram_enabled: bool,
}

impl Base {
    fn new(desc: &Description) -> Base {
        Base {
            rom_access: [0; 2],
            ram_access: None,
            ram_slot: None,
            ram_size: desc.ram_size as usize,
            battery: desc.has_battery,
            rom_bank: [0, 1],
            ram_bank: 0,
            ram_enabled: false,
        }
    }

    fn install(&mut self, bus: &mut GbMapperBus<'_>) -> Result<(), BusError> {
        let slot = bus.rom_slot;
        self.rom_access = [
            bus.mem.add_access(Access::Mem { slot, base: 0 }),
            bus.mem.add_access(Access::Mem { slot, base: ROM_BANK_SIZE as u32 }),
        ];
        bus.mem.add_range(Table::Read, 0x0000, 0x3FFF, self.rom_access[0])?;
        bus.mem.add_range(Table::Read, 0x4000, 0x7FFF, self.rom_access[1])?;

        let trap = bus.mem.add_access(Access::Io(GbPort::CartWrite));
        bus.mem.add_range(Table::Write, 0x0000, 0x7FFF, trap)?;

        if self.ram_size > 0 {
            let ram_slot = bus.mem.add_ram_slot(self.ram_size.max(RAM_BANK_SIZE));
            let access = bus.mem.add_access(Access::Io(GbPort::CartRam));
            bus.mem.add_range_rw(0xA000, 0xBFFF, access)?;
            self.ram_slot = Some(ram_slot);
            self.ram_access = Some(access);
        } else {
            let access = bus.mem.add_access(Access::Io(GbPort::CartRam));
            bus.mem.add_range_rw(0xA000, 0xBFFF, access)?;
            self.ram_access = Some(access);
        }
        Ok(())
    }

    fn update_map(&self, bus: &mut GbMapperBus<'_>) {
        let slot = bus.rom_slot;
        let bank_count = (bus.rom_size / ROM_BANK_SIZE).max(1) as u32;
        for (i, &access) in self.rom_access.iter().enumerate() {
            let base = (self.rom_bank[i] % bank_count) * ROM_BANK_SIZE as u32;
            bus.mem.set_access(access, Access::Mem { slot, base });
        }
        if let (Some(access), Some(ram_slot)) = (self.ram_access, self.ram_slot) {
            if self.ram_enabled {
                let bank_count = (self.ram_size / RAM_BANK_SIZE).max(1) as u32;
                let base = (self.ram_bank % bank_count) * RAM_BANK_SIZE as u32;
                bus.mem.set_access(access, Access::Mem { slot: ram_slot, base });
            } else {
                bus.mem.set_access(access, Access::Io(GbPort::CartRam));
            }
        }
    }

    fn reset_banks(&mut self) {
        self.rom_bank = [0, 1];
        self.ram_bank = 0;
        self.ram_enabled = false;
    }

    fn ram_bytes(&self, mem: &MemoryBus<GbPort>) -> Vec<u8> {
        match self.ram_slot {
            Some(slot) if self.battery => mem.slot(slot)[..self.ram_size].to_vec(),
            _ => Vec::new(),
        }
    }

    fn load_ram_bytes(&self, mem: &mut MemoryBus<GbPort>, bytes: &[u8]) -> bool {
        match self.ram_slot {
            Some(slot) => match mem.slot_mut(slot) {
                Some(ram) if bytes.len() == self.ram_size => {
                    ram[..bytes.len()].copy_from_slice(bytes);
                    true
                }
                _ => false,
            },
            None => bytes.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct GameData {
    version: u32,
    ram: Vec<u8>,
    rtc_frames: u64,
}

const GAME_DATA_VERSION: u32 = 1;

fn encode_game_data(ram: Vec<u8>, rtc_frames: u64) -> Result<Vec<u8>, SaveStateError> {
    savestate::encode(&GameData {
        version: GAME_DATA_VERSION,
        ram,
        rtc_frames,
    })
}

fn decode_game_data(bytes: &[u8]) -> Result<GameData, SaveStateError> {
    let data: GameData = savestate::decode(bytes)?;
    savestate::check_version("game data", data.version, GAME_DATA_VERSION)?;
    Ok(data)
}

// --- ROM only -------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct PlainState {
    version: u32,
    ram_enabled: bool,
    rom_bank: [u32; 2],
    ram_bank: u32,
}

const PLAIN_STATE_VERSION: u32 = 1;

struct RomOnly {
    base: Base,
}

impl RomOnly {
    fn plain_state(base: &Base) -> Result<Vec<u8>, SaveStateError> {
        savestate::encode(&PlainState {
            version: PLAIN_STATE_VERSION,
            ram_enabled: base.ram_enabled,
            rom_bank: base.rom_bank,
            ram_bank: base.ram_bank,
        })
    }

    fn restore_plain(base: &mut Base, bytes: &[u8]) -> Result<(), SaveStateError> {
        let state: PlainState = savestate::decode(bytes)?;
        savestate::check_version("mapper", state.version, PLAIN_STATE_VERSION)?;
        base.ram_enabled = state.ram_enabled;
        base.rom_bank = state.rom_bank;
        base.ram_bank = state.ram_bank;
        Ok(())
    }
}

impl Mapper for RomOnly {
    fn initialize(&mut self, bus: &mut GbMapperBus<'_>) -> Result<(), BusError> {
        self.base.install(bus)?;
        self.base.ram_enabled = self.base.ram_size > 0;
        self.base.update_map(bus);
        Ok(())
    }

    fn reset(&mut self, bus: &mut GbMapperBus<'_>) {
        self.base.reset_banks();
        self.base.ram_enabled = self.base.ram_size > 0;
        self.base.update_map(bus);
    }

    fn save_game_data(&self, mem: &MemoryBus<GbPort>) -> Result<Vec<u8>, SaveStateError> {
        encode_game_data(self.base.ram_bytes(mem), 0)
    }

    fn load_game_data(
        &mut self,
        mem: &mut MemoryBus<GbPort>,
        bytes: &[u8],
    ) -> Result<(), SaveStateError> {
        let data = decode_game_data(bytes)?;
        if !self.base.load_ram_bytes(mem, &data.ram) {
            return Err(SaveStateError::InvalidState("cart RAM size mismatch"));
        }
        Ok(())
    }

    fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        Self::plain_state(&self.base)
    }

    fn restore_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        Self::restore_plain(&mut self.base, bytes)
    }
}

// --- MBC1 -----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Mbc1State {
    version: u32,
    bank_low: u8,
    bank_high: u8,
    mode: u8,
    ram_enabled: bool,
}

const MBC1_STATE_VERSION: u32 = 1;

struct Mbc1 {
    base: Base,
    bank_low: u8,
    bank_high: u8,
    mode: u8,
}

impl Mbc1 {
    fn new(base: Base) -> Mbc1 {
        Mbc1 {
            base,
            bank_low: 1,
            bank_high: 0,
            mode: 0,
        }
    }

    fn apply(&mut self, bus: &mut GbMapperBus<'_>) {
        let low = if self.bank_low == 0 { 1 } else { self.bank_low } as u32;
        let high = self.bank_high as u32;
        self.base.rom_bank[1] = (high << 5) | low;
        self.base.rom_bank[0] = if self.mode == 1 { high << 5 } else { 0 };
        self.base.ram_bank = if self.mode == 1 { high } else { 0 };
        self.base.update_map(bus);
    }
}

impl Mapper for Mbc1 {
    fn initialize(&mut self, bus: &mut GbMapperBus<'_>) -> Result<(), BusError> {
        self.base.install(bus)?;
        self.apply(bus);
        Ok(())
    }

    fn reset(&mut self, bus: &mut GbMapperBus<'_>) {
        self.base.reset_banks();
        self.bank_low = 1;
        self.bank_high = 0;
        self.mode = 0;
        self.apply(bus);
    }

    fn cpu_write(&mut self, bus: &mut GbMapperBus<'_>, _tick: Tick, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => self.base.ram_enabled = value & 0x0F == 0x0A,
            0x2000..=0x3FFF => self.bank_low = value & 0x1F,
            0x4000..=0x5FFF => self.bank_high = value & 0x03,
            _ => self.mode = value & 0x01,
        }
        self.apply(bus);
    }

    fn save_game_data(&self, mem: &MemoryBus<GbPort>) -> Result<Vec<u8>, SaveStateError> {
        encode_game_data(self.base.ram_bytes(mem), 0)
    }

    fn load_game_data(
        &mut self,
        mem: &mut MemoryBus<GbPort>,
        bytes: &[u8],
    ) -> Result<(), SaveStateError> {
        let data = decode_game_data(bytes)?;
        if !self.base.load_ram_bytes(mem, &data.ram) {
            return Err(SaveStateError::InvalidState("cart RAM size mismatch"));
        }
        Ok(())
    }

    fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        savestate::encode(&Mbc1State {
            version: MBC1_STATE_VERSION,
            bank_low: self.bank_low,
            bank_high: self.bank_high,
            mode: self.mode,
            ram_enabled: self.base.ram_enabled,
        })
    }

    fn restore_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let state: Mbc1State = savestate::decode(bytes)?;
        savestate::check_version("mapper", state.version, MBC1_STATE_VERSION)?;
        self.bank_low = state.bank_low;
        self.bank_high = state.bank_high;
        self.mode = state.mode;
        self.base.ram_enabled = state.ram_enabled;
        Ok(())
    }
}

// --- MBC2 -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Mbc2State {
    version: u32,
    rom_bank: u8,
    ram_enabled: bool,
    ram: Vec<u8>,
}

const MBC2_STATE_VERSION: u32 = 1;

/// MBC2 keeps its 512x4-bit RAM on the controller die; the window is
/// always callback-routed.
struct Mbc2 {
    base: Base,
    rom_bank: u8,
    ram: Vec<u8>,
}

impl Mbc2 {
    fn new(mut base: Base) -> Mbc2 {
        // External RAM stays on the Io path.
        base.ram_size = 0;
        Mbc2 {
            base,
            rom_bank: 1,
            ram: vec![0; 512],
        }
    }

    fn apply(&mut self, bus: &mut GbMapperBus<'_>) {
        self.base.rom_bank[1] = if self.rom_bank == 0 { 1 } else { self.rom_bank } as u32;
        self.base.update_map(bus);
    }
}

impl Mapper for Mbc2 {
    fn initialize(&mut self, bus: &mut GbMapperBus<'_>) -> Result<(), BusError> {
        self.base.install(bus)?;
        self.apply(bus);
        Ok(())
    }

    fn reset(&mut self, bus: &mut GbMapperBus<'_>) {
        self.base.reset_banks();
        self.rom_bank = 1;
        self.apply(bus);
    }

    fn cpu_write(&mut self, bus: &mut GbMapperBus<'_>, _tick: Tick, addr: u16, value: u8) {
        if addr <= 0x3FFF {
            // Address bit 8 selects between RAM gate and ROM bank.
            if addr & 0x0100 == 0 {
                self.base.ram_enabled = value & 0x0F == 0x0A;
            } else {
                self.rom_bank = value & 0x0F;
                self.apply(bus);
            }
        }
    }

    fn ram_read(&mut self, addr: u16) -> u8 {
        if !self.base.ram_enabled {
            return 0xFF;
        }
        0xF0 | (self.ram[(addr & 0x1FF) as usize] & 0x0F)
    }

    fn ram_write(&mut self, addr: u16, value: u8) {
        if self.base.ram_enabled {
            self.ram[(addr & 0x1FF) as usize] = value & 0x0F;
        }
    }

    fn save_game_data(&self, _mem: &MemoryBus<GbPort>) -> Result<Vec<u8>, SaveStateError> {
        let ram = if self.base.battery { self.ram.clone() } else { Vec::new() };
        encode_game_data(ram, 0)
    }

    fn load_game_data(
        &mut self,
        _mem: &mut MemoryBus<GbPort>,
        bytes: &[u8],
    ) -> Result<(), SaveStateError> {
        let data = decode_game_data(bytes)?;
        if data.ram.len() != self.ram.len() {
            return Err(SaveStateError::InvalidState("cart RAM size mismatch"));
        }
        self.ram.copy_from_slice(&data.ram);
        Ok(())
    }

    fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        savestate::encode(&Mbc2State {
            version: MBC2_STATE_VERSION,
            rom_bank: self.rom_bank,
            ram_enabled: self.base.ram_enabled,
            ram: self.ram.clone(),
        })
    }

    fn restore_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let state: Mbc2State = savestate::decode(bytes)?;
        savestate::check_version("mapper", state.version, MBC2_STATE_VERSION)?;
        if state.ram.len() != self.ram.len() {
            return Err(SaveStateError::InvalidState("MBC2 RAM size"));
        }
        self.rom_bank = state.rom_bank;
        self.base.ram_enabled = state.ram_enabled;
        self.ram = state.ram.clone();
        Ok(())
    }
}

// --- MBC3 -----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Mbc3State {
    version: u32,
    rom_bank: u8,
    ram_select: u8,
    ram_enabled: bool,
    rtc_frames: u64,
    rtc_latched: [u8; 5],
    latch_armed: bool,
}

const MBC3_STATE_VERSION: u32 = 1;

/// MBC3 with the RTC register file. The clock advances from emulated
/// frames, not the host's wall clock, so replays stay deterministic.
struct Mbc3 {
    base: Base,
    rom_bank: u8,
    ram_select: u8,
    rtc_frames: u64,
    rtc_latched: [u8; 5],
    latch_armed: bool,
}

impl Mbc3 {
    fn new(base: Base) -> Mbc3 {
        Mbc3 {
            base,
            rom_bank: 1,
            ram_select: 0,
            rtc_frames: 0,
            rtc_latched: [0; 5],
            latch_armed: false,
        }
    }

    fn rtc_selected(&self) -> bool {
        (0x08..=0x0C).contains(&self.ram_select)
    }

    fn apply(&mut self, bus: &mut GbMapperBus<'_>) {
        self.base.rom_bank[1] = if self.rom_bank == 0 { 1 } else { self.rom_bank } as u32;
        if self.rtc_selected() {
            // Keep the window callback-routed so RTC reads reach us.
            let enabled = self.base.ram_enabled;
            self.base.ram_enabled = false;
            self.base.update_map(bus);
            self.base.ram_enabled = enabled;
        } else {
            self.base.ram_bank = (self.ram_select & 0x03) as u32;
            self.base.update_map(bus);
        }
    }

    fn latch_rtc(&mut self) {
        let seconds = self.rtc_frames / 60;
        let days = seconds / 86_400;
        self.rtc_latched = [
            (seconds % 60) as u8,
            (seconds / 60 % 60) as u8,
            (seconds / 3600 % 24) as u8,
            (days & 0xFF) as u8,
            ((days >> 8) & 1) as u8 | if days > 0x1FF { 0x80 } else { 0 },
        ];
    }
}

impl Mapper for Mbc3 {
    fn initialize(&mut self, bus: &mut GbMapperBus<'_>) -> Result<(), BusError> {
        self.base.install(bus)?;
        self.apply(bus);
        Ok(())
    }

    fn reset(&mut self, bus: &mut GbMapperBus<'_>) {
        self.base.reset_banks();
        self.rom_bank = 1;
        self.ram_select = 0;
        self.latch_armed = false;
        self.apply(bus);
    }

    fn cpu_write(&mut self, bus: &mut GbMapperBus<'_>, _tick: Tick, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => self.base.ram_enabled = value & 0x0F == 0x0A,
            0x2000..=0x3FFF => self.rom_bank = value & 0x7F,
            0x4000..=0x5FFF => self.ram_select = value & 0x0F,
            _ => {
                // 00 -> 01 sequence latches the running clock.
                if self.latch_armed && value == 0x01 {
                    self.latch_rtc();
                }
                self.latch_armed = value == 0x00;
                return;
            }
        }
        self.apply(bus);
    }

    fn ram_read(&mut self, _addr: u16) -> u8 {
        if self.rtc_selected() && self.base.ram_enabled {
            self.rtc_latched[(self.ram_select - 0x08) as usize]
        } else {
            0xFF
        }
    }

    fn ram_write(&mut self, _addr: u16, value: u8) {
        if self.rtc_selected() && self.base.ram_enabled {
            // Writing the clock only resets the sub-day counters here.
            let index = (self.ram_select - 0x08) as usize;
            self.rtc_latched[index] = value;
            if index == 0 {
                self.rtc_frames = 0;
            }
        }
    }

    fn begin_frame(&mut self) {
        self.rtc_frames += 1;
    }

    fn save_game_data(&self, mem: &MemoryBus<GbPort>) -> Result<Vec<u8>, SaveStateError> {
        encode_game_data(self.base.ram_bytes(mem), self.rtc_frames)
    }

    fn load_game_data(
        &mut self,
        mem: &mut MemoryBus<GbPort>,
        bytes: &[u8],
    ) -> Result<(), SaveStateError> {
        let data = decode_game_data(bytes)?;
        if !self.base.load_ram_bytes(mem, &data.ram) {
            return Err(SaveStateError::InvalidState("cart RAM size mismatch"));
        }
        self.rtc_frames = data.rtc_frames;
        Ok(())
    }

    fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        savestate::encode(&Mbc3State {
            version: MBC3_STATE_VERSION,
            rom_bank: self.rom_bank,
            ram_select: self.ram_select,
            ram_enabled: self.base.ram_enabled,
            rtc_frames: self.rtc_frames,
            rtc_latched: self.rtc_latched,
            latch_armed: self.latch_armed,
        })
    }

    fn restore_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let state: Mbc3State = savestate::decode(bytes)?;
        savestate::check_version("mapper", state.version, MBC3_STATE_VERSION)?;
        self.rom_bank = state.rom_bank;
        self.ram_select = state.ram_select;
        self.base.ram_enabled = state.ram_enabled;
        self.rtc_frames = state.rtc_frames;
        self.rtc_latched = state.rtc_latched;
        self.latch_armed = state.latch_armed;
        Ok(())
    }
}

// --- MBC5 -----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Mbc5State {
    version: u32,
    rom_bank: u16,
    ram_bank: u8,
    ram_enabled: bool,
}

const MBC5_STATE_VERSION: u32 = 1;

struct Mbc5 {
    base: Base,
    rom_bank: u16,
    ram_bank: u8,
}

impl Mbc5 {
    fn new(base: Base) -> Mbc5 {
        Mbc5 {
            base,
            rom_bank: 1,
            ram_bank: 0,
        }
    }

    fn apply(&mut self, bus: &mut GbMapperBus<'_>) {
        // MBC5 allows bank 0 in the switchable window.
        self.base.rom_bank[1] = self.rom_bank as u32;
        self.base.ram_bank = self.ram_bank as u32;
        self.base.update_map(bus);
    }
}

impl Mapper for Mbc5 {
    fn initialize(&mut self, bus: &mut GbMapperBus<'_>) -> Result<(), BusError> {
        self.base.install(bus)?;
        self.apply(bus);
        Ok(())
    }

    fn reset(&mut self, bus: &mut GbMapperBus<'_>) {
        self.base.reset_banks();
        self.rom_bank = 1;
        self.ram_bank = 0;
        self.apply(bus);
    }

    fn cpu_write(&mut self, bus: &mut GbMapperBus<'_>, _tick: Tick, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => self.base.ram_enabled = value & 0x0F == 0x0A,
            0x2000..=0x2FFF => self.rom_bank = (self.rom_bank & 0x100) | value as u16,
            0x3000..=0x3FFF => {
                self.rom_bank = (self.rom_bank & 0x0FF) | (((value & 1) as u16) << 8);
            }
            0x4000..=0x5FFF => self.ram_bank = value & 0x0F,
            _ => return,
        }
        self.apply(bus);
    }

    fn save_game_data(&self, mem: &MemoryBus<GbPort>) -> Result<Vec<u8>, SaveStateError> {
        encode_game_data(self.base.ram_bytes(mem), 0)
    }

    fn load_game_data(
        &mut self,
        mem: &mut MemoryBus<GbPort>,
        bytes: &[u8],
    ) -> Result<(), SaveStateError> {
        let data = decode_game_data(bytes)?;
        if !self.base.load_ram_bytes(mem, &data.ram) {
            return Err(SaveStateError::InvalidState("cart RAM size mismatch"));
        }
        Ok(())
    }

    fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        savestate::encode(&Mbc5State {
            version: MBC5_STATE_VERSION,
            rom_bank: self.rom_bank,
            ram_bank: self.ram_bank,
            ram_enabled: self.base.ram_enabled,
        })
    }

    fn restore_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let state: Mbc5State = savestate::decode(bytes)?;
        savestate::check_version("mapper", state.version, MBC5_STATE_VERSION)?;
        self.rom_bank = state.rom_bank;
        self.ram_bank = state.ram_bank;
        self.base.ram_enabled = state.ram_enabled;
        Ok(())
    }
}

#[cfg(test)]
mod mapper_tests;
