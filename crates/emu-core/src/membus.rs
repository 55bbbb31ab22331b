use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("invalid bus geometry: mem_size_log2={mem_size_log2}, page_size_log2={page_size_log2}")]
    InvalidGeometry {
        mem_size_log2: u32,
        page_size_log2: u32,
    },

    #[error("invalid memory range ${start:04X}-${end:04X}")]
    InvalidRange { start: u32, end: u32 },

    #[error("unknown access id {0}")]
    UnknownAccess(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Read,
    Write,
}

pub type SlotId = usize;
pub type AccessId = usize;

/// Access descriptor: either a direct window into a bus-owned memory slot
/// or an I/O port serviced by the owning context. `base` is the slot index
/// that corresponds to the start of the installed range, so re-pointing an
/// access rebanks every range that references it without touching the page
/// tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access<P> {
    Mem { slot: SlotId, base: u32 },
    Io(P),
}

enum MemSlot {
    Ram(Box<[u8]>),
    Rom(Arc<[u8]>),
}

impl MemSlot {
    fn bytes(&self) -> &[u8] {
        match self {
            MemSlot::Ram(buf) => buf,
            MemSlot::Rom(buf) => buf,
        }
    }
}

/// One node of a page's sorted range list.
#[derive(Debug, Clone, Copy)]
struct RangeEntry {
    next: Option<u32>,
    start: u32,
    end: u32,
    /// Subtrahend applied to the address before the access sees it (the
    /// unclipped range start, identical across every page the range spans).
    offset: u32,
    access: AccessId,
}

/// Result of a bus read: either the byte itself (direct-memory fast path)
/// or the I/O port plus access-relative address the context must service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched<P> {
    Value(u8),
    Io(P, u32),
}

/// Pinned lookup cache for one direction of traffic. Mandatory on the CPU
/// fetch path; falls back to the page-table walk whenever the cached entry
/// no longer covers the address or the tables were re-spliced.
#[derive(Debug, Clone, Copy)]
pub struct Accessor {
    table: Table,
    start: u32,
    end: u32,
    offset: u32,
    access: AccessId,
    epoch: u32,
}

impl Accessor {
    pub fn new(table: Table) -> Self {
        // start > end marks the cache invalid until first use.
        Self {
            table,
            start: 1,
            end: 0,
            offset: 0,
            access: 0,
            epoch: u32::MAX,
        }
    }

    #[inline]
    fn covers(&self, epoch: u32, addr: u32) -> bool {
        self.epoch == epoch && self.start <= addr && addr <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusState<P> {
    pub version: u32,
    pub ram: Vec<Vec<u8>>,
    pub accesses: Vec<Access<P>>,
}

pub const BUS_STATE_VERSION: u32 = 1;

/// Paged 8-bit dispatch over an address space of `2^mem_size_log2` bytes.
///
/// Two parallel page tables (read/write) map each page to a sorted list of
/// non-overlapping range entries; installing a new range truncates whatever
/// it overlaps, so later installs override earlier ones.
pub struct MemoryBus<P> {
    mem_limit: u32,
    page_size_log2: u32,
    entries: Vec<RangeEntry>,
    read_heads: Vec<Option<u32>>,
    write_heads: Vec<Option<u32>>,
    accesses: Vec<Access<P>>,
    slots: Vec<MemSlot>,
    epoch: u32,
}

impl<P: Copy> MemoryBus<P> {
    pub fn new(mem_size_log2: u32, page_size_log2: u32) -> Result<Self, BusError> {
        if mem_size_log2 > 32 || page_size_log2 == 0 || mem_size_log2 <= page_size_log2 {
            return Err(BusError::InvalidGeometry {
                mem_size_log2,
                page_size_log2,
            });
        }
        let page_count = 1usize << (mem_size_log2 - page_size_log2);
        Ok(Self {
            mem_limit: ((1u64 << mem_size_log2) - 1) as u32,
            page_size_log2,
            entries: Vec::new(),
            read_heads: vec![None; page_count],
            write_heads: vec![None; page_count],
            accesses: Vec::new(),
            slots: Vec::new(),
            epoch: 0,
        })
    }

    pub fn mem_limit(&self) -> u32 {
        self.mem_limit
    }

    pub fn add_ram_slot(&mut self, size: usize) -> SlotId {
        self.slots.push(MemSlot::Ram(vec![0; size].into_boxed_slice()));
        self.slots.len() - 1
    }

    pub fn add_rom_slot(&mut self, data: Arc<[u8]>) -> SlotId {
        self.slots.push(MemSlot::Rom(data));
        self.slots.len() - 1
    }

    pub fn slot(&self, id: SlotId) -> &[u8] {
        self.slots[id].bytes()
    }

    /// Mutable view of a RAM slot; `None` for ROM-backed slots.
    pub fn slot_mut(&mut self, id: SlotId) -> Option<&mut [u8]> {
        match &mut self.slots[id] {
            MemSlot::Ram(buf) => Some(buf),
            MemSlot::Rom(_) => None,
        }
    }

    pub fn add_access(&mut self, access: Access<P>) -> AccessId {
        self.accesses.push(access);
        self.accesses.len() - 1
    }

    /// Re-point an existing access descriptor. Every installed range that
    /// references it observes the new mapping immediately; this is how
    /// mappers switch banks.
    pub fn set_access(&mut self, id: AccessId, access: Access<P>) {
        self.accesses[id] = access;
    }

    pub fn access(&self, id: AccessId) -> Access<P> {
        self.accesses[id]
    }

    /// Install `access` over `[start, end]` on one table, splicing it into
    /// the sorted list of every page the range overlaps. Existing entries
    /// are truncated around the newcomer.
    pub fn add_range(
        &mut self,
        table: Table,
        start: u32,
        end: u32,
        access: AccessId,
    ) -> Result<(), BusError> {
        if start > end || end > self.mem_limit {
            return Err(BusError::InvalidRange { start, end });
        }
        if access >= self.accesses.len() {
            return Err(BusError::UnknownAccess(access));
        }

        let page_size_log2 = self.page_size_log2;
        let first_page = start >> page_size_log2;
        let last_page = end >> page_size_log2;
        for page in first_page..=last_page {
            let page_start = page << page_size_log2;
            let page_end = ((page + 1) << page_size_log2) - 1;

            let new_id = self.entries.len() as u32;
            self.entries.push(RangeEntry {
                next: None,
                start: start.max(page_start),
                end: end.min(page_end),
                offset: start,
                access,
            });
            let new_start = self.entries[new_id as usize].start;
            let new_end = self.entries[new_id as usize].end;

            let heads = match table {
                Table::Read => &mut self.read_heads,
                Table::Write => &mut self.write_heads,
            };

            // Find the insertion point, sorted by ascending start.
            let mut prev: Option<u32> = None;
            let mut next = heads[page as usize];
            while let Some(id) = next {
                if self.entries[id as usize].start >= new_start {
                    break;
                }
                prev = next;
                next = self.entries[id as usize].next;
            }

            if let Some(prev_id) = prev {
                let prev_entry = self.entries[prev_id as usize];
                if prev_entry.end > new_end {
                    // The previous entry extends past the newcomer; clone
                    // its tail to resume after our range.
                    let tail_id = self.entries.len() as u32;
                    let mut tail = prev_entry;
                    tail.start = new_end + 1;
                    self.entries.push(tail);
                    next = Some(tail_id);
                }
                if self.entries[prev_id as usize].end >= new_start {
                    self.entries[prev_id as usize].end = new_start - 1;
                }
                self.entries[prev_id as usize].next = Some(new_id);
            } else {
                let heads = match table {
                    Table::Read => &mut self.read_heads,
                    Table::Write => &mut self.write_heads,
                };
                heads[page as usize] = Some(new_id);
            }

            // Skip entries the newcomer fully covers; they become
            // unreachable and stay parked in the arena.
            while let Some(id) = next {
                if self.entries[id as usize].end > new_end {
                    break;
                }
                next = self.entries[id as usize].next;
            }
            if let Some(id) = next {
                if self.entries[id as usize].start <= new_end {
                    self.entries[id as usize].start = new_end + 1;
                }
            }
            self.entries[new_id as usize].next = next;
        }

        self.epoch = self.epoch.wrapping_add(1);
        Ok(())
    }

    /// Install the same access on both tables.
    pub fn add_range_rw(&mut self, start: u32, end: u32, access: AccessId) -> Result<(), BusError> {
        self.add_range(Table::Read, start, end, access)?;
        self.add_range(Table::Write, start, end, access)
    }

    fn lookup(&self, table: Table, addr: u32) -> Option<&RangeEntry> {
        debug_assert!(addr <= self.mem_limit);
        let heads = match table {
            Table::Read => &self.read_heads,
            Table::Write => &self.write_heads,
        };
        let mut id = heads[(addr >> self.page_size_log2) as usize];
        while let Some(entry_id) = id {
            let entry = &self.entries[entry_id as usize];
            if entry.start <= addr && addr <= entry.end {
                return Some(entry);
            }
            id = entry.next;
        }
        None
    }

    #[inline]
    fn refill(&self, acc: &mut Accessor, addr: u32) -> bool {
        match self.lookup(acc.table, addr) {
            Some(entry) => {
                acc.start = entry.start;
                acc.end = entry.end;
                acc.offset = entry.offset;
                acc.access = entry.access;
                acc.epoch = self.epoch;
                true
            }
            None => {
                debug_assert!(false, "unmapped {:?} access at ${addr:04X}", acc.table);
                false
            }
        }
    }

    /// Read through the accessor cache. Returns either the byte or the I/O
    /// port the caller must dispatch.
    #[inline]
    pub fn read(&self, acc: &mut Accessor, addr: u32) -> Fetched<P> {
        debug_assert!(acc.table == Table::Read);
        if !acc.covers(self.epoch, addr) && !self.refill(acc, addr) {
            // Open-bus approximation for unmapped reads in release builds.
            return Fetched::Value(0xFF);
        }
        let rel = addr.wrapping_sub(acc.offset);
        match self.accesses[acc.access] {
            Access::Mem { slot, base } => {
                Fetched::Value(self.slots[slot].bytes()[base.wrapping_add(rel) as usize])
            }
            Access::Io(port) => Fetched::Io(port, rel),
        }
    }

    /// Write through the accessor cache. Returns the I/O port to dispatch
    /// when the range is callback-backed; direct writes complete here.
    #[inline]
    pub fn write(&mut self, acc: &mut Accessor, addr: u32, value: u8) -> Option<(P, u32)> {
        debug_assert!(acc.table == Table::Write);
        if !acc.covers(self.epoch, addr) && !self.refill(acc, addr) {
            return None;
        }
        let rel = addr.wrapping_sub(acc.offset);
        match self.accesses[acc.access] {
            Access::Mem { slot, base } => {
                let index = base.wrapping_add(rel) as usize;
                match &mut self.slots[slot] {
                    MemSlot::Ram(buf) => buf[index] = value,
                    MemSlot::Rom(_) => {
                        log::debug!("write ${value:02X} to read-only slot at ${addr:04X} ignored");
                    }
                }
                None
            }
            Access::Io(port) => Some((port, rel)),
        }
    }

    /// Uncached read for cold paths (debug probes, DMA source fetches).
    pub fn read_uncached(&self, addr: u32) -> Fetched<P> {
        let mut acc = Accessor::new(Table::Read);
        self.read(&mut acc, addr)
    }

    pub fn write_uncached(&mut self, addr: u32, value: u8) -> Option<(P, u32)> {
        let mut acc = Accessor::new(Table::Write);
        self.write(&mut acc, addr, value)
    }
}

impl<P: Copy + Serialize + DeserializeOwned> MemoryBus<P> {
    /// Snapshot of everything that varies at runtime: RAM slot contents and
    /// the access table (bank selections). Page tables are rebuilt by the
    /// context at construction, so they are not part of the state.
    pub fn save_state(&self) -> BusState<P> {
        BusState {
            version: BUS_STATE_VERSION,
            ram: self
                .slots
                .iter()
                .filter_map(|slot| match slot {
                    MemSlot::Ram(buf) => Some(buf.to_vec()),
                    MemSlot::Rom(_) => None,
                })
                .collect(),
            accesses: self.accesses.clone(),
        }
    }

    /// Restore a snapshot into an identically-constructed bus. Fails when
    /// the shape (slot sizes, access count) does not match.
    pub fn restore_state(&mut self, state: &BusState<P>) -> bool {
        if state.version != BUS_STATE_VERSION || state.accesses.len() != self.accesses.len() {
            return false;
        }
        let ram_count = self
            .slots
            .iter()
            .filter(|slot| matches!(slot, MemSlot::Ram(_)))
            .count();
        if state.ram.len() != ram_count {
            return false;
        }
        let ram_slots = self
            .slots
            .iter()
            .filter_map(|slot| match slot {
                MemSlot::Ram(buf) => Some(buf.len()),
                MemSlot::Rom(_) => None,
            });
        if !ram_slots.eq(state.ram.iter().map(Vec::len)) {
            return false;
        }

        let mut saved = state.ram.iter();
        for slot in &mut self.slots {
            if let MemSlot::Ram(buf) = slot {
                if let Some(bytes) = saved.next() {
                    buf.copy_from_slice(bytes);
                }
            }
        }
        self.accesses.copy_from_slice(&state.accesses);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    enum Port {
        B,
        C,
    }

    fn read_at(bus: &MemoryBus<Port>, addr: u32) -> Fetched<Port> {
        bus.read_uncached(addr)
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(MemoryBus::<Port>::new(33, 10).is_err());
        assert!(MemoryBus::<Port>::new(16, 0).is_err());
        assert!(MemoryBus::<Port>::new(10, 16).is_err());
        assert!(MemoryBus::<Port>::new(16, 10).is_ok());
    }

    #[test]
    fn direct_memory_read_applies_offset_and_base() {
        let mut bus: MemoryBus<Port> = MemoryBus::new(16, 10).unwrap();
        let slot = bus.add_ram_slot(0x4000);
        bus.slot_mut(slot).unwrap()[0x0010] = 0xAB;
        bus.slot_mut(slot).unwrap()[0x2010] = 0xCD;

        let acc = bus.add_access(Access::Mem { slot, base: 0 });
        bus.add_range(Table::Read, 0x2000, 0x3FFF, acc).unwrap();
        assert_eq!(read_at(&bus, 0x2010), Fetched::Value(0xAB));

        // Re-pointing the access rebanks without re-splicing.
        bus.set_access(acc, Access::Mem { slot, base: 0x2000 });
        assert_eq!(read_at(&bus, 0x2010), Fetched::Value(0xCD));
    }

    #[test]
    fn overlapping_installs_override_in_order() {
        // Spec scenario: RAM range A, then callback B inside it, then
        // callback C over A's head.
        let mut bus: MemoryBus<Port> = MemoryBus::new(16, 10).unwrap();
        let slot = bus.add_ram_slot(0x2000);
        bus.slot_mut(slot).unwrap()[0x0010] = 0x42;

        let ram = bus.add_access(Access::Mem { slot, base: 0 });
        let io_b = bus.add_access(Access::Io(Port::B));
        let io_c = bus.add_access(Access::Io(Port::C));
        bus.add_range(Table::Read, 0x2000, 0x3FFF, ram).unwrap();
        bus.add_range(Table::Read, 0x2008, 0x200F, io_b).unwrap();
        bus.add_range(Table::Read, 0x2000, 0x2007, io_c).unwrap();

        assert_eq!(read_at(&bus, 0x2005), Fetched::Io(Port::C, 0x5));
        assert_eq!(read_at(&bus, 0x200A), Fetched::Io(Port::B, 0x2));
        assert_eq!(read_at(&bus, 0x2010), Fetched::Value(0x42));
    }

    #[test]
    fn install_inside_existing_range_splits_it() {
        let mut bus: MemoryBus<Port> = MemoryBus::new(16, 10).unwrap();
        let slot = bus.add_ram_slot(0x400);
        for i in 0..0x400u32 {
            bus.slot_mut(slot).unwrap()[i as usize] = i as u8;
        }
        let ram = bus.add_access(Access::Mem { slot, base: 0 });
        let io = bus.add_access(Access::Io(Port::B));
        bus.add_range(Table::Read, 0x0000, 0x03FF, ram).unwrap();
        bus.add_range(Table::Read, 0x0100, 0x01FF, io).unwrap();

        // Head of the original range still direct.
        assert_eq!(read_at(&bus, 0x00FF), Fetched::Value(0xFF));
        // Newcomer wins its window.
        assert_eq!(read_at(&bus, 0x0100), Fetched::Io(Port::B, 0));
        assert_eq!(read_at(&bus, 0x01FF), Fetched::Io(Port::B, 0xFF));
        // Split tail keeps the original offset arithmetic.
        assert_eq!(read_at(&bus, 0x0200), Fetched::Value(0x00));
        assert_eq!(read_at(&bus, 0x03FF), Fetched::Value(0xFF));
    }

    #[test]
    fn read_and_write_tables_are_independent() {
        let mut bus: MemoryBus<Port> = MemoryBus::new(16, 10).unwrap();
        let slot = bus.add_ram_slot(0x100);
        let ram = bus.add_access(Access::Mem { slot, base: 0 });
        let trap = bus.add_access(Access::Io(Port::B));
        bus.add_range(Table::Read, 0x0000, 0x00FF, ram).unwrap();
        bus.add_range(Table::Write, 0x0000, 0x00FF, trap).unwrap();

        assert_eq!(read_at(&bus, 0x0040), Fetched::Value(0));
        assert_eq!(bus.write_uncached(0x0040, 0x55), Some((Port::B, 0x40)));
        // The trap did not touch the backing RAM.
        assert_eq!(read_at(&bus, 0x0040), Fetched::Value(0));
    }

    #[test]
    fn ranges_spanning_pages_resolve_on_every_page() {
        let mut bus: MemoryBus<Port> = MemoryBus::new(16, 10).unwrap();
        let slot = bus.add_ram_slot(0x2000);
        bus.slot_mut(slot).unwrap()[0x0000] = 1;
        bus.slot_mut(slot).unwrap()[0x0400] = 2;
        bus.slot_mut(slot).unwrap()[0x1FFF] = 3;
        let ram = bus.add_access(Access::Mem { slot, base: 0 });
        bus.add_range(Table::Read, 0x4000, 0x5FFF, ram).unwrap();

        assert_eq!(read_at(&bus, 0x4000), Fetched::Value(1));
        assert_eq!(read_at(&bus, 0x4400), Fetched::Value(2));
        assert_eq!(read_at(&bus, 0x5FFF), Fetched::Value(3));
    }

    #[test]
    fn accessor_cache_survives_hits_and_invalidates_on_resplice() {
        let mut bus: MemoryBus<Port> = MemoryBus::new(16, 10).unwrap();
        let slot = bus.add_ram_slot(0x100);
        bus.slot_mut(slot).unwrap()[0x10] = 0x99;
        let ram = bus.add_access(Access::Mem { slot, base: 0 });
        bus.add_range(Table::Read, 0x0000, 0x00FF, ram).unwrap();

        let mut acc = Accessor::new(Table::Read);
        assert_eq!(bus.read(&mut acc, 0x0010), Fetched::Value(0x99));
        assert_eq!(bus.read(&mut acc, 0x0010), Fetched::Value(0x99));

        // Re-splice the window; the cached entry must not be trusted.
        let io = bus.add_access(Access::Io(Port::C));
        bus.add_range(Table::Read, 0x0000, 0x00FF, io).unwrap();
        assert_eq!(bus.read(&mut acc, 0x0010), Fetched::Io(Port::C, 0x10));
    }

    #[test]
    fn state_roundtrip_restores_ram_and_banking() {
        let mut bus: MemoryBus<Port> = MemoryBus::new(16, 10).unwrap();
        let ram_slot = bus.add_ram_slot(0x100);
        let rom: Arc<[u8]> = vec![0u8; 0x8000].into();
        let rom_slot = bus.add_rom_slot(rom);
        let ram = bus.add_access(Access::Mem { slot: ram_slot, base: 0 });
        let bank = bus.add_access(Access::Mem { slot: rom_slot, base: 0 });
        bus.add_range_rw(0x0000, 0x00FF, ram).unwrap();
        bus.add_range(Table::Read, 0x4000, 0x7FFF, bank).unwrap();

        bus.slot_mut(ram_slot).unwrap()[0x20] = 0x77;
        bus.set_access(bank, Access::Mem { slot: rom_slot, base: 0x4000 });
        let state = bus.save_state();

        let mut other: MemoryBus<Port> = MemoryBus::new(16, 10).unwrap();
        let ram_slot2 = other.add_ram_slot(0x100);
        let rom2: Arc<[u8]> = vec![0u8; 0x8000].into();
        let rom_slot2 = other.add_rom_slot(rom2);
        let ram2 = other.add_access(Access::Mem { slot: ram_slot2, base: 0 });
        let bank2 = other.add_access(Access::Mem { slot: rom_slot2, base: 0 });
        other.add_range_rw(0x0000, 0x00FF, ram2).unwrap();
        other.add_range(Table::Read, 0x4000, 0x7FFF, bank2).unwrap();

        assert!(other.restore_state(&state));
        assert_eq!(other.slot(ram_slot2)[0x20], 0x77);
        assert_eq!(
            other.access(bank2),
            Access::Mem { slot: rom_slot2, base: 0x4000 }
        );
        // Canonical form: a second snapshot is identical.
        assert_eq!(other.save_state(), state);
    }

    #[test]
    fn mismatched_state_is_rejected() {
        let mut bus: MemoryBus<Port> = MemoryBus::new(16, 10).unwrap();
        let slot = bus.add_ram_slot(0x100);
        let ram = bus.add_access(Access::Mem { slot, base: 0 });
        bus.add_range_rw(0x0000, 0x00FF, ram).unwrap();
        let mut state = bus.save_state();
        state.ram[0] = vec![0; 0x80];
        assert!(!bus.restore_state(&state));
    }
}
