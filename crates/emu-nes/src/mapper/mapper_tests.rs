use super::*;
use crate::bus::NesPort;
use crate::rom::Mirroring;
use emu_core::membus::Fetched;
use std::sync::Arc;

struct Fixture {
    mem: MemoryBus<NesPort>,
    ppu: Ppu,
    prg_slot: SlotId,
    prg_size: usize,
}

impl Fixture {
    /// PRG filled with its 16K bank number at every byte, CHR with its 1K
    /// bank number.
    fn new(prg_banks_16k: usize, chr_size: usize) -> Fixture {
        let mut mem: MemoryBus<NesPort> = MemoryBus::new(16, 10).unwrap();
        let mut prg = vec![0u8; prg_banks_16k * 0x4000];
        for (i, byte) in prg.iter_mut().enumerate() {
            *byte = (i / 0x4000) as u8;
        }
        let prg: Arc<[u8]> = prg.into();
        let prg_size = prg.len();
        let prg_slot = mem.add_rom_slot(prg);

        let mut chr = vec![0u8; chr_size];
        for (i, byte) in chr.iter_mut().enumerate() {
            *byte = (i / 0x0400) as u8;
        }
        let chr: Arc<[u8]> = chr.into();
        let ppu = Ppu::new(4, &chr, Mirroring::Vertical);

        Fixture {
            mem,
            ppu,
            prg_slot,
            prg_size,
        }
    }

    fn bus(&mut self) -> MapperBus<'_> {
        MapperBus {
            mem: &mut self.mem,
            ppu: &mut self.ppu,
            prg_slot: self.prg_slot,
            prg_size: self.prg_size,
        }
    }

    fn prg_read(&self, addr: u32) -> u8 {
        match self.mem.read_uncached(addr) {
            Fetched::Value(value) => value,
            Fetched::Io(..) => panic!("expected direct PRG read at ${addr:04X}"),
        }
    }

    fn write(&mut self, mapper: &mut dyn Mapper, addr: u16, value: u8) {
        let mut bus = self.bus();
        mapper.cpu_write(&mut bus, 0, addr, value);
    }

    /// Read CHR through the PPU data port: prime the buffer, then read.
    fn ppu_read(&mut self, addr: u16) -> u8 {
        self.ppu.reg_read(0, 2);
        self.ppu.reg_write(0, 6, (addr >> 8) as u8);
        self.ppu.reg_write(0, 6, addr as u8);
        self.ppu.reg_read(0, 7);
        self.ppu.reg_read(0, 7)
    }
}

#[test]
fn nrom_mirrors_16k_images() {
    let mut fixture = Fixture::new(1, 0x2000);
    let mut mapper = Nrom::new();
    mapper.initialize(&mut fixture.bus()).unwrap();
    assert_eq!(fixture.prg_read(0x8000), 0);
    assert_eq!(fixture.prg_read(0xC000), 0, "high half mirrors the only bank");
}

#[test]
fn nrom_maps_32k_linearly() {
    let mut fixture = Fixture::new(2, 0x2000);
    let mut mapper = Nrom::new();
    mapper.initialize(&mut fixture.bus()).unwrap();
    assert_eq!(fixture.prg_read(0x8000), 0);
    assert_eq!(fixture.prg_read(0xC000), 1);
}

#[test]
fn uxrom_switches_low_bank_and_fixes_last() {
    let mut fixture = Fixture::new(8, 0x2000);
    let mut mapper = UxRom::new();
    mapper.initialize(&mut fixture.bus()).unwrap();

    assert_eq!(fixture.prg_read(0x8000), 0);
    assert_eq!(fixture.prg_read(0xC000), 7, "high half fixed to the last bank");

    fixture.write(&mut mapper, 0x8000, 3);
    assert_eq!(fixture.prg_read(0x8000), 3);
    assert_eq!(fixture.prg_read(0xC000), 7);

    // Out-of-range selections wrap.
    fixture.write(&mut mapper, 0x8000, 9);
    assert_eq!(fixture.prg_read(0x8000), 1);
}

fn mmc1_serial_write(fixture: &mut Fixture, mapper: &mut Mmc1, addr: u16, value: u8) {
    for bit in 0..5 {
        fixture.write(mapper, addr, (value >> bit) & 1);
    }
}

#[test]
fn mmc1_serial_latch_switches_prg() {
    let mut fixture = Fixture::new(8, 0x2000);
    let mut mapper = Mmc1::new();
    mapper.initialize(&mut fixture.bus()).unwrap();

    // Power-on mode: switchable low half, fixed last bank high.
    assert_eq!(fixture.prg_read(0x8000), 0);
    assert_eq!(fixture.prg_read(0xC000), 7);

    mmc1_serial_write(&mut fixture, &mut mapper, 0xE000, 5);
    assert_eq!(fixture.prg_read(0x8000), 5);
    assert_eq!(fixture.prg_read(0xC000), 7);
}

#[test]
fn mmc1_partial_writes_do_not_commit() {
    let mut fixture = Fixture::new(8, 0x2000);
    let mut mapper = Mmc1::new();
    mapper.initialize(&mut fixture.bus()).unwrap();

    for _ in 0..4 {
        fixture.write(&mut mapper, 0xE000, 1);
    }
    assert_eq!(fixture.prg_read(0x8000), 0, "four bits are not enough");
    fixture.write(&mut mapper, 0xE000, 0);
    assert_eq!(fixture.prg_read(0x8000), 7, "committed $0F wraps to bank 7");
}

#[test]
fn mmc1_reset_bit_clears_the_latch() {
    let mut fixture = Fixture::new(8, 0x2000);
    let mut mapper = Mmc1::new();
    mapper.initialize(&mut fixture.bus()).unwrap();

    fixture.write(&mut mapper, 0xE000, 1);
    fixture.write(&mut mapper, 0xE000, 0x80);
    mmc1_serial_write(&mut fixture, &mut mapper, 0xE000, 2);
    assert_eq!(fixture.prg_read(0x8000), 2, "latch restarted cleanly");
}

#[test]
fn mmc1_controls_mirroring_and_chr() {
    let mut fixture = Fixture::new(2, 0x4000);
    let mut mapper = Mmc1::new();
    mapper.initialize(&mut fixture.bus()).unwrap();

    // Control: vertical mirroring, 4K CHR mode, PRG mode 3.
    mmc1_serial_write(&mut fixture, &mut mapper, 0x8000, 0b11110);
    mmc1_serial_write(&mut fixture, &mut mapper, 0xA000, 2); // CHR0 -> 4K bank 2
    mmc1_serial_write(&mut fixture, &mut mapper, 0xC000, 1); // CHR1 -> 4K bank 1

    assert_eq!(fixture.ppu.chr_size(), 0x4000);
    // CHR window 0 now maps 4K bank 2 (1K banks 8..11), window 1 maps 4K
    // bank 1 (1K banks 4..7).
    assert_eq!(fixture.ppu_read(0x0000), 8);
    assert_eq!(fixture.ppu_read(0x1000), 4);
}

#[test]
fn mmc3_prg_modes_swap_fixed_windows() {
    let mut fixture = Fixture::new(8, 0x2000); // 16 banks of 8K
    let mut mapper = Mmc3::new(Mirroring::Vertical);
    mapper.initialize(&mut fixture.bus()).unwrap();

    // Mode 0: R6 at $8000, second-last at $C000.
    fixture.write(&mut mapper, 0x8000, 6);
    fixture.write(&mut mapper, 0x8001, 4); // R6 = 8K bank 4 -> 16K bank 2
    assert_eq!(fixture.prg_read(0x8000), 2);
    assert_eq!(fixture.prg_read(0xC000), 7, "second-last 8K bank");
    assert_eq!(fixture.prg_read(0xE000), 7, "last 8K bank");

    // Mode 1 swaps $8000 and $C000.
    fixture.write(&mut mapper, 0x8000, 0x46);
    assert_eq!(fixture.prg_read(0x8000), 7);
    assert_eq!(fixture.prg_read(0xC000), 2);
}

#[test]
fn mmc3_scanline_counter_raises_irq() {
    let mut fixture = Fixture::new(8, 0x2000);
    let mut mapper = Mmc3::new(Mirroring::Vertical);
    mapper.initialize(&mut fixture.bus()).unwrap();

    fixture.write(&mut mapper, 0xC000, 3); // latch
    fixture.write(&mut mapper, 0xC001, 0); // reload on next clock
    fixture.write(&mut mapper, 0xE001, 0); // enable

    // Reload (3), then decrement to zero across three lines.
    for _ in 0..3 {
        mapper.on_visible_line(0);
        assert!(!mapper.irq_pending());
    }
    mapper.on_visible_line(0);
    assert!(mapper.irq_pending());

    // Disabling acknowledges.
    fixture.write(&mut mapper, 0xE000, 0);
    assert!(!mapper.irq_pending());
}

#[test]
fn mapper_state_roundtrip() {
    let mut fixture = Fixture::new(8, 0x2000);
    let mut mapper = UxRom::new();
    mapper.initialize(&mut fixture.bus()).unwrap();
    fixture.write(&mut mapper, 0x8000, 5);

    let bytes = mapper.save_state().unwrap();
    let mut other = UxRom::new();
    other.restore_state(&bytes).unwrap();
    assert_eq!(other.save_state().unwrap(), bytes);
}
