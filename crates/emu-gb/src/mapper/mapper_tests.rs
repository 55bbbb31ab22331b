use super::*;
use crate::rom::build_test_rom;
use emu_core::membus::Fetched;
use std::sync::Arc;

struct Fixture {
    mem: MemoryBus<GbPort>,
    rom_slot: SlotId,
    rom_size: usize,
}

impl Fixture {
    /// ROM filled with its 16K bank number at every byte past the header.
    fn new(cartridge_type: u8, banks: usize) -> (Fixture, Box<dyn Mapper>) {
        let mut raw = build_test_rom(cartridge_type, banks, &[0x00]);
        for (i, byte) in raw.iter_mut().enumerate().skip(0x200) {
            *byte = (i / ROM_BANK_SIZE) as u8;
        }
        let desc = crate::rom::Rom::parse(&build_test_rom(cartridge_type, banks, &[0x00]))
            .unwrap()
            .description()
            .clone();

        let mut mem: MemoryBus<GbPort> = MemoryBus::new(16, 10).unwrap();
        let open_bus = mem.add_access(Access::Io(GbPort::OpenBus));
        mem.add_range_rw(0x0000, 0xFFFF, open_bus).unwrap();
        let rom: Arc<[u8]> = raw.into();
        let rom_size = rom.len();
        let rom_slot = mem.add_rom_slot(rom);

        let mut fixture = Fixture {
            mem,
            rom_slot,
            rom_size,
        };
        let mut mapper = create_mapper(&desc);
        mapper.initialize(&mut fixture.bus()).unwrap();
        (fixture, mapper)
    }

    fn bus(&mut self) -> GbMapperBus<'_> {
        GbMapperBus {
            mem: &mut self.mem,
            rom_slot: self.rom_slot,
            rom_size: self.rom_size,
        }
    }

    fn read(&self, addr: u32) -> u8 {
        match self.mem.read_uncached(addr) {
            Fetched::Value(value) => value,
            Fetched::Io(port, _) => panic!("unexpected I/O at ${addr:04X}: {port:?}"),
        }
    }

    fn is_io(&self, addr: u32) -> bool {
        matches!(self.mem.read_uncached(addr), Fetched::Io(..))
    }

    fn write(&mut self, mapper: &mut Box<dyn Mapper>, addr: u16, value: u8) {
        let mut bus = self.bus();
        mapper.cpu_write(&mut bus, 0, addr, value);
    }
}

#[test]
fn rom_only_maps_the_two_fixed_banks() {
    let (fixture, _mapper) = Fixture::new(0x00, 2);
    assert_eq!(fixture.read(0x0200), 0);
    assert_eq!(fixture.read(0x4000), 1);
}

#[test]
fn mbc1_switches_the_high_window() {
    let (mut fixture, mut mapper) = Fixture::new(0x03, 8);
    assert_eq!(fixture.read(0x4000), 1, "bank 0 selections map to bank 1");

    fixture.write(&mut mapper, 0x2000, 5);
    assert_eq!(fixture.read(0x4000), 5);
    assert_eq!(fixture.read(0x0200), 0, "low window stays at bank 0");

    // Selections wrap at the cartridge size.
    fixture.write(&mut mapper, 0x2000, 11);
    assert_eq!(fixture.read(0x4000), 3);
}

#[test]
fn mbc1_ram_gate_toggles_the_window() {
    let (mut fixture, mut mapper) = Fixture::new(0x03, 4);
    assert!(fixture.is_io(0xA000), "RAM starts disabled");

    fixture.write(&mut mapper, 0x0000, 0x0A);
    assert!(!fixture.is_io(0xA000), "enabled RAM is direct memory");

    fixture.write(&mut mapper, 0x0000, 0x00);
    assert!(fixture.is_io(0xA000));
    assert_eq!(mapper.ram_read(0xA000), 0xFF, "disabled RAM reads open");
}

#[test]
fn mbc2_bank_select_needs_address_bit_8() {
    let (mut fixture, mut mapper) = Fixture::new(0x06, 8);
    fixture.write(&mut mapper, 0x0000, 0x03); // bit 8 clear: RAM gate
    assert_eq!(fixture.read(0x4000), 1);

    fixture.write(&mut mapper, 0x0100, 0x03); // bit 8 set: bank select
    assert_eq!(fixture.read(0x4000), 3);
}

#[test]
fn mbc2_internal_ram_is_four_bits_wide() {
    let (mut fixture, mut mapper) = Fixture::new(0x06, 4);
    fixture.write(&mut mapper, 0x0000, 0x0A);
    mapper.ram_write(0xA010, 0xFF);
    assert_eq!(mapper.ram_read(0xA010), 0xFF, "upper nibble reads back set");
    mapper.ram_write(0xA010, 0x05);
    assert_eq!(mapper.ram_read(0xA010), 0xF5);
    // The 512-byte array echoes across the window.
    assert_eq!(mapper.ram_read(0xA210), 0xF5);
}

#[test]
fn mbc3_banks_and_rtc_select() {
    let (mut fixture, mut mapper) = Fixture::new(0x10, 8);
    fixture.write(&mut mapper, 0x2000, 6);
    assert_eq!(fixture.read(0x4000), 6);

    fixture.write(&mut mapper, 0x0000, 0x0A);
    fixture.write(&mut mapper, 0x4000, 0x00);
    assert!(!fixture.is_io(0xA000), "RAM bank selected");

    fixture.write(&mut mapper, 0x4000, 0x08);
    assert!(fixture.is_io(0xA000), "RTC register selected");
}

#[test]
fn mbc3_rtc_latches_the_frame_clock() {
    let (mut fixture, mut mapper) = Fixture::new(0x10, 4);
    fixture.write(&mut mapper, 0x0000, 0x0A);
    fixture.write(&mut mapper, 0x4000, 0x08); // seconds register

    // 61 emulated seconds.
    for _ in 0..61 * 60 {
        mapper.begin_frame();
    }
    fixture.write(&mut mapper, 0x6000, 0x00);
    fixture.write(&mut mapper, 0x6000, 0x01);
    assert_eq!(mapper.ram_read(0xA000), 1, "seconds wrapped at 60");

    fixture.write(&mut mapper, 0x4000, 0x09); // minutes register
    assert_eq!(mapper.ram_read(0xA000), 1);
}

#[test]
fn mbc5_nine_bit_bank_and_bank_zero() {
    let (mut fixture, mut mapper) = Fixture::new(0x1B, 8);
    fixture.write(&mut mapper, 0x2000, 0x00);
    assert_eq!(fixture.read(0x4000), 0, "MBC5 allows bank 0");

    fixture.write(&mut mapper, 0x2000, 0x06);
    assert_eq!(fixture.read(0x4000), 6);

    // Bit 8 wraps around the 8-bank image.
    fixture.write(&mut mapper, 0x3000, 0x01);
    assert_eq!(fixture.read(0x4000), 6, "bank 262 mod 8");
}

#[test]
fn mapper_state_roundtrip() {
    let (mut fixture, mut mapper) = Fixture::new(0x03, 8);
    fixture.write(&mut mapper, 0x2000, 5);
    fixture.write(&mut mapper, 0x0000, 0x0A);

    let bytes = mapper.save_state().unwrap();
    let (_other_fixture, mut other) = Fixture::new(0x03, 8);
    other.restore_state(&bytes).unwrap();
    assert_eq!(other.save_state().unwrap(), bytes);
}
