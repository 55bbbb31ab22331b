use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const HEADER_START: usize = 0x100;
const HEADER_END: usize = 0x150;

pub const ROM_BANK_SIZE: usize = 0x4000;

#[derive(Debug, Error)]
pub enum RomError {
    #[error("{0}")]
    InvalidFormat(String),

    #[error("Unsupported cartridge type: ${0:02X}")]
    UnsupportedCartridgeType(u8),

    #[error("Header checksum mismatch: computed ${computed:02X}, stored ${stored:02X}")]
    HeaderChecksum { computed: u8, stored: u8 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapper {
    Rom,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Japan,
    NonJapan,
}

/// Parsed form of the 80-byte cartridge header at $0100.
#[derive(Debug, Clone)]
pub struct Description {
    pub title: String,
    pub rom_size: u32,
    pub ram_size: u32,
    pub mapper: Mapper,
    pub cartridge_type: u8,
    pub use_cgb: bool,
    pub only_cgb: bool,
    pub use_sgb: bool,
    pub has_ram: bool,
    pub has_battery: bool,
    pub has_timer: bool,
    pub has_rumble: bool,
    pub destination: Destination,
    pub licensee_old: u8,
    pub licensee_new: u16,
    pub version: u8,
    pub header_checksum: u8,
    pub global_checksum: u16,
}

/// Immutable cartridge image shared by every context built from it.
pub struct Rom {
    description: Description,
    content: Arc<[u8]>,
}

impl Rom {
    pub fn load(path: &Path) -> Result<Rom, RomError> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn parse(raw: &[u8]) -> Result<Rom, RomError> {
        if raw.len() < HEADER_END {
            return Err(RomError::InvalidFormat("File smaller than the header".into()));
        }

        let cartridge_type = raw[0x147];
        let (mapper, has_ram, has_battery, has_timer, has_rumble) = match cartridge_type {
            0x00 => (Mapper::Rom, false, false, false, false),
            0x08 => (Mapper::Rom, true, false, false, false),
            0x09 => (Mapper::Rom, true, true, false, false),
            0x01 => (Mapper::Mbc1, false, false, false, false),
            0x02 => (Mapper::Mbc1, true, false, false, false),
            0x03 => (Mapper::Mbc1, true, true, false, false),
            0x05 => (Mapper::Mbc2, true, false, false, false),
            0x06 => (Mapper::Mbc2, true, true, false, false),
            0x0F => (Mapper::Mbc3, false, true, true, false),
            0x10 => (Mapper::Mbc3, true, true, true, false),
            0x11 => (Mapper::Mbc3, false, false, false, false),
            0x12 => (Mapper::Mbc3, true, false, false, false),
            0x13 => (Mapper::Mbc3, true, true, false, false),
            0x19 => (Mapper::Mbc5, false, false, false, false),
            0x1A => (Mapper::Mbc5, true, false, false, false),
            0x1B => (Mapper::Mbc5, true, true, false, false),
            0x1C => (Mapper::Mbc5, false, false, false, true),
            0x1D => (Mapper::Mbc5, true, false, false, true),
            0x1E => (Mapper::Mbc5, true, true, false, true),
            other => return Err(RomError::UnsupportedCartridgeType(other)),
        };

        let rom_size = match raw[0x148] {
            code @ 0x00..=0x08 => (32 * 1024) << code,
            code => {
                return Err(RomError::InvalidFormat(format!(
                    "Unknown ROM size code ${code:02X}"
                )));
            }
        };
        let ram_size: u32 = match raw[0x149] {
            0x00 => 0,
            0x01 => 2 * 1024,
            0x02 => 8 * 1024,
            0x03 => 32 * 1024,
            0x04 => 128 * 1024,
            0x05 => 64 * 1024,
            code => {
                return Err(RomError::InvalidFormat(format!(
                    "Unknown RAM size code ${code:02X}"
                )));
            }
        };

        if raw.len() < rom_size as usize {
            return Err(RomError::InvalidFormat(format!(
                "File truncated: header claims {} bytes, found {}",
                rom_size,
                raw.len()
            )));
        }

        let mut computed: u8 = 0;
        for &byte in &raw[0x134..=0x14C] {
            computed = computed.wrapping_sub(byte).wrapping_sub(1);
        }
        let stored = raw[0x14D];
        if computed != stored {
            return Err(RomError::HeaderChecksum { computed, stored });
        }

        let cgb_flag = raw[0x143];
        let title_bytes = &raw[0x134..0x144];
        let title_len = title_bytes
            .iter()
            .position(|&byte| byte == 0 || byte & 0x80 != 0)
            .unwrap_or(title_bytes.len());
        let title = title_bytes[..title_len]
            .iter()
            .map(|&byte| byte as char)
            .collect();

        Ok(Rom {
            description: Description {
                title,
                rom_size,
                ram_size,
                mapper,
                cartridge_type,
                use_cgb: cgb_flag & 0x80 != 0,
                only_cgb: cgb_flag == 0xC0,
                use_sgb: raw[0x146] == 0x03,
                has_ram,
                has_battery,
                has_timer,
                has_rumble,
                destination: if raw[0x14A] == 0 {
                    Destination::Japan
                } else {
                    Destination::NonJapan
                },
                licensee_old: raw[0x14B],
                licensee_new: u16::from_be_bytes([raw[0x144], raw[0x145]]),
                version: raw[0x14C],
                header_checksum: stored,
                global_checksum: u16::from_be_bytes([raw[0x14E], raw[0x14F]]),
            },
            content: raw.into(),
        })
    }

    pub fn description(&self) -> &Description {
        &self.description
    }

    pub fn content(&self) -> &Arc<[u8]> {
        &self.content
    }

    pub fn mapper_name(mapper: Mapper) -> &'static str {
        match mapper {
            Mapper::Rom => "ROM",
            Mapper::Mbc1 => "MBC1",
            Mapper::Mbc2 => "MBC2",
            Mapper::Mbc3 => "MBC3",
            Mapper::Mbc5 => "MBC5",
        }
    }
}

/// Build a valid image in memory; tests and harnesses use this instead of
/// shipping ROM fixtures.
pub fn build_test_rom(cartridge_type: u8, rom_banks: usize, program: &[u8]) -> Vec<u8> {
    let mut raw = vec![0u8; rom_banks.max(2) * ROM_BANK_SIZE];
    raw[HEADER_START] = 0x00; // NOP
    raw[HEADER_START + 1] = 0xC3; // JP $0150
    raw[HEADER_START + 2] = 0x50;
    raw[HEADER_START + 3] = 0x01;
    raw[0x134..0x138].copy_from_slice(b"TEST");
    raw[0x147] = cartridge_type;
    raw[0x148] = match rom_banks.max(2) {
        2 => 0,
        4 => 1,
        8 => 2,
        16 => 3,
        32 => 4,
        64 => 5,
        _ => 6,
    };
    raw[0x149] = 0x02; // 8KB external RAM
    let mut checksum: u8 = 0;
    for &byte in &raw[0x134..=0x14C] {
        checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
    }
    raw[0x14D] = checksum;
    raw[0x150..0x150 + program.len()].copy_from_slice(program);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_fields() {
        let raw = build_test_rom(0x03, 4, &[0x00]);
        let rom = Rom::parse(&raw).unwrap();
        let desc = rom.description();
        assert_eq!(desc.title, "TEST");
        assert_eq!(desc.mapper, Mapper::Mbc1);
        assert!(desc.has_ram);
        assert!(desc.has_battery);
        assert_eq!(desc.rom_size, 128 * 1024);
        assert_eq!(desc.ram_size, 8 * 1024);
        assert_eq!(desc.destination, Destination::Japan);
    }

    #[test]
    fn rejects_bad_header_checksum() {
        let mut raw = build_test_rom(0x00, 2, &[0x00]);
        raw[0x134] = raw[0x134].wrapping_add(1);
        assert!(matches!(
            Rom::parse(&raw),
            Err(RomError::HeaderChecksum { .. })
        ));
    }

    #[test]
    fn rejects_unknown_cartridge_types() {
        let mut raw = build_test_rom(0x00, 2, &[0x00]);
        raw[0x147] = 0xEE;
        // Checksum covers the type byte; refresh it so the type check runs.
        let mut checksum: u8 = 0;
        for &byte in &raw[0x134..=0x14C] {
            checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
        }
        raw[0x14D] = checksum;
        assert!(matches!(
            Rom::parse(&raw),
            Err(RomError::UnsupportedCartridgeType(0xEE))
        ));
    }

    #[test]
    fn rejects_truncated_files() {
        let mut raw = build_test_rom(0x00, 2, &[0x00]);
        raw.truncate(0x4000);
        assert!(matches!(Rom::parse(&raw), Err(RomError::InvalidFormat(_))));
    }

    #[test]
    fn cgb_flags_decode() {
        let mut raw = build_test_rom(0x00, 2, &[0x00]);
        raw[0x143] = 0xC0;
        let mut checksum: u8 = 0;
        for &byte in &raw[0x134..=0x14C] {
            checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
        }
        raw[0x14D] = checksum;
        let rom = Rom::parse(&raw).unwrap();
        assert!(rom.description().use_cgb);
        assert!(rom.description().only_cgb);
    }
}
