// NES core modules
pub mod apu;
pub mod bus;
pub mod context;
pub mod cpu;
pub mod joypad;
pub mod mapper;
pub mod ppu;
pub mod rom;

use emu_core::api::{EmuContext, Emulator, SystemInfo};
use std::sync::Arc;

// Re-exports
pub use context::NesContext;
pub use rom::{Rom, RomError};

/// Front end for the NES machine.
pub struct NesEmulator;

impl Emulator for NesEmulator {
    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            name: "Nintendo Entertainment System",
            extensions: "nes",
        }
    }

    fn display_size(&self) -> (u32, u32) {
        (context::DISPLAY_SIZE_X, context::DISPLAY_SIZE_Y)
    }

    fn create_context(&self, rom: &[u8]) -> Option<Box<dyn EmuContext>> {
        let rom = match Rom::parse(rom) {
            Ok(rom) => Arc::new(rom),
            Err(err) => {
                log::warn!("failed to parse ROM: {err}");
                return None;
            }
        };
        match NesContext::new(rom) {
            Ok(context) => Some(Box::new(context)),
            Err(err) => {
                log::warn!("failed to build context: {err}");
                None
            }
        }
    }
}
