// Game Boy core modules
pub mod audio;
pub mod bus;
pub mod context;
pub mod cpu;
pub mod interrupts;
pub mod joypad;
pub mod mapper;
pub mod rom;
pub mod serial;
pub mod timer;
pub mod video;

use emu_core::api::{EmuContext, Emulator, SystemInfo};
use std::sync::Arc;
use video::Model;

// Re-exports
pub use context::GbContext;
pub use rom::{Rom, RomError};

fn create_context(rom: &[u8], model: Model) -> Option<Box<dyn EmuContext>> {
    let rom = match Rom::parse(rom) {
        Ok(rom) => Arc::new(rom),
        Err(err) => {
            log::warn!("failed to parse ROM: {err}");
            return None;
        }
    };
    match GbContext::new(rom, model) {
        Ok(context) => Some(Box::new(context)),
        Err(err) => {
            log::warn!("failed to build context: {err}");
            None
        }
    }
}

/// Front end for the monochrome machine.
pub struct GbEmulator;

impl Emulator for GbEmulator {
    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            name: "Game Boy",
            extensions: "gb",
        }
    }

    fn display_size(&self) -> (u32, u32) {
        (video::DISPLAY_SIZE_X as u32, video::DISPLAY_SIZE_Y as u32)
    }

    fn create_context(&self, rom: &[u8]) -> Option<Box<dyn EmuContext>> {
        create_context(rom, Model::Gb)
    }
}

/// Front end for the color machine.
pub struct GbcEmulator;

impl Emulator for GbcEmulator {
    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            name: "Game Boy Color",
            extensions: "gbc;gb",
        }
    }

    fn display_size(&self) -> (u32, u32) {
        (video::DISPLAY_SIZE_X as u32, video::DISPLAY_SIZE_Y as u32)
    }

    fn create_context(&self, rom: &[u8]) -> Option<Box<dyn EmuContext>> {
        create_context(rom, Model::Gbc)
    }
}
