use crate::input::Buttons;
use crate::savestate::SaveStateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemInfo {
    pub name: &'static str,
    pub extensions: &'static str,
}

/// One gameplay session: a fully wired machine bound to one ROM.
///
/// Contexts own their render surface (32-bit RGBA, row-major, pitch equal
/// to the display width) and their mono 16-bit sample buffer; `run_frame`
/// fills both for exactly one video field.
pub trait EmuContext {
    fn display_size(&self) -> (u32, u32);

    fn reset(&mut self);

    fn set_controller(&mut self, index: u32, buttons: Buttons);

    /// Configure how many samples each frame produces. The tick-per-sample
    /// rate is derived from the system's master clock frequency.
    fn set_sound_samples_per_frame(&mut self, samples: usize);

    /// Advance exactly one frame. Returns `false` once the context has
    /// faulted (illegal opcode); every subsequent call is a no-op and the
    /// host keeps showing the last good frame.
    fn run_frame(&mut self) -> bool;

    fn video(&self) -> &[u32];

    fn audio(&self) -> &[i16];

    /// Full machine snapshot (clock, CPUs, video, audio, RAM, mapper).
    fn save_state(&self) -> Result<Vec<u8>, SaveStateError>;

    fn load_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError>;

    /// Battery-backed cartridge data only.
    fn save_game_data(&self) -> Result<Vec<u8>, SaveStateError>;

    fn load_game_data(&mut self, bytes: &[u8]) -> Result<(), SaveStateError>;

    /// Debug probe into the CPU address space at the current tick.
    fn read8(&mut self, addr: u32) -> u8;

    fn write8(&mut self, addr: u32, value: u8);
}

/// System front end: identifies the machine and builds contexts from raw
/// ROM images. Invalid images produce `None` (details on the log channel).
pub trait Emulator {
    fn system_info(&self) -> SystemInfo;

    fn display_size(&self) -> (u32, u32);

    fn create_context(&self, rom: &[u8]) -> Option<Box<dyn EmuContext>>;
}
