use emu_core::savestate::{self, SaveStateError};
use serde::{Deserialize, Serialize};

/// Interrupt sources in register bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    VBlank = 0,
    LcdStat = 1,
    Timer = 2,
    Serial = 3,
    Joypad = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptState {
    pub version: u32,
    pub reg_if: u8,
    pub reg_ie: u8,
}

pub const INTERRUPT_STATE_VERSION: u32 = 1;

/// IF/IE register pair. Components raise bits here; the CPU polls and
/// acknowledges at instruction boundaries.
#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    reg_if: u8,
    reg_ie: u8,
}

impl Interrupts {
    pub fn new() -> Interrupts {
        Interrupts::default()
    }

    pub fn reset(&mut self) {
        self.reg_if = 0;
        self.reg_ie = 0;
    }

    pub fn raise(&mut self, signal: Signal) {
        self.reg_if |= 1 << signal as u8;
    }

    pub fn clear(&mut self, signal: Signal) {
        self.reg_if &= !(1 << signal as u8);
    }

    /// Bits both requested and enabled.
    pub fn pending(&self) -> u8 {
        self.reg_if & self.reg_ie & 0x1F
    }

    pub fn acknowledge(&mut self, bit: u8) {
        self.reg_if &= !(1 << bit);
    }

    pub fn read_if(&self) -> u8 {
        // Unused upper bits read back set.
        0xE0 | self.reg_if
    }

    pub fn write_if(&mut self, value: u8) {
        self.reg_if = value & 0x1F;
    }

    pub fn read_ie(&self) -> u8 {
        self.reg_ie
    }

    pub fn write_ie(&mut self, value: u8) {
        self.reg_ie = value;
    }

    pub fn save_state(&self) -> InterruptState {
        InterruptState {
            version: INTERRUPT_STATE_VERSION,
            reg_if: self.reg_if,
            reg_ie: self.reg_ie,
        }
    }

    pub fn restore_state(&mut self, state: &InterruptState) -> Result<(), SaveStateError> {
        savestate::check_version("interrupts", state.version, INTERRUPT_STATE_VERSION)?;
        self.reg_if = state.reg_if;
        self.reg_ie = state.reg_ie;
        Ok(())
    }
}

/// Dispatch vector for an interrupt bit.
pub fn vector(bit: u8) -> u16 {
    0x0040 + bit as u16 * 8
}
