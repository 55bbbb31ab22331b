use emu_core::input::Buttons;
use serde::{Deserialize, Serialize};

/// One controller's shift register behind $4016/$4017. A strobe write
/// latches the current buttons; reads then shift one bit out at a time,
/// returning 1s once the register drains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joypad {
    buttons: Buttons,
    shift: u8,
    strobe: bool,
}

impl Joypad {
    pub fn new() -> Joypad {
        Joypad {
            buttons: Buttons::empty(),
            shift: 0,
            strobe: false,
        }
    }

    pub fn set_buttons(&mut self, buttons: Buttons) {
        self.buttons = buttons.sanitize();
        if self.strobe {
            self.shift = self.buttons.bits();
        }
    }

    pub fn write_strobe(&mut self, value: u8) {
        let strobe = value & 1 != 0;
        if strobe {
            self.shift = self.buttons.bits();
        }
        self.strobe = strobe;
    }

    pub fn read(&mut self) -> u8 {
        let bit = if self.strobe {
            self.buttons.bits() & 1
        } else {
            let bit = self.shift & 1;
            self.shift = 0x80 | (self.shift >> 1);
            bit
        };
        // Upper bits are open bus on a stock console.
        0x40 | bit
    }
}
