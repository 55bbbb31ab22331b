use emu_core::input::Buttons;
use serde::{Deserialize, Serialize};

const SELECT_DPAD: u8 = 0x10;
const SELECT_BUTTONS: u8 = 0x20;

/// JOYP matrix: two active-low select lines choose which half of the
/// button set appears in the low nibble, also active low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joypad {
    select: u8,
    buttons: Buttons,
}

impl Joypad {
    pub fn new() -> Joypad {
        Joypad {
            select: SELECT_DPAD | SELECT_BUTTONS,
            buttons: Buttons::empty(),
        }
    }

    pub fn reset(&mut self) {
        *self = Joypad::new();
    }

    /// Latch the host's button state. Returns true when a newly pressed
    /// button should raise the Joypad interrupt.
    pub fn set_buttons(&mut self, buttons: Buttons) -> bool {
        let buttons = buttons.sanitize();
        let newly_pressed = buttons.difference(self.buttons);
        self.buttons = buttons;
        !newly_pressed.is_empty()
    }

    pub fn write(&mut self, value: u8) {
        self.select = value & (SELECT_DPAD | SELECT_BUTTONS);
    }

    pub fn read(&self) -> u8 {
        let mut low = 0x0F;
        if self.select & SELECT_DPAD == 0 {
            low &= !dpad_nibble(self.buttons);
        }
        if self.select & SELECT_BUTTONS == 0 {
            low &= !button_nibble(self.buttons);
        }
        0xC0 | self.select | low
    }
}

fn dpad_nibble(buttons: Buttons) -> u8 {
    let mut nibble = 0;
    if buttons.contains(Buttons::RIGHT) {
        nibble |= 0x01;
    }
    if buttons.contains(Buttons::LEFT) {
        nibble |= 0x02;
    }
    if buttons.contains(Buttons::UP) {
        nibble |= 0x04;
    }
    if buttons.contains(Buttons::DOWN) {
        nibble |= 0x08;
    }
    nibble
}

fn button_nibble(buttons: Buttons) -> u8 {
    let mut nibble = 0;
    if buttons.contains(Buttons::A) {
        nibble |= 0x01;
    }
    if buttons.contains(Buttons::B) {
        nibble |= 0x02;
    }
    if buttons.contains(Buttons::SELECT) {
        nibble |= 0x04;
    }
    if buttons.contains(Buttons::START) {
        nibble |= 0x08;
    }
    nibble
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_selection_reads_all_released() {
        let mut joypad = Joypad::new();
        joypad.set_buttons(Buttons::A | Buttons::DOWN);
        joypad.write(0x30);
        assert_eq!(joypad.read() & 0x0F, 0x0F);
    }

    #[test]
    fn dpad_row_reads_active_low() {
        let mut joypad = Joypad::new();
        joypad.set_buttons(Buttons::DOWN | Buttons::A);
        joypad.write(0x20); // select d-pad (bit 4 low)
        assert_eq!(joypad.read() & 0x0F, 0x07, "only Down pulls low");
    }

    #[test]
    fn button_row_reads_active_low() {
        let mut joypad = Joypad::new();
        joypad.set_buttons(Buttons::A | Buttons::START);
        joypad.write(0x10); // select buttons (bit 5 low)
        assert_eq!(joypad.read() & 0x0F, 0x06);
    }

    #[test]
    fn new_press_requests_an_interrupt() {
        let mut joypad = Joypad::new();
        assert!(joypad.set_buttons(Buttons::A));
        assert!(!joypad.set_buttons(Buttons::A), "held button is not an edge");
        assert!(joypad.set_buttons(Buttons::A | Buttons::B));
        assert!(!joypad.set_buttons(Buttons::empty()), "release is not an edge");
    }
}
