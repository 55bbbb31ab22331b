use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Packed controller state in the bit order both systems latch:
    /// A, B, Select, Start, Up, Down, Left, Right.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Buttons: u8 {
        const A      = 1 << 0;
        const B      = 1 << 1;
        const SELECT = 1 << 2;
        const START  = 1 << 3;
        const UP     = 1 << 4;
        const DOWN   = 1 << 5;
        const LEFT   = 1 << 6;
        const RIGHT  = 1 << 7;
    }
}

impl Buttons {
    /// Mask out combinations real hardware cannot produce. Opposing
    /// D-pad directions cancel each other at the system boundary.
    pub fn sanitize(self) -> Buttons {
        let mut buttons = self;
        if buttons.contains(Buttons::UP | Buttons::DOWN) {
            buttons.remove(Buttons::UP | Buttons::DOWN);
        }
        if buttons.contains(Buttons::LEFT | Buttons::RIGHT) {
            buttons.remove(Buttons::LEFT | Buttons::RIGHT);
        }
        buttons
    }
}
