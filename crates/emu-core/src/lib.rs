// System-independent emulation plumbing
pub mod api;
pub mod clock;
pub mod input;
pub mod membus;
pub mod regbank;
pub mod savestate;

// Re-exports
pub use api::{EmuContext, Emulator, SystemInfo};
pub use clock::{Clock, ClockListener, ClockState, Tick};
pub use input::Buttons;
pub use membus::{Access, AccessId, Accessor, BusError, BusState, Fetched, MemoryBus, SlotId, Table};
pub use regbank::{RegAccess, RegisterBank};
pub use savestate::SaveStateError;
