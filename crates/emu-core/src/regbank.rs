use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegAccess {
    None,
    Read,
    Write,
    ReadWrite,
}

#[derive(Debug, Clone, Copy)]
struct RegisterDef {
    name: &'static str,
    description: &'static str,
    access: RegAccess,
}

/// Self-describing register window for a device register block.
///
/// The block itself is installed on the bus as one I/O range; the bank maps
/// each relative index to a register name for symbolic traces and keeps a
/// shadow byte per register so unimplemented registers still read back what
/// was last written.
pub struct RegisterBank {
    base: u32,
    defs: Vec<Option<RegisterDef>>,
    shadow: Vec<u8>,
}

impl RegisterBank {
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            defs: vec![None; size],
            shadow: vec![0; size],
        }
    }

    pub fn define(
        &mut self,
        index: usize,
        name: &'static str,
        description: &'static str,
        access: RegAccess,
    ) {
        self.defs[index] = Some(RegisterDef {
            name,
            description,
            access,
        });
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn name(&self, index: usize) -> Option<&'static str> {
        self.defs.get(index).copied().flatten().map(|def| def.name)
    }

    pub fn description(&self, index: usize) -> Option<&'static str> {
        self.defs
            .get(index)
            .copied()
            .flatten()
            .map(|def| def.description)
    }

    #[inline]
    pub fn shadow(&self, index: usize) -> u8 {
        self.shadow[index]
    }

    #[inline]
    pub fn set_shadow(&mut self, index: usize, value: u8) {
        self.shadow[index] = value;
    }

    pub fn shadow_bytes(&self) -> &[u8] {
        &self.shadow
    }

    pub fn restore_shadow(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() != self.shadow.len() {
            return false;
        }
        self.shadow.copy_from_slice(bytes);
        true
    }

    /// Record a serviced read. Reads of undefined or write-only registers
    /// fall back to the shadow byte, which keeps them consistent across
    /// save/restore.
    pub fn traced_read(&self, index: usize, value: u8) -> u8 {
        match self.defs.get(index).copied().flatten() {
            Some(def) => {
                log::trace!(
                    "read  {} (${:04X}) -> ${value:02X}",
                    def.name,
                    self.base + index as u32
                );
                if matches!(def.access, RegAccess::Write | RegAccess::None) {
                    log::debug!("read of write-only register {}", def.name);
                }
            }
            None => {
                log::debug!(
                    "read of unimplemented register ${:04X}",
                    self.base + index as u32
                );
            }
        }
        value
    }

    /// Record a serviced write and update the shadow byte.
    pub fn traced_write(&mut self, index: usize, value: u8) {
        self.shadow[index] = value;
        match self.defs.get(index).copied().flatten() {
            Some(def) => {
                log::trace!(
                    "write {} (${:04X}) <- ${value:02X}",
                    def.name,
                    self.base + index as u32
                );
                if matches!(def.access, RegAccess::Read | RegAccess::None) {
                    log::debug!("write to read-only register {}", def.name);
                }
            }
            None => {
                log::debug!(
                    "write to unimplemented register ${:04X} <- ${value:02X}",
                    self.base + index as u32,
                );
            }
        }
    }
}
