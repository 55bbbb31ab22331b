mod instructions;

use emu_core::clock::{ClockListener, Tick};
use emu_core::membus::{Accessor, Table};
use emu_core::savestate::{self, SaveStateError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

const STACK_BASE: u16 = 0x0100;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CpuError {
    #[error("Illegal opcode 0x{0:02X}")]
    IllegalOpcode(u8),
}

/// Memory and interrupt lines as the CPU sees them. Monomorphized per bus
/// so the fetch path never goes through a vtable.
pub trait CpuIo {
    fn read(&mut self, acc: &mut Accessor, tick: Tick, addr: u16) -> u8;
    fn write(&mut self, acc: &mut Accessor, tick: Tick, addr: u16, value: u8);
    /// Consume the latched NMI edge, if any.
    fn take_nmi(&mut self) -> bool;
    /// Current level of the (APU | mapper) IRQ line.
    fn irq_line(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub version: u32,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub flag_c: bool,
    pub flag_z: bool,
    pub flag_i: bool,
    pub flag_d: bool,
    pub flag_v: bool,
    pub flag_n: bool,
    pub executed_ticks: Tick,
    pub desired_ticks: Tick,
    pub jammed: bool,
}

pub const CPU_STATE_VERSION: u32 = 1;

/// MOS 6502 interpreter, instruction-stepped against the desired-tick
/// horizon. Flags are kept unpacked and only assembled into a status byte
/// on PHP/PLP/BRK/RTI and interrupt pushes.
pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub flag_c: bool,
    pub flag_z: bool,
    pub flag_i: bool,
    pub flag_d: bool,
    pub flag_v: bool,
    pub flag_n: bool,

    executed_ticks: Tick,
    desired_ticks: Tick,
    master_clock_divider: u32,
    jammed: bool,
    error: Option<CpuError>,

    fetch_acc: Accessor,
    data_acc: Accessor,
    write_acc: Accessor,
}

impl Cpu {
    pub fn new(master_clock_divider: u32) -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0,
            pc: 0,
            flag_c: false,
            flag_z: false,
            flag_i: true,
            flag_d: false,
            flag_v: false,
            flag_n: false,
            executed_ticks: 0,
            desired_ticks: 0,
            master_clock_divider,
            jammed: false,
            error: None,
            fetch_acc: Accessor::new(Table::Read),
            data_acc: Accessor::new(Table::Read),
            write_acc: Accessor::new(Table::Write),
        }
    }

    /// Canonical power-on/reset: PC from the reset vector, stack pointer
    /// decremented by 3, interrupts disabled.
    pub fn reset<B: CpuIo>(&mut self, bus: &mut B) {
        self.sp = self.sp.wrapping_sub(3);
        self.flag_i = true;
        self.jammed = false;
        self.error = None;
        self.pc = self.read16(bus, RESET_VECTOR);
    }

    /// Hard power-on state used when a fresh context comes up.
    pub fn power_on<B: CpuIo>(&mut self, bus: &mut B) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFD;
        self.flag_c = false;
        self.flag_z = false;
        self.flag_i = true;
        self.flag_d = false;
        self.flag_v = false;
        self.flag_n = false;
        self.jammed = false;
        self.error = None;
        self.pc = self.read16(bus, RESET_VECTOR);
    }

    pub fn error(&self) -> Option<CpuError> {
        self.error
    }

    pub fn executed_ticks(&self) -> Tick {
        self.executed_ticks
    }

    /// Run instructions until the horizon is reached. Interrupts are polled
    /// at every instruction boundary: NMI first (edge), then IRQ when the
    /// line is high and I is clear.
    pub fn execute<B: CpuIo>(&mut self, bus: &mut B) {
        if self.jammed {
            self.executed_ticks = self.executed_ticks.max(self.desired_ticks);
            return;
        }
        while self.executed_ticks < self.desired_ticks {
            if bus.take_nmi() {
                self.service_interrupt(bus, NMI_VECTOR);
                continue;
            } else if bus.irq_line() && !self.flag_i {
                self.service_interrupt(bus, IRQ_VECTOR);
                continue;
            }

            let opcode = self.fetch8(bus);
            self.step(bus, opcode);
            if self.jammed {
                self.executed_ticks = self.executed_ticks.max(self.desired_ticks);
                return;
            }
        }
    }

    fn service_interrupt<B: CpuIo>(&mut self, bus: &mut B, vector: u16) {
        self.push16(bus, self.pc);
        self.push8(bus, self.status_byte(false));
        self.flag_i = true;
        self.pc = self.read16(bus, vector);
        self.tick(7);
    }

    // --- tick accounting -------------------------------------------------

    #[inline]
    pub(crate) fn tick(&mut self, cpu_cycles: u32) {
        self.executed_ticks += (cpu_cycles * self.master_clock_divider) as Tick;
    }

    // --- memory helpers --------------------------------------------------

    #[inline]
    pub(crate) fn read8<B: CpuIo>(&mut self, bus: &mut B, addr: u16) -> u8 {
        bus.read(&mut self.data_acc, self.executed_ticks, addr)
    }

    #[inline]
    pub(crate) fn write8<B: CpuIo>(&mut self, bus: &mut B, addr: u16, value: u8) {
        bus.write(&mut self.write_acc, self.executed_ticks, addr, value);
    }

    pub(crate) fn read16<B: CpuIo>(&mut self, bus: &mut B, addr: u16) -> u16 {
        let lo = self.read8(bus, addr) as u16;
        let hi = self.read8(bus, addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// 16-bit read that wraps within the page, the indirect-JMP quirk.
    pub(crate) fn read16_wrapped<B: CpuIo>(&mut self, bus: &mut B, addr: u16) -> u16 {
        let lo = self.read8(bus, addr) as u16;
        let hi_addr = (addr & 0xFF00) | (addr.wrapping_add(1) & 0x00FF);
        let hi = self.read8(bus, hi_addr) as u16;
        (hi << 8) | lo
    }

    #[inline]
    pub(crate) fn fetch8<B: CpuIo>(&mut self, bus: &mut B) -> u8 {
        let byte = bus.read(&mut self.fetch_acc, self.executed_ticks, self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    pub(crate) fn fetch16<B: CpuIo>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch8(bus) as u16;
        let hi = self.fetch8(bus) as u16;
        (hi << 8) | lo
    }

    pub(crate) fn push8<B: CpuIo>(&mut self, bus: &mut B, value: u8) {
        self.write8(bus, STACK_BASE + self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    pub(crate) fn pop8<B: CpuIo>(&mut self, bus: &mut B) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        self.read8(bus, STACK_BASE + self.sp as u16)
    }

    pub(crate) fn push16<B: CpuIo>(&mut self, bus: &mut B, value: u16) {
        self.push8(bus, (value >> 8) as u8);
        self.push8(bus, value as u8);
    }

    pub(crate) fn pop16<B: CpuIo>(&mut self, bus: &mut B) -> u16 {
        let lo = self.pop8(bus) as u16;
        let hi = self.pop8(bus) as u16;
        (hi << 8) | lo
    }

    // --- status byte -----------------------------------------------------

    pub(crate) fn status_byte(&self, break_flag: bool) -> u8 {
        let mut status = 0x20;
        if self.flag_c {
            status |= 0x01;
        }
        if self.flag_z {
            status |= 0x02;
        }
        if self.flag_i {
            status |= 0x04;
        }
        if self.flag_d {
            status |= 0x08;
        }
        if break_flag {
            status |= 0x10;
        }
        if self.flag_v {
            status |= 0x40;
        }
        if self.flag_n {
            status |= 0x80;
        }
        status
    }

    pub(crate) fn set_status_byte(&mut self, status: u8) {
        self.flag_c = status & 0x01 != 0;
        self.flag_z = status & 0x02 != 0;
        self.flag_i = status & 0x04 != 0;
        self.flag_d = status & 0x08 != 0;
        self.flag_v = status & 0x40 != 0;
        self.flag_n = status & 0x80 != 0;
    }

    #[inline]
    pub(crate) fn set_zn(&mut self, value: u8) {
        self.flag_z = value == 0;
        self.flag_n = value & 0x80 != 0;
    }

    pub(crate) fn jam(&mut self, opcode: u8) {
        self.jammed = true;
        self.error = Some(CpuError::IllegalOpcode(opcode));
    }

    // --- serialization ---------------------------------------------------

    pub fn save_state(&self) -> CpuState {
        CpuState {
            version: CPU_STATE_VERSION,
            a: self.a,
            x: self.x,
            y: self.y,
            sp: self.sp,
            pc: self.pc,
            flag_c: self.flag_c,
            flag_z: self.flag_z,
            flag_i: self.flag_i,
            flag_d: self.flag_d,
            flag_v: self.flag_v,
            flag_n: self.flag_n,
            executed_ticks: self.executed_ticks,
            desired_ticks: self.desired_ticks,
            jammed: self.jammed,
        }
    }

    pub fn restore_state(&mut self, state: &CpuState) -> Result<(), SaveStateError> {
        savestate::check_version("cpu", state.version, CPU_STATE_VERSION)?;
        self.a = state.a;
        self.x = state.x;
        self.y = state.y;
        self.sp = state.sp;
        self.pc = state.pc;
        self.flag_c = state.flag_c;
        self.flag_z = state.flag_z;
        self.flag_i = state.flag_i;
        self.flag_d = state.flag_d;
        self.flag_v = state.flag_v;
        self.flag_n = state.flag_n;
        self.executed_ticks = state.executed_ticks;
        self.desired_ticks = state.desired_ticks;
        self.jammed = state.jammed;
        self.error = None;
        Ok(())
    }
}

impl ClockListener for Cpu {
    fn set_desired_ticks(&mut self, ticks: Tick) {
        self.desired_ticks = ticks;
    }

    fn advance_clock(&mut self, ticks: Tick) {
        self.executed_ticks -= ticks;
        self.desired_ticks -= ticks;
    }

    fn reset_clock(&mut self) {
        self.executed_ticks = 0;
        self.desired_ticks = 0;
    }
}

#[cfg(test)]
mod cpu_tests;
