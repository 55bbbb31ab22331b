use super::{Cpu, FLAG_C, FLAG_H, FLAG_N, FLAG_Z, GbIo};

impl Cpu {
    // --- register decode (B C D E H L (HL) A) ----------------------------

    fn reg8<B: GbIo>(&mut self, bus: &mut B, index: u8) -> u8 {
        match index & 7 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => {
                let hl = self.hl();
                self.read8(bus, hl)
            }
            _ => self.a,
        }
    }

    fn set_reg8<B: GbIo>(&mut self, bus: &mut B, index: u8, value: u8) {
        match index & 7 {
            0 => self.b = value,
            1 => self.c = value,
            2 => self.d = value,
            3 => self.e = value,
            4 => self.h = value,
            5 => self.l = value,
            6 => {
                let hl = self.hl();
                self.write8(bus, hl, value);
            }
            _ => self.a = value,
        }
    }

    fn condition(&self, index: u8) -> bool {
        match index & 3 {
            0 => !self.flag(FLAG_Z),
            1 => self.flag(FLAG_Z),
            2 => !self.flag(FLAG_C),
            _ => self.flag(FLAG_C),
        }
    }

    // --- 8-bit arithmetic ------------------------------------------------

    fn alu_add(&mut self, value: u8, carry_in: bool) {
        let carry = (carry_in && self.flag(FLAG_C)) as u16;
        let sum = self.a as u16 + value as u16 + carry;
        let half = (self.a & 0x0F) + (value & 0x0F) + carry as u8;
        self.a = sum as u8;
        self.set_flag(FLAG_Z, self.a == 0);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, half > 0x0F);
        self.set_flag(FLAG_C, sum > 0xFF);
    }

    fn alu_sub(&mut self, value: u8, carry_in: bool, store: bool) {
        let carry = (carry_in && self.flag(FLAG_C)) as u16;
        let diff = (self.a as u16).wrapping_sub(value as u16).wrapping_sub(carry);
        let half = ((self.a & 0x0F) as u16) < (value & 0x0F) as u16 + carry;
        let result = diff as u8;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N, true);
        self.set_flag(FLAG_H, half);
        self.set_flag(FLAG_C, (self.a as u16) < value as u16 + carry);
        if store {
            self.a = result;
        }
    }

    fn alu_dispatch(&mut self, index: u8, value: u8) {
        match index & 7 {
            0 => self.alu_add(value, false),
            1 => self.alu_add(value, true),
            2 => self.alu_sub(value, false, true),
            3 => self.alu_sub(value, true, true),
            4 => {
                self.a &= value;
                self.f = if self.a == 0 { FLAG_Z | FLAG_H } else { FLAG_H };
            }
            5 => {
                self.a ^= value;
                self.f = if self.a == 0 { FLAG_Z } else { 0 };
            }
            6 => {
                self.a |= value;
                self.f = if self.a == 0 { FLAG_Z } else { 0 };
            }
            _ => self.alu_sub(value, false, false),
        }
    }

    fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, value & 0x0F == 0x0F);
        result
    }

    fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N, true);
        self.set_flag(FLAG_H, value & 0x0F == 0);
        result
    }

    fn add_hl(&mut self, value: u16) {
        let hl = self.hl();
        let (sum, carry) = hl.overflowing_add(value);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, (hl & 0x0FFF) + (value & 0x0FFF) > 0x0FFF);
        self.set_flag(FLAG_C, carry);
        self.set_hl(sum);
    }

    /// ADD SP,r8 / LD HL,SP+r8 share these flag rules: carries come from
    /// the unsigned low byte.
    fn sp_offset(&mut self, offset: i8) -> u16 {
        let sp = self.sp;
        let unsigned = offset as u8 as u16;
        self.set_flag(FLAG_Z, false);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, (sp & 0x0F) + (unsigned & 0x0F) > 0x0F);
        self.set_flag(FLAG_C, (sp & 0xFF) + (unsigned & 0xFF) > 0xFF);
        sp.wrapping_add(offset as u16)
    }

    fn daa(&mut self) {
        let mut adjust = 0u8;
        let mut carry = self.flag(FLAG_C);
        if !self.flag(FLAG_N) {
            if self.flag(FLAG_H) || self.a & 0x0F > 0x09 {
                adjust |= 0x06;
            }
            if carry || self.a > 0x99 {
                adjust |= 0x60;
                carry = true;
            }
            self.a = self.a.wrapping_add(adjust);
        } else {
            if self.flag(FLAG_H) {
                adjust |= 0x06;
            }
            if carry {
                adjust |= 0x60;
            }
            self.a = self.a.wrapping_sub(adjust);
        }
        self.set_flag(FLAG_Z, self.a == 0);
        self.set_flag(FLAG_H, false);
        self.set_flag(FLAG_C, carry);
    }

    // --- rotates and shifts ----------------------------------------------

    fn rlc_value(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(1);
        self.f = 0;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_C, value & 0x80 != 0);
        result
    }

    fn rrc_value(&mut self, value: u8) -> u8 {
        let result = value.rotate_right(1);
        self.f = 0;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_C, value & 0x01 != 0);
        result
    }

    fn rl_value(&mut self, value: u8) -> u8 {
        let result = (value << 1) | self.flag(FLAG_C) as u8;
        self.f = 0;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_C, value & 0x80 != 0);
        result
    }

    fn rr_value(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | ((self.flag(FLAG_C) as u8) << 7);
        self.f = 0;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_C, value & 0x01 != 0);
        result
    }

    fn sla_value(&mut self, value: u8) -> u8 {
        let result = value << 1;
        self.f = 0;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_C, value & 0x80 != 0);
        result
    }

    fn sra_value(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | (value & 0x80);
        self.f = 0;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_C, value & 0x01 != 0);
        result
    }

    fn swap_value(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(4);
        self.f = 0;
        self.set_flag(FLAG_Z, result == 0);
        result
    }

    fn srl_value(&mut self, value: u8) -> u8 {
        let result = value >> 1;
        self.f = 0;
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_C, value & 0x01 != 0);
        result
    }

    // --- dispatch --------------------------------------------------------

    pub(crate) fn step<B: GbIo>(&mut self, bus: &mut B, opcode: u8) {
        match opcode {
            // HALT sits in the middle of the LD block.
            0x76 => {
                self.halt();
                self.tick(4);
            }
            // LD r,r'
            0x40..=0x7F => {
                let src = opcode & 7;
                let dst = (opcode >> 3) & 7;
                let value = self.reg8(bus, src);
                self.set_reg8(bus, dst, value);
                self.tick(if src == 6 || dst == 6 { 8 } else { 4 });
            }
            // ALU A,r
            0x80..=0xBF => {
                let src = opcode & 7;
                let value = self.reg8(bus, src);
                self.alu_dispatch((opcode >> 3) & 7, value);
                self.tick(if src == 6 { 8 } else { 4 });
            }
            // ALU A,d8
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let value = self.fetch8(bus);
                self.alu_dispatch((opcode >> 3) & 7, value);
                self.tick(8);
            }

            0x00 => self.tick(4),
            0x10 => {
                // STOP: low-power state switch is not modeled.
                self.fetch8(bus);
                log::debug!("STOP executed at ${:04X}", self.pc.wrapping_sub(2));
                self.tick(4);
            }

            // 16-bit loads
            0x01 => { let v = self.fetch16(bus); self.set_bc(v); self.tick(12); }
            0x11 => { let v = self.fetch16(bus); self.set_de(v); self.tick(12); }
            0x21 => { let v = self.fetch16(bus); self.set_hl(v); self.tick(12); }
            0x31 => { self.sp = self.fetch16(bus); self.tick(12); }
            0x08 => {
                let addr = self.fetch16(bus);
                let sp = self.sp;
                self.write8(bus, addr, sp as u8);
                self.write8(bus, addr.wrapping_add(1), (sp >> 8) as u8);
                self.tick(20);
            }
            0xF9 => { self.sp = self.hl(); self.tick(8); }
            0xF8 => {
                let offset = self.fetch8(bus) as i8;
                let value = self.sp_offset(offset);
                self.set_hl(value);
                self.tick(12);
            }
            0xE8 => {
                let offset = self.fetch8(bus) as i8;
                self.sp = self.sp_offset(offset);
                self.tick(16);
            }

            // Indirect accumulator loads
            0x02 => { let addr = self.bc(); self.write8(bus, addr, self.a); self.tick(8); }
            0x12 => { let addr = self.de(); self.write8(bus, addr, self.a); self.tick(8); }
            0x22 => {
                let addr = self.hl();
                self.write8(bus, addr, self.a);
                self.set_hl(addr.wrapping_add(1));
                self.tick(8);
            }
            0x32 => {
                let addr = self.hl();
                self.write8(bus, addr, self.a);
                self.set_hl(addr.wrapping_sub(1));
                self.tick(8);
            }
            0x0A => { let addr = self.bc(); self.a = self.read8(bus, addr); self.tick(8); }
            0x1A => { let addr = self.de(); self.a = self.read8(bus, addr); self.tick(8); }
            0x2A => {
                let addr = self.hl();
                self.a = self.read8(bus, addr);
                self.set_hl(addr.wrapping_add(1));
                self.tick(8);
            }
            0x3A => {
                let addr = self.hl();
                self.a = self.read8(bus, addr);
                self.set_hl(addr.wrapping_sub(1));
                self.tick(8);
            }

            // 16-bit inc/dec
            0x03 => { let v = self.bc().wrapping_add(1); self.set_bc(v); self.tick(8); }
            0x13 => { let v = self.de().wrapping_add(1); self.set_de(v); self.tick(8); }
            0x23 => { let v = self.hl().wrapping_add(1); self.set_hl(v); self.tick(8); }
            0x33 => { self.sp = self.sp.wrapping_add(1); self.tick(8); }
            0x0B => { let v = self.bc().wrapping_sub(1); self.set_bc(v); self.tick(8); }
            0x1B => { let v = self.de().wrapping_sub(1); self.set_de(v); self.tick(8); }
            0x2B => { let v = self.hl().wrapping_sub(1); self.set_hl(v); self.tick(8); }
            0x3B => { self.sp = self.sp.wrapping_sub(1); self.tick(8); }

            // 8-bit inc/dec
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let index = (opcode >> 3) & 7;
                let value = self.reg8(bus, index);
                let result = self.inc8(value);
                self.set_reg8(bus, index, result);
                self.tick(if index == 6 { 12 } else { 4 });
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let index = (opcode >> 3) & 7;
                let value = self.reg8(bus, index);
                let result = self.dec8(value);
                self.set_reg8(bus, index, result);
                self.tick(if index == 6 { 12 } else { 4 });
            }

            // LD r,d8
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let index = (opcode >> 3) & 7;
                let value = self.fetch8(bus);
                self.set_reg8(bus, index, value);
                self.tick(if index == 6 { 12 } else { 8 });
            }

            // Accumulator rotates clear Z.
            0x07 => { self.a = self.rlc_value(self.a); self.set_flag(FLAG_Z, false); self.tick(4); }
            0x0F => { self.a = self.rrc_value(self.a); self.set_flag(FLAG_Z, false); self.tick(4); }
            0x17 => { self.a = self.rl_value(self.a); self.set_flag(FLAG_Z, false); self.tick(4); }
            0x1F => { self.a = self.rr_value(self.a); self.set_flag(FLAG_Z, false); self.tick(4); }

            0x27 => { self.daa(); self.tick(4); }
            0x2F => {
                self.a = !self.a;
                self.set_flag(FLAG_N, true);
                self.set_flag(FLAG_H, true);
                self.tick(4);
            }
            0x37 => {
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_C, true);
                self.tick(4);
            }
            0x3F => {
                let carry = self.flag(FLAG_C);
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_C, !carry);
                self.tick(4);
            }

            // ADD HL,rr
            0x09 => { let v = self.bc(); self.add_hl(v); self.tick(8); }
            0x19 => { let v = self.de(); self.add_hl(v); self.tick(8); }
            0x29 => { let v = self.hl(); self.add_hl(v); self.tick(8); }
            0x39 => { let v = self.sp; self.add_hl(v); self.tick(8); }

            // Relative jumps
            0x18 => {
                let offset = self.fetch8(bus) as i8;
                self.pc = self.pc.wrapping_add(offset as u16);
                self.tick(12);
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let offset = self.fetch8(bus) as i8;
                if self.condition((opcode >> 3) & 3) {
                    self.pc = self.pc.wrapping_add(offset as u16);
                    self.tick(12);
                } else {
                    self.tick(8);
                }
            }

            // Absolute jumps
            0xC3 => { self.pc = self.fetch16(bus); self.tick(16); }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let target = self.fetch16(bus);
                if self.condition((opcode >> 3) & 3) {
                    self.pc = target;
                    self.tick(16);
                } else {
                    self.tick(12);
                }
            }
            0xE9 => { self.pc = self.hl(); self.tick(4); }

            // Calls and returns
            0xCD => {
                let target = self.fetch16(bus);
                self.push16(bus, self.pc);
                self.pc = target;
                self.tick(24);
            }
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let target = self.fetch16(bus);
                if self.condition((opcode >> 3) & 3) {
                    self.push16(bus, self.pc);
                    self.pc = target;
                    self.tick(24);
                } else {
                    self.tick(12);
                }
            }
            0xC9 => { self.pc = self.pop16(bus); self.tick(16); }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                if self.condition((opcode >> 3) & 3) {
                    self.pc = self.pop16(bus);
                    self.tick(20);
                } else {
                    self.tick(8);
                }
            }
            0xD9 => {
                self.pc = self.pop16(bus);
                self.set_ime();
                self.tick(16);
            }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.push16(bus, self.pc);
                self.pc = (opcode & 0x38) as u16;
                self.tick(16);
            }

            // Stack
            0xC1 => { let v = self.pop16(bus); self.set_bc(v); self.tick(12); }
            0xD1 => { let v = self.pop16(bus); self.set_de(v); self.tick(12); }
            0xE1 => { let v = self.pop16(bus); self.set_hl(v); self.tick(12); }
            0xF1 => { let v = self.pop16(bus); self.set_af(v); self.tick(12); }
            0xC5 => { let v = self.bc(); self.push16(bus, v); self.tick(16); }
            0xD5 => { let v = self.de(); self.push16(bus, v); self.tick(16); }
            0xE5 => { let v = self.hl(); self.push16(bus, v); self.tick(16); }
            0xF5 => { let v = self.af(); self.push16(bus, v); self.tick(16); }

            // High-page accumulator traffic
            0xE0 => {
                let addr = 0xFF00 + self.fetch8(bus) as u16;
                self.write8(bus, addr, self.a);
                self.tick(12);
            }
            0xF0 => {
                let addr = 0xFF00 + self.fetch8(bus) as u16;
                self.a = self.read8(bus, addr);
                self.tick(12);
            }
            0xE2 => {
                let addr = 0xFF00 + self.c as u16;
                self.write8(bus, addr, self.a);
                self.tick(8);
            }
            0xF2 => {
                let addr = 0xFF00 + self.c as u16;
                self.a = self.read8(bus, addr);
                self.tick(8);
            }
            0xEA => {
                let addr = self.fetch16(bus);
                self.write8(bus, addr, self.a);
                self.tick(16);
            }
            0xFA => {
                let addr = self.fetch16(bus);
                self.a = self.read8(bus, addr);
                self.tick(16);
            }

            // Interrupt master switch
            0xF3 => { self.clear_ime(); self.tick(4); }
            0xFB => { self.set_ime_delayed(); self.tick(4); }

            0xCB => self.step_cb(bus),

            // Holes in the LR35902 map wedge the CPU.
            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                self.pc = self.pc.wrapping_sub(1);
                self.jam(opcode);
            }
        }
    }

    fn step_cb<B: GbIo>(&mut self, bus: &mut B) {
        let opcode = self.fetch8(bus);
        let index = opcode & 7;
        let memory = index == 6;

        match opcode {
            0x00..=0x3F => {
                let value = self.reg8(bus, index);
                let result = match (opcode >> 3) & 7 {
                    0 => self.rlc_value(value),
                    1 => self.rrc_value(value),
                    2 => self.rl_value(value),
                    3 => self.rr_value(value),
                    4 => self.sla_value(value),
                    5 => self.sra_value(value),
                    6 => self.swap_value(value),
                    _ => self.srl_value(value),
                };
                self.set_reg8(bus, index, result);
                self.tick(if memory { 16 } else { 8 });
            }
            0x40..=0x7F => {
                let bit = (opcode >> 3) & 7;
                let value = self.reg8(bus, index);
                self.set_flag(FLAG_Z, value & (1 << bit) == 0);
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_H, true);
                self.tick(if memory { 12 } else { 8 });
            }
            0x80..=0xBF => {
                let bit = (opcode >> 3) & 7;
                let value = self.reg8(bus, index) & !(1 << bit);
                self.set_reg8(bus, index, value);
                self.tick(if memory { 16 } else { 8 });
            }
            0xC0..=0xFF => {
                let bit = (opcode >> 3) & 7;
                let value = self.reg8(bus, index) | (1 << bit);
                self.set_reg8(bus, index, value);
                self.tick(if memory { 16 } else { 8 });
            }
        }
    }
}
