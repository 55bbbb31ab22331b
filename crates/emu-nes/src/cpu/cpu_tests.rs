use super::{Cpu, CpuError, CpuIo, IRQ_VECTOR, NMI_VECTOR, RESET_VECTOR};
use emu_core::clock::{ClockListener, Tick};
use emu_core::membus::Accessor;

/// Flat 64KB test bus with manually raised interrupt lines.
struct FlatBus {
    mem: Vec<u8>,
    nmi: bool,
    irq: bool,
}

impl FlatBus {
    fn new() -> Self {
        Self {
            mem: vec![0; 0x10000],
            nmi: false,
            irq: false,
        }
    }

    fn with_program(origin: u16, program: &[u8]) -> Self {
        let mut bus = Self::new();
        bus.mem[origin as usize..origin as usize + program.len()].copy_from_slice(program);
        bus.mem[RESET_VECTOR as usize] = origin as u8;
        bus.mem[RESET_VECTOR as usize + 1] = (origin >> 8) as u8;
        bus
    }
}

impl CpuIo for FlatBus {
    fn read(&mut self, _acc: &mut Accessor, _tick: Tick, addr: u16) -> u8 {
        self.mem[addr as usize]
    }

    fn write(&mut self, _acc: &mut Accessor, _tick: Tick, addr: u16, value: u8) {
        self.mem[addr as usize] = value;
    }

    fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi)
    }

    fn irq_line(&self) -> bool {
        self.irq
    }
}

const DIVIDER: u32 = 12;

fn cpu_at(bus: &mut FlatBus) -> Cpu {
    let mut cpu = Cpu::new(DIVIDER);
    cpu.power_on(bus);
    cpu
}

/// Run exactly one instruction and return its cost in CPU cycles.
fn step_cycles(cpu: &mut Cpu, bus: &mut FlatBus) -> u32 {
    let before = cpu.executed_ticks();
    cpu.set_desired_ticks(before + 1);
    cpu.execute(bus);
    (cpu.executed_ticks() - before) as u32 / DIVIDER
}

#[test]
fn power_on_reads_reset_vector() {
    let mut bus = FlatBus::with_program(0x8000, &[0xEA]);
    let cpu = cpu_at(&mut bus);
    assert_eq!(cpu.pc, 0x8000);
    assert_eq!(cpu.sp, 0xFD);
    assert!(cpu.flag_i);
}

#[test]
fn reset_decrements_stack_pointer_by_three() {
    let mut bus = FlatBus::with_program(0x8000, &[0xEA]);
    let mut cpu = cpu_at(&mut bus);
    cpu.sp = 0xF0;
    cpu.reset(&mut bus);
    assert_eq!(cpu.sp, 0xED);
    assert_eq!(cpu.pc, 0x8000);
}

#[test]
fn tick_costs_match_reference_table() {
    // (program bytes, expected CPU cycles for the first instruction)
    let cases: &[(&[u8], u32)] = &[
        (&[0xEA], 2),             // NOP
        (&[0xA9, 0x00], 2),       // LDA #
        (&[0xA5, 0x10], 3),       // LDA zpg
        (&[0xB5, 0x10], 4),       // LDA zpg,X
        (&[0xAD, 0x00, 0x60], 4), // LDA abs
        (&[0xA1, 0x10], 6),       // LDA (zp,X)
        (&[0x85, 0x10], 3),       // STA zpg
        (&[0x8D, 0x00, 0x60], 4), // STA abs
        (&[0x9D, 0x00, 0x60], 5), // STA abs,X always 5
        (&[0x91, 0x10], 6),       // STA (zp),Y always 6
        (&[0xE6, 0x10], 5),       // INC zpg
        (&[0xFE, 0x00, 0x60], 7), // INC abs,X always 7
        (&[0x48], 3),             // PHA
        (&[0x68], 4),             // PLA
        (&[0x20, 0x00, 0x90], 6), // JSR
        (&[0x4C, 0x00, 0x90], 3), // JMP abs
        (&[0x6C, 0x00, 0x60], 5), // JMP (ind)
        (&[0x00], 7),             // BRK
    ];

    for &(program, expected) in cases {
        let mut bus = FlatBus::with_program(0x8000, program);
        let mut cpu = cpu_at(&mut bus);
        assert_eq!(
            step_cycles(&mut cpu, &mut bus),
            expected,
            "wrong cycle count for opcode {:02X}",
            program[0]
        );
    }
}

#[test]
fn indexed_reads_pay_for_page_crossings() {
    // LDA $60F0,X with X=0x20 crosses into $6110.
    let mut bus = FlatBus::with_program(0x8000, &[0xBD, 0xF0, 0x60]);
    let mut cpu = cpu_at(&mut bus);
    cpu.x = 0x20;
    assert_eq!(step_cycles(&mut cpu, &mut bus), 5);

    // Same read without a crossing stays at 4.
    let mut bus = FlatBus::with_program(0x8000, &[0xBD, 0x00, 0x60]);
    let mut cpu = cpu_at(&mut bus);
    cpu.x = 0x20;
    assert_eq!(step_cycles(&mut cpu, &mut bus), 4);
}

#[test]
fn branch_penalties() {
    // Not taken: 2 cycles.
    let mut bus = FlatBus::with_program(0x8000, &[0xD0, 0x02]);
    let mut cpu = cpu_at(&mut bus);
    cpu.flag_z = true;
    assert_eq!(step_cycles(&mut cpu, &mut bus), 2);

    // Taken within the page: 3 cycles.
    let mut bus = FlatBus::with_program(0x8000, &[0xD0, 0x02]);
    let mut cpu = cpu_at(&mut bus);
    cpu.flag_z = false;
    assert_eq!(step_cycles(&mut cpu, &mut bus), 3);
    assert_eq!(cpu.pc, 0x8004);

    // Taken across a page boundary: 4 cycles.
    let mut bus = FlatBus::with_program(0x80FD, &[0xD0, 0x02]);
    let mut cpu = cpu_at(&mut bus);
    cpu.flag_z = false;
    assert_eq!(step_cycles(&mut cpu, &mut bus), 4);
    assert_eq!(cpu.pc, 0x8101);
}

#[test]
fn adc_sets_carry_overflow_and_zero() {
    let mut bus = FlatBus::with_program(0x8000, &[0x69, 0x80, 0x69, 0x80]);
    let mut cpu = cpu_at(&mut bus);
    cpu.a = 0x80;
    step_cycles(&mut cpu, &mut bus);
    // 0x80 + 0x80 = 0x100: zero result, carry out, signed overflow.
    assert_eq!(cpu.a, 0x00);
    assert!(cpu.flag_c);
    assert!(cpu.flag_v);
    assert!(cpu.flag_z);

    // 0x00 + 0x80 + carry = 0x81: negative, no carry.
    step_cycles(&mut cpu, &mut bus);
    assert_eq!(cpu.a, 0x81);
    assert!(!cpu.flag_c);
    assert!(cpu.flag_n);
}

#[test]
fn sbc_is_adc_of_complement() {
    let mut bus = FlatBus::with_program(0x8000, &[0xE9, 0x10]);
    let mut cpu = cpu_at(&mut bus);
    cpu.a = 0x50;
    cpu.flag_c = true;
    step_cycles(&mut cpu, &mut bus);
    assert_eq!(cpu.a, 0x40);
    assert!(cpu.flag_c);
    assert!(!cpu.flag_z);
}

#[test]
fn php_pushes_break_and_unused_bits() {
    let mut bus = FlatBus::with_program(0x8000, &[0x08]);
    let mut cpu = cpu_at(&mut bus);
    cpu.flag_c = true;
    cpu.flag_n = true;
    step_cycles(&mut cpu, &mut bus);
    let pushed = bus.mem[0x01FD];
    assert_eq!(pushed, 0b1011_0101);
}

#[test]
fn plp_ignores_break_bit() {
    let mut bus = FlatBus::with_program(0x8000, &[0x28]);
    let mut cpu = cpu_at(&mut bus);
    bus.mem[0x01FE] = 0xFF;
    cpu.sp = 0xFD;
    step_cycles(&mut cpu, &mut bus);
    assert!(cpu.flag_c && cpu.flag_z && cpu.flag_i && cpu.flag_d && cpu.flag_v && cpu.flag_n);
}

#[test]
fn indirect_jmp_wraps_within_page() {
    let mut bus = FlatBus::with_program(0x8000, &[0x6C, 0xFF, 0x60]);
    bus.mem[0x60FF] = 0x34;
    bus.mem[0x6000] = 0x12; // high byte comes from $6000, not $6100
    let mut cpu = cpu_at(&mut bus);
    step_cycles(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 0x1234);
}

#[test]
fn nmi_is_serviced_before_the_next_instruction() {
    let mut bus = FlatBus::with_program(0x8000, &[0xEA, 0xEA]);
    bus.mem[NMI_VECTOR as usize] = 0x00;
    bus.mem[NMI_VECTOR as usize + 1] = 0x90;
    let mut cpu = cpu_at(&mut bus);

    step_cycles(&mut cpu, &mut bus);
    bus.nmi = true;
    let cycles = step_cycles(&mut cpu, &mut bus);
    assert_eq!(cycles, 7);
    assert_eq!(cpu.pc, 0x9000);
    assert!(cpu.flag_i);
    // Return address points at the interrupted instruction.
    assert_eq!(bus.mem[0x01FD], 0x80);
    assert_eq!(bus.mem[0x01FC], 0x01);
}

#[test]
fn irq_is_gated_by_the_i_flag() {
    let mut bus = FlatBus::with_program(0x8000, &[0xEA, 0xEA, 0xEA]);
    bus.mem[IRQ_VECTOR as usize] = 0x00;
    bus.mem[IRQ_VECTOR as usize + 1] = 0xA0;
    let mut cpu = cpu_at(&mut bus);

    bus.irq = true;
    step_cycles(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 0x8001, "IRQ must not fire while I is set");

    cpu.flag_i = false;
    step_cycles(&mut cpu, &mut bus);
    assert_eq!(cpu.pc & 0xFF00, 0xA000, "IRQ fires once I clears");
}

#[test]
fn jam_opcode_faults_and_halts() {
    let mut bus = FlatBus::with_program(0x8000, &[0x02]);
    let mut cpu = cpu_at(&mut bus);
    cpu.set_desired_ticks(100 * DIVIDER as Tick);
    cpu.execute(&mut bus);
    assert_eq!(cpu.error(), Some(CpuError::IllegalOpcode(0x02)));
    // The CPU reports itself caught up so the frame can complete.
    assert!(cpu.executed_ticks() >= 100 * DIVIDER as Tick);
}

#[test]
fn executes_only_to_the_horizon() {
    let mut bus = FlatBus::with_program(0x8000, &[0xEA; 64]);
    let mut cpu = cpu_at(&mut bus);
    cpu.set_desired_ticks(8 * DIVIDER as Tick);
    cpu.execute(&mut bus);
    // Four 2-cycle NOPs exactly reach the horizon.
    assert_eq!(cpu.executed_ticks(), 8 * DIVIDER as Tick);
    assert_eq!(cpu.pc, 0x8004);
}

#[test]
fn advance_clock_rebases_tick_counters() {
    let mut bus = FlatBus::with_program(0x8000, &[0xEA; 8]);
    let mut cpu = cpu_at(&mut bus);
    cpu.set_desired_ticks(4 * DIVIDER as Tick);
    cpu.execute(&mut bus);
    cpu.advance_clock(4 * DIVIDER as Tick);
    assert_eq!(cpu.executed_ticks(), 0);
}

#[test]
fn state_roundtrip_preserves_registers() {
    let mut bus = FlatBus::with_program(0x8000, &[0xA9, 0x42, 0x48]);
    let mut cpu = cpu_at(&mut bus);
    step_cycles(&mut cpu, &mut bus);
    step_cycles(&mut cpu, &mut bus);

    let state = cpu.save_state();
    let mut other = Cpu::new(DIVIDER);
    other.restore_state(&state).unwrap();
    assert_eq!(other.save_state(), state);
    assert_eq!(other.a, 0x42);
    assert_eq!(other.pc, cpu.pc);

    let mut bad = state.clone();
    bad.version = 99;
    assert!(other.restore_state(&bad).is_err());
}
