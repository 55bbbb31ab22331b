use super::*;
use crate::bus::NesEvent;
use emu_core::clock::Clock;

const DIVIDER: u32 = 12;
const MASTER_HZ: u32 = 21_477_272;

fn fixture() -> (Apu, Clock<NesEvent>, MemoryBus<NesPort>) {
    let apu = Apu::new(DIVIDER, MASTER_HZ);
    let clock = Clock::new();
    let mem = MemoryBus::new(16, 10).unwrap();
    (apu, clock, mem)
}

/// Fire `count` quarter-frame sequencer steps back to back.
fn run_sequencer(apu: &mut Apu, clock: &mut Clock<NesEvent>, mem: &MemoryBus<NesPort>, count: u32) {
    for _ in 0..count {
        let tick = apu.sequence_tick;
        apu.set_desired_ticks(tick);
        apu.on_sequence_event(clock, mem, tick);
    }
}

#[test]
fn length_counter_exhaustion_silences_pulse() {
    let (mut apu, mut clock, mem) = fixture();
    apu.reg_write(&mut clock, &mem, 0, REG_SND_CHN, 0x03);
    apu.reg_write(&mut clock, &mem, 0, 0x00, 0x18); // no loop, constant volume 8
    apu.reg_write(&mut clock, &mem, 0, 0x02, 0x40); // timer above the mute floor
    apu.reg_write(&mut clock, &mem, 0, 0x03, 0x7F); // length index 15 -> 14

    assert!(apu.pulse1.length.active());
    // 14 half-frames = 28 quarter steps in 4-step mode.
    run_sequencer(&mut apu, &mut clock, &mem, 28);
    assert!(!apu.pulse1.length.active());
    assert_eq!(apu.pulse1.output(), 0);

    let status = apu.reg_read(&mem, apu.sequence_tick, REG_SND_CHN);
    assert_eq!(status & 0x01, 0, "status reports the drained counter");
}

#[test]
fn frame_irq_fires_in_4step_mode_and_clears_on_status_read() {
    let (mut apu, mut clock, mem) = fixture();
    assert!(!apu.irq_line());
    run_sequencer(&mut apu, &mut clock, &mem, 4);
    assert!(apu.irq_line());

    let status = apu.reg_read(&mem, apu.sequence_tick, REG_SND_CHN);
    assert_ne!(status & 0x40, 0);
    assert!(!apu.irq_line(), "status read acknowledged the frame IRQ");
}

#[test]
fn irq_inhibit_suppresses_and_clears() {
    let (mut apu, mut clock, mem) = fixture();
    run_sequencer(&mut apu, &mut clock, &mem, 4);
    assert!(apu.irq_line());

    apu.reg_write(&mut clock, &mem, apu.sequence_tick, REG_JOY2, 0x40);
    assert!(!apu.irq_line());
    run_sequencer(&mut apu, &mut clock, &mem, 8);
    assert!(!apu.irq_line());
}

#[test]
fn mode5_write_clocks_immediately_and_skips_irq() {
    let (mut apu, mut clock, mem) = fixture();
    apu.reg_write(&mut clock, &mem, 0, REG_SND_CHN, 0x01);
    apu.reg_write(&mut clock, &mem, 0, 0x00, 0x18);
    apu.reg_write(&mut clock, &mem, 0, 0x02, 0x40);
    apu.reg_write(&mut clock, &mem, 0, 0x03, 0x00); // length 10

    // Entering 5-step mode costs one immediate half-frame clock.
    apu.reg_write(&mut clock, &mem, 0, REG_JOY2, 0x80);
    run_sequencer(&mut apu, &mut clock, &mem, 20);
    assert!(!apu.irq_line(), "5-step mode never raises the frame IRQ");
}

#[test]
fn stale_sequencer_events_are_ignored() {
    let (mut apu, mut clock, mem) = fixture();
    let stale = apu.sequence_tick;
    // Reschedule via $4017, then deliver the old event.
    apu.reg_write(&mut clock, &mem, 100, REG_JOY2, 0x00);
    let step_before = apu.sequence_step;
    apu.set_desired_ticks(stale);
    apu.on_sequence_event(&mut clock, &mem, stale);
    assert_eq!(apu.sequence_step, step_before);
}

#[test]
fn rescheduling_posts_a_new_clock_event() {
    let (mut apu, mut clock, mem) = fixture();
    apu.begin_frame(&mut clock);
    assert_eq!(clock.pending_events(), 1);
    apu.reg_write(&mut clock, &mem, 0, REG_JOY2, 0x00);
    assert_eq!(clock.pending_events(), 2, "stale event remains, new one queued");
}

#[test]
fn writes_exactly_the_requested_samples_per_frame() {
    let (mut apu, mut clock, mem) = fixture();
    apu.set_sound_samples_per_frame(735);
    apu.begin_frame(&mut clock);
    apu.set_desired_ticks(357_366);
    apu.execute(&mem);
    apu.end_frame();
    assert_eq!(apu.sound_buffer().len(), 735);
    assert_eq!(apu.buffer_pos, 735);
}

#[test]
fn audible_pulse_produces_nonzero_samples() {
    let (mut apu, mut clock, mem) = fixture();
    apu.set_sound_samples_per_frame(735);
    apu.reg_write(&mut clock, &mem, 0, REG_SND_CHN, 0x01);
    apu.reg_write(&mut clock, &mem, 0, 0x00, 0x3F); // halt length, constant 15
    apu.reg_write(&mut clock, &mem, 0, 0x02, 0xFF);
    apu.reg_write(&mut clock, &mem, 0, 0x03, 0x08);

    apu.begin_frame(&mut clock);
    apu.set_desired_ticks(357_366);
    apu.execute(&mem);
    apu.end_frame();
    assert!(apu.sound_buffer().iter().any(|&sample| sample != 0));
}

#[test]
fn controller_reads_shift_through_4016() {
    let (mut apu, mut clock, mem) = fixture();
    apu.set_controller(0, Buttons::A | Buttons::START);
    apu.reg_write(&mut clock, &mem, 0, REG_JOY1, 1);
    apu.reg_write(&mut clock, &mem, 0, REG_JOY1, 0);

    let bits: Vec<u8> = (0..8).map(|_| apu.reg_read(&mem, 0, REG_JOY1) & 1).collect();
    assert_eq!(bits, vec![1, 0, 0, 1, 0, 0, 0, 0]);
}

#[test]
fn state_roundtrip_is_canonical() {
    let (mut apu, mut clock, mem) = fixture();
    apu.reg_write(&mut clock, &mem, 0, REG_SND_CHN, 0x0F);
    apu.reg_write(&mut clock, &mem, 0, 0x00, 0x3F);
    apu.reg_write(&mut clock, &mem, 0, 0x03, 0x28);
    run_sequencer(&mut apu, &mut clock, &mem, 3);

    let state = apu.save_state();
    let mut other = Apu::new(DIVIDER, MASTER_HZ);
    other.restore_state(&state).unwrap();
    assert_eq!(other.save_state(), state);

    let mut bad = state.clone();
    bad.version = 3;
    assert!(other.restore_state(&bad).is_err());
}
