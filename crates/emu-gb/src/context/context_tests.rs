use super::*;
use crate::rom::build_test_rom;

fn context_with(cartridge_type: u8, program: &[u8], patches: &[(usize, &[u8])]) -> GbContext {
    let mut raw = build_test_rom(cartridge_type, 2, program);
    for &(addr, bytes) in patches {
        raw[addr..addr + bytes.len()].copy_from_slice(bytes);
    }
    let rom = Arc::new(Rom::parse(&raw).unwrap());
    GbContext::new(rom, Model::Gb).unwrap()
}

fn idle_context() -> GbContext {
    // JR -2 (loop forever)
    context_with(0x00, &[0x18, 0xFE], &[])
}

#[test]
fn frame_leaves_clock_counters_rebased() {
    let mut context = idle_context();
    context.set_sound_samples_per_frame(735);
    for _ in 0..3 {
        assert!(context.run_frame());
        assert_eq!(context.clock.target_ticks(), 0);
        assert_eq!(context.clock.desired_ticks(), 0);
        assert_eq!(context.clock.pending_events(), 0);
    }
}

#[test]
fn serial_writes_are_captured() {
    // LD A,'P'; LDH (SB),A; LD A,$81; LDH (SC),A; JR -2.
    let program = [0x3E, b'P', 0xE0, 0x01, 0x3E, 0x81, 0xE0, 0x02, 0x18, 0xFE];
    let mut context = context_with(0x00, &program, &[]);
    context.set_sound_samples_per_frame(735);
    context.run_frame();
    assert_eq!(context.serial_output(), b"P");
}

#[test]
fn vblank_interrupt_runs_the_handler_every_frame() {
    // Handler at $40: LD HL,$C000; INC (HL); RETI.
    let handler = [0x21, 0x00, 0xC0, 0x34, 0xD9];
    // LD A,$01; LDH (IE),A; EI; loop: HALT; JR loop.
    let program = [0x3E, 0x01, 0xE0, 0xFF, 0xFB, 0x76, 0x18, 0xFD];
    let mut context = context_with(0x00, &program, &[(0x40, &handler)]);
    context.set_sound_samples_per_frame(735);

    context.run_frame();
    assert_eq!(context.read8(0xC000), 1);
    context.run_frame();
    assert_eq!(context.read8(0xC000), 2);
}

#[test]
fn timer_interrupt_fires_at_the_programmed_rate() {
    // Handler at $50: LD HL,$C001; INC (HL); RETI.
    let handler = [0x21, 0x01, 0xC0, 0x34, 0xD9];
    // LD A,$04; LDH (IE),A; LD A,$05; LDH (TAC),A; EI; loop: JR loop.
    let program = [0x3E, 0x04, 0xE0, 0xFF, 0x3E, 0x05, 0xE0, 0x07, 0xFB, 0x18, 0xFE];
    let mut context = context_with(0x00, &program, &[(0x50, &handler)]);
    context.set_sound_samples_per_frame(735);

    context.run_frame();
    // 70224 ticks / (256 steps * 16 ticks) is about 17 overflows.
    let count = context.read8(0xC001);
    assert!(count >= 15, "expected repeated timer interrupts, got {count}");
}

#[test]
fn audio_buffer_is_exactly_the_requested_size() {
    let mut context = idle_context();
    context.set_sound_samples_per_frame(735);
    context.run_frame();
    assert_eq!(context.audio().len(), 735);
}

#[test]
fn illegal_opcode_poisons_the_context() {
    let mut context = context_with(0x00, &[0xD3], &[]);
    context.set_sound_samples_per_frame(735);
    assert!(!context.run_frame());
    assert!(!context.run_frame());
}

#[test]
fn wram_echo_mirrors_writes() {
    let mut context = idle_context();
    context.write8(0xC123, 0x5A);
    assert_eq!(context.read8(0xE123), 0x5A);
    context.write8(0xFD00, 0xA5);
    assert_eq!(context.read8(0xDD00), 0xA5);
}

#[test]
fn save_state_roundtrip_is_canonical() {
    let mut context = idle_context();
    context.set_sound_samples_per_frame(735);
    context.run_frame();

    let state = context.save_state().unwrap();
    let mut fresh = idle_context();
    fresh.set_sound_samples_per_frame(735);
    fresh.load_state(&state).unwrap();
    assert_eq!(fresh.save_state().unwrap(), state);
}

#[test]
fn reloaded_state_replays_identically() {
    let handler = [0x21, 0x00, 0xC0, 0x34, 0xD9];
    let program = [0x3E, 0x01, 0xE0, 0xFF, 0xFB, 0x76, 0x18, 0xFD];
    let mut context = context_with(0x00, &program, &[(0x40, &handler)]);
    context.set_sound_samples_per_frame(735);
    for _ in 0..3 {
        context.run_frame();
    }

    let state = context.save_state().unwrap();
    for _ in 0..3 {
        context.run_frame();
    }
    let video_a = context.video().to_vec();
    let count_a = context.read8(0xC000);

    let mut other = context_with(0x00, &program, &[(0x40, &handler)]);
    other.set_sound_samples_per_frame(735);
    other.load_state(&state).unwrap();
    for _ in 0..3 {
        other.run_frame();
    }
    assert_eq!(other.video().to_vec(), video_a);
    assert_eq!(other.read8(0xC000), count_a);
}

#[test]
fn game_data_roundtrip_for_battery_carts() {
    let mut context = context_with(0x03, &[0x18, 0xFE], &[]);
    let data = context.save_game_data().unwrap();
    assert!(!data.is_empty());

    let mut other = context_with(0x03, &[0x18, 0xFE], &[]);
    other.load_game_data(&data).unwrap();
    assert_eq!(other.save_game_data().unwrap(), data);
}

#[test]
fn joypad_press_raises_the_interrupt_request() {
    let mut context = idle_context();
    context.set_controller(0, Buttons::START);
    assert_ne!(context.interrupts.read_if() & 0x10, 0);
}
