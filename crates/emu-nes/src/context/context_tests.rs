use super::*;
use crate::rom::Mirroring;

/// 32K NROM image: `program` at $8000, an NMI handler at $9000 that
/// increments $6000, vectors wired accordingly.
fn build_rom(program: &[u8]) -> Arc<Rom> {
    let mut prg = vec![0u8; 0x8000];
    prg[..program.len()].copy_from_slice(program);

    // NMI handler: INC $6000; RTI
    prg[0x1000..0x1004].copy_from_slice(&[0xEE, 0x00, 0x60, 0x40]);

    // Vectors: NMI = $9000, RESET = $8000, IRQ = $8000.
    prg[0x7FFA] = 0x00;
    prg[0x7FFB] = 0x90;
    prg[0x7FFC] = 0x00;
    prg[0x7FFD] = 0x80;
    prg[0x7FFE] = 0x00;
    prg[0x7FFF] = 0x80;

    Arc::new(Rom::from_parts(prg, vec![0u8; 0x2000], 0, Mirroring::Vertical))
}

fn idle_context() -> NesContext {
    // JMP $8000
    NesContext::new(build_rom(&[0x4C, 0x00, 0x80])).unwrap()
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
fn vblank_nmi_enters_handler_once_per_frame() {
    // LDA #$80; STA $2000; JMP *.
    let program = [0xA9, 0x80, 0x8D, 0x00, 0x20, 0x4C, 0x05, 0x80];
    let mut context = NesContext::new(build_rom(&program)).unwrap();
    context.set_sound_samples_per_frame(735);

    assert!(context.run_frame());
    assert_eq!(context.read8(0x6000), 1);
    assert!(context.run_frame());
    assert_eq!(context.read8(0x6000), 2);
}

#[test]
fn audio_buffer_is_exactly_the_requested_size() {
    let mut context = idle_context();
    context.set_sound_samples_per_frame(735);
    context.run_frame();
    assert_eq!(context.audio().len(), 735);
}

#[test]
fn video_is_cropped_to_224_lines() {
    let context = idle_context();
    assert_eq!(context.display_size(), (256, 224));
    assert_eq!(context.video().len(), 256 * 224);
}

#[test]
fn jam_poisons_the_context() {
    // JAM immediately.
    let mut context = NesContext::new(build_rom(&[0x02])).unwrap();
    context.set_sound_samples_per_frame(735);
    assert!(!context.run_frame());
    assert!(!context.run_frame(), "faulted context stays a no-op");
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
    let program = [0xA9, 0x80, 0x8D, 0x00, 0x20, 0x4C, 0x05, 0x80];
    let mut context = NesContext::new(build_rom(&program)).unwrap();
    context.set_sound_samples_per_frame(735);
    for _ in 0..3 {
        context.run_frame();
    }

    let state = context.save_state().unwrap();
    for _ in 0..3 {
        context.run_frame();
    }
    let video_a = context.video().to_vec();
    let nmi_count_a = context.read8(0x6000);

    let mut other = NesContext::new(build_rom(&program)).unwrap();
    other.set_sound_samples_per_frame(735);
    other.load_state(&state).unwrap();
    for _ in 0..3 {
        other.run_frame();
    }
    assert_eq!(other.video().to_vec(), video_a);
    assert_eq!(other.read8(0x6000), nmi_count_a);
}

#[test]
fn load_state_rejects_corrupt_streams() {
    let mut context = idle_context();
    let mut state = context.save_state().unwrap();
    state.truncate(state.len() / 2);
    assert!(context.load_state(&state).is_err());
}

#[test]
fn game_data_roundtrip_preserves_save_ram() {
    let mut context = idle_context();
    context.write8(0x6123, 0xAB);
    let data = context.save_game_data().unwrap();

    let mut other = idle_context();
    other.load_game_data(&data).unwrap();
    assert_eq!(other.read8(0x6123), 0xAB);
}
