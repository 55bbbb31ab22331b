use super::*;

fn run_sequencer(audio: &mut Audio, clock: &mut Clock<GbEvent>, steps: u32) {
    for _ in 0..steps {
        let tick = audio.sequence_tick;
        audio.set_desired_ticks(tick);
        audio.on_sequence_event(clock, tick);
    }
}

fn start_square1(audio: &mut Audio, length_bits: u8, freq_high: u8) {
    audio.reg_write(0, 0x12, 0xF0); // full volume, no decay
    audio.reg_write(0, 0x11, length_bits);
    audio.reg_write(0, 0x13, 0x00);
    audio.reg_write(0, 0x14, freq_high);
}

#[test]
fn power_off_clears_the_register_file() {
    let mut audio = Audio::new();
    audio.reg_write(0, 0x11, 0xBF);
    audio.reg_write(0, 0x26, 0x00);
    assert_eq!(audio.reg_read(0, 0x26) & 0x80, 0);
    assert_eq!(audio.reg_read(0, 0x11), READ_MASKS[0x01]);

    // Writes are ignored while powered down.
    audio.reg_write(0, 0x12, 0xF0);
    audio.reg_write(0, 0x26, 0x80);
    assert_eq!(audio.reg_read(0, 0x12), 0x00);
}

#[test]
fn wave_ram_survives_power_cycles() {
    let mut audio = Audio::new();
    audio.reg_write(0, 0x30, 0x12);
    audio.reg_write(0, 0x26, 0x00);
    audio.reg_write(0, 0x26, 0x80);
    assert_eq!(audio.reg_read(0, 0x30), 0x12);
}

#[test]
fn unused_register_bits_read_as_ones() {
    let mut audio = Audio::new();
    audio.reg_write(0, 0x10, 0x00);
    assert_eq!(audio.reg_read(0, 0x10), 0x80);
    audio.reg_write(0, 0x1A, 0x00);
    assert_eq!(audio.reg_read(0, 0x1A), 0x7F);
}

#[test]
fn status_register_tracks_channel_enables() {
    let mut audio = Audio::new();
    let mut clock = Clock::new();
    assert_eq!(audio.reg_read(0, 0x26) & 0x0F, 0);

    start_square1(&mut audio, 0x80, 0x87);
    assert_eq!(audio.reg_read(0, 0x26) & 0x01, 0x01);

    // Length-enabled retrigger with 1 step left expires on the next even
    // sequencer step.
    start_square1(&mut audio, 0x80 | 63, 0xC7);
    run_sequencer(&mut audio, &mut clock, 2);
    assert_eq!(audio.reg_read(audio.sequence_tick, 0x26) & 0x01, 0);
}

#[test]
fn sequencer_envelope_cadence_is_one_in_eight() {
    let mut audio = Audio::new();
    let mut clock = Clock::new();
    audio.reg_write(0, 0x12, 0x81); // volume 8, decrease, period 1
    audio.reg_write(0, 0x14, 0x87); // trigger
    // One full sequencer cycle hits the envelope exactly once (step 7),
    // dropping the volume one notch after its divider expires.
    run_sequencer(&mut audio, &mut clock, 16);
    assert_eq!(audio.square1.envelope.volume(), 7);
}

#[test]
fn nr51_routing_gates_channels_out_of_the_mix() {
    let mut audio = Audio::new();
    start_square1(&mut audio, 0xBF, 0x87);
    // Force the duty line high by advancing to a high phase.
    audio.reg_write(0, 0x25, 0x00);
    assert_eq!(audio.mix(), 0, "nothing routed, nothing heard");

    audio.reg_write(0, 0x25, 0x11);
    let routed = audio.mix();
    let silent = {
        audio.reg_write(0, 0x25, 0x00);
        audio.mix()
    };
    assert_eq!(silent, 0);
    // Whether the duty line is high at this instant is phase dependent,
    // but routing must never make the sample larger than the routed mix.
    assert!(routed >= silent);
}

#[test]
fn fills_exactly_the_requested_samples() {
    let mut audio = Audio::new();
    let mut clock = Clock::new();
    audio.set_sound_samples_per_frame(735);
    audio.begin_frame(&mut clock);
    audio.set_desired_ticks(70224);
    audio.execute();
    audio.end_frame();
    assert_eq!(audio.sound_buffer().len(), 735);
    assert_eq!(audio.buffer_pos, 735);
}

#[test]
fn state_roundtrip_is_canonical() {
    let mut audio = Audio::new();
    let mut clock = Clock::new();
    start_square1(&mut audio, 0x80, 0x87);
    audio.reg_write(0, 0x30, 0xAB);
    run_sequencer(&mut audio, &mut clock, 3);

    let state = audio.save_state();
    let mut other = Audio::new();
    other.restore_state(&state).unwrap();
    assert_eq!(other.save_state(), state);

    let mut bad = state.clone();
    bad.version = 5;
    assert!(other.restore_state(&bad).is_err());
}
