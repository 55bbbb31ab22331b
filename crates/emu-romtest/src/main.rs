//! Drives test ROMs through the context API and reports pass/fail.
//!
//! NES images are judged by the $6000 status-byte protocol the blargg
//! suites use; Game Boy images by the "Passed" verdict they print over
//! the serial port.

use emu_core::api::EmuContext;
use emu_gb::GbContext;
use emu_gb::video::Model;
use emu_nes::NesContext;
use std::env;
use std::fs;
use std::process;
use std::sync::Arc;

const SOUND_SAMPLES_PER_FRAME: usize = 735;

/// $6000 on a blargg NES ROM: status byte, then the protocol magic.
const NES_STATUS_ADDR: u32 = 0x6000;
const NES_MAGIC: [u8; 3] = [0xDE, 0xB0, 0x61];

struct Options {
    rom_path: String,
    frames: usize,
    roundtrip: bool,
    dump_state: bool,
    verbose: bool,
}

fn parse_args() -> Options {
    let mut args = env::args().skip(1);
    let mut rom_path: Option<String> = None;
    let mut frames: Option<usize> = None;
    let mut roundtrip = false;
    let mut dump_state = false;
    let mut verbose = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-f" | "--frames" => {
                let value = args.next().unwrap_or_default();
                frames = Some(parse_usize(&value, "frames"));
            }
            "-r" | "--state-roundtrip" => {
                roundtrip = true;
            }
            "-d" | "--dump-state" => {
                dump_state = true;
            }
            "-v" | "--verbose" => {
                verbose = true;
            }
            _ => {
                if rom_path.is_none() {
                    rom_path = Some(arg);
                } else {
                    eprintln!("Unexpected argument: {arg}");
                    print_usage_and_exit();
                }
            }
        }
    }

    let rom_path = rom_path.unwrap_or_else(|| {
        eprintln!("Missing ROM path.");
        print_usage_and_exit();
    });

    Options {
        rom_path,
        frames: frames.unwrap_or(500),
        roundtrip,
        dump_state,
        verbose,
    }
}

fn parse_usize(value: &str, name: &str) -> usize {
    value.parse::<usize>().unwrap_or_else(|_| {
        eprintln!("Invalid {name}: {value}");
        print_usage_and_exit();
    })
}

fn print_usage_and_exit() -> ! {
    eprintln!("Usage: emu-romtest <rom_path> [options]");
    eprintln!("Options:");
    eprintln!("  -f, --frames <count>     Frames to run (default: 500)");
    eprintln!("  -r, --state-roundtrip    Also verify save/reload determinism");
    eprintln!("  -d, --dump-state         Print run statistics as JSON");
    eprintln!("  -v, --verbose            Print extra diagnostics");
    process::exit(2);
}

fn run_frames(context: &mut dyn EmuContext, frames: usize) -> bool {
    for frame in 0..frames {
        if !context.run_frame() {
            eprintln!("Context faulted on frame {frame}.");
            return false;
        }
    }
    true
}

/// Save, reload into `replica`, then advance both and compare output.
fn roundtrip_matches(
    context: &mut dyn EmuContext,
    replica: &mut dyn EmuContext,
    frames: usize,
) -> bool {
    let state = match context.save_state() {
        Ok(state) => state,
        Err(err) => {
            eprintln!("save_state failed: {err}");
            return false;
        }
    };
    replica.set_sound_samples_per_frame(SOUND_SAMPLES_PER_FRAME);
    if let Err(err) = replica.load_state(&state) {
        eprintln!("load_state failed: {err}");
        return false;
    }
    match replica.save_state() {
        Ok(reserialized) if reserialized == state => {}
        _ => {
            eprintln!("reserialized state is not canonical");
            return false;
        }
    }

    for _ in 0..frames {
        context.run_frame();
        replica.run_frame();
    }
    if context.video() != replica.video() || context.audio() != replica.audio() {
        eprintln!("replica diverged after reload");
        return false;
    }
    true
}

fn dump_stats(opts: &Options, context: &dyn EmuContext) {
    let state_len = context.save_state().map(|state| state.len()).unwrap_or(0);
    println!(
        "{}",
        serde_json::json!({
            "rom": opts.rom_path,
            "frames": opts.frames,
            "state_bytes": state_len,
            "video_pixels": context.video().len(),
            "audio_samples": context.audio().len(),
        })
    );
}

/// NES verdict: $6000 holds 0 on pass (0x80 while still running), the
/// magic bytes confirm the protocol is live, and $6004 carries the text.
fn check_nes(context: &mut NesContext, verbose: bool) -> bool {
    let magic: Vec<u8> = (1..4).map(|i| context.read8(NES_STATUS_ADDR + i)).collect();
    if magic != NES_MAGIC {
        eprintln!("Status protocol never initialized (magic {magic:02X?}).");
        return false;
    }
    let status = context.read8(NES_STATUS_ADDR);
    let mut message = String::new();
    for offset in 4..0x200 {
        let byte = context.read8(NES_STATUS_ADDR + offset);
        if byte == 0 {
            break;
        }
        message.push(byte as char);
    }
    if verbose || status != 0 {
        eprintln!("status={status:02X} message={message:?}");
    }
    status == 0 && message.contains("assed")
}

fn run_nes(bytes: &[u8], opts: &Options) -> bool {
    let build = || {
        emu_nes::Rom::parse(bytes)
            .ok()
            .and_then(|rom| NesContext::new(Arc::new(rom)).ok())
            .unwrap_or_else(|| {
                eprintln!("Failed to build a NES context for this ROM.");
                process::exit(2);
            })
    };
    let mut context = build();
    context.set_sound_samples_per_frame(SOUND_SAMPLES_PER_FRAME);
    if !run_frames(&mut context, opts.frames) {
        return false;
    }
    if opts.roundtrip && !roundtrip_matches(&mut context, &mut build(), 60) {
        return false;
    }
    if opts.dump_state {
        dump_stats(opts, &context);
    }
    check_nes(&mut context, opts.verbose)
}

fn run_gb(bytes: &[u8], opts: &Options) -> bool {
    let build = || {
        emu_gb::Rom::parse(bytes)
            .ok()
            .and_then(|rom| GbContext::new(Arc::new(rom), Model::Gb).ok())
            .unwrap_or_else(|| {
                eprintln!("Failed to build a Game Boy context for this ROM.");
                process::exit(2);
            })
    };
    let mut context = build();
    context.set_sound_samples_per_frame(SOUND_SAMPLES_PER_FRAME);
    if !run_frames(&mut context, opts.frames) {
        return false;
    }
    if opts.roundtrip && !roundtrip_matches(&mut context, &mut build(), 60) {
        return false;
    }
    if opts.dump_state {
        dump_stats(opts, &context);
    }

    let text = String::from_utf8_lossy(context.serial_output()).into_owned();
    if opts.verbose {
        eprintln!("serial output: {text:?}");
    }
    text.contains("Passed")
}

fn main() {
    let opts = parse_args();
    let bytes = fs::read(&opts.rom_path).unwrap_or_else(|err| {
        eprintln!("Failed to read ROM '{}': {err}", opts.rom_path);
        process::exit(2);
    });

    let passed = if bytes.len() >= 4 && &bytes[0..4] == b"NES\x1A" {
        run_nes(&bytes, &opts)
    } else {
        run_gb(&bytes, &opts)
    };

    if passed {
        println!("PASS {}", opts.rom_path);
        process::exit(0);
    }
    println!("FAIL {}", opts.rom_path);
    process::exit(1);
}
