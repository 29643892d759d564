//! beatclock CLI: plays a built-in demo arrangement through the scheduler.
//!
//! Usage:
//!   beatclock                      render offline and print the MIDI stream
//!   beatclock --live               play through the default audio device
//!   beatclock --tempo 128 --bars 4 --loop
//!   beatclock --config engine.ron
//!
//! Set `RUST_LOG=debug` to see transport and scheduler decisions.

use std::env;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bc_audio::AudioDevice;
use bc_engine::{EngineConfig, MidiSink, MixerControls};
use bc_ir::{
    AudioRegion, AutomationLane, AutomationPoint, CurveKind, CycleConfig, OutgoingMidi,
    ScheduledMidiEvent, SchedulingContext, TimeSignature, TrackId, TrackParam, IMMEDIATE,
};
use bc_master::{build_offline, load_config, open_live, run_offline, Session};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "alloc_check")]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

const DRUMS: TrackId = TrackId(10);
const BASS: TrackId = TrackId(1);
const PAD: TrackId = TrackId(2);
const BLOCK: u64 = 256;

struct Options {
    live: bool,
    tempo: f64,
    bars: u32,
    looped: bool,
    config: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = parse_args(env::args().skip(1).collect());
    let config = match &opts.config {
        Some(path) => load_config(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("{e}");
            std::process::exit(1);
        }),
        None => EngineConfig::default(),
    };
    let context = SchedulingContext::new(opts.tempo, 48_000.0, TimeSignature::default());

    if opts.live {
        play_live(&opts, context, config);
    } else {
        render_offline(&opts, context, config);
    }
}

fn parse_args(args: Vec<String>) -> Options {
    let value = |flag: &str| -> Option<&String> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
    };
    let number = |flag: &str, default: f64| -> f64 {
        match value(flag) {
            Some(v) => v.parse().unwrap_or_else(|_| {
                eprintln!("{flag} expects a number, got {v}");
                std::process::exit(1);
            }),
            None => default,
        }
    };
    Options {
        live: args.iter().any(|a| a == "--live"),
        tempo: number("--tempo", 120.0),
        bars: number("--bars", 2.0).max(1.0) as u32,
        looped: args.iter().any(|a| a == "--loop"),
        config: value("--config").cloned(),
    }
}

/// Kick/hat pattern, a bass line, a pad region and a volume swell.
fn build_demo<S: MidiSink>(session: &mut Session<S>, opts: &Options) {
    for (track, name) in [(DRUMS, "Drums"), (BASS, "Bass"), (PAD, "Pad")] {
        session.add_track(track, name);
    }
    let bars = opts.bars;
    let beats = f64::from(bars * 4);

    let mut events = Vec::new();
    for step in 0..bars * 8 {
        let beat = f64::from(step) * 0.5;
        if step % 2 == 0 {
            events.push(ScheduledMidiEvent::note_on(beat, DRUMS, 9, 36, 120));
            events.push(ScheduledMidiEvent::note_off(beat + 0.25, DRUMS, 9, 36));
        }
        events.push(ScheduledMidiEvent::note_on(beat, DRUMS, 9, 42, 70));
        events.push(ScheduledMidiEvent::note_off(beat + 0.125, DRUMS, 9, 42));
    }
    const LINE: [u8; 4] = [36, 36, 43, 41];
    for bar in 0..bars {
        let pitch = LINE[(bar % 4) as usize];
        let beat = f64::from(bar * 4);
        events.push(ScheduledMidiEvent::note_on(beat, BASS, 1, pitch, 100));
        events.push(ScheduledMidiEvent::note_off(beat + 3.5, BASS, 1, pitch));
    }
    session.load_midi(events);

    session.set_regions(PAD, vec![AudioRegion::new("pad.wav", 0.0, beats)]);
    if let Ok(swell) = AutomationLane::from_points(vec![
        AutomationPoint::new(0.0, 0.2, CurveKind::SineQuarter),
        AutomationPoint::linear(beats, 1.0),
    ]) {
        session.set_automation(PAD, TrackParam::Volume, swell);
    }
    session.set_controls(
        BASS,
        MixerControls {
            volume: 0.8,
            pan: -0.2,
            ..MixerControls::default()
        },
    );
    if opts.looped {
        session.set_cycle(CycleConfig::new(0.0, beats));
    }
}

fn describe(event: &OutgoingMidi) -> String {
    let at = if event.sample_time == IMMEDIATE {
        "     now".to_string()
    } else {
        format!("{:>8}", event.sample_time)
    };
    format!(
        "{at}  {:02X} {:3} {:3}  track {}",
        event.status, event.data1, event.data2, event.track.0
    )
}

fn render_offline(opts: &Options, context: SchedulingContext, config: EngineConfig) {
    let dispatched = Arc::new(Mutex::new(Vec::new()));
    let out = dispatched.clone();
    let mut rig = build_offline(
        context,
        config,
        BLOCK,
        Box::new(move |event, offset| {
            if let Ok(mut v) = out.lock() {
                v.push((event, offset));
            }
        }),
    );
    build_demo(&mut rig.session, opts);
    if let Err(e) = rig.device.start() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let passes = if opts.looped { 2 } else { 1 };
    let beats = f64::from(opts.bars * 4) * f64::from(passes);
    let frames = context.beats_to_samples(beats);

    info!(
        bars = opts.bars * passes,
        tempo = context.tempo(),
        frames,
        "rendering offline"
    );
    rig.session.play(0.0);
    run_offline(&mut rig, frames);
    rig.session.stop();
    run_offline(&mut rig, BLOCK);

    if let Ok(events) = dispatched.lock() {
        for (event, _) in events.iter() {
            println!("{}", describe(event));
        }
        println!("{} events dispatched", events.len());
    }
    let stats = rig.session.scheduler().stats();
    info!(
        emitted = stats.emitted,
        flushes = stats.flushes,
        regenerations = stats.regenerations,
        loop_jumps = rig.session.cycle_jumps(),
        ring_overflows = rig.session.scheduler().sink().overflowed(),
        render_drops = rig.device.renderer().dropped(),
        "render finished"
    );
}

fn play_live(opts: &Options, context: SchedulingContext, config: EngineConfig) {
    let rig = open_live(
        context,
        config,
        |session| build_demo(session, opts),
        Box::new(|_, _| {}),
    );
    let rig = rig.unwrap_or_else(|e| {
        eprintln!("Failed to open audio: {e}");
        std::process::exit(1);
    });

    let controller = &rig.controller;
    let end_beat = f64::from(opts.bars * 4);
    controller.play(0.0);
    info!(health = ?controller.health(), "playing");

    while opts.looped || controller.position() < end_beat {
        let beat = controller.position();
        print!("\rBar {:>3} | Beat {:>5.2}", (beat / 4.0) as u32 + 1, beat % 4.0 + 1.0);
        let _ = std::io::stdout().flush();
        std::thread::sleep(Duration::from_millis(20));
    }
    controller.stop();
    println!("\rDone.                    ");
}
