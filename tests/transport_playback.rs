//! Whole-stack playback through the offline device, the way the CLI drives it.

use std::sync::{Arc, Mutex};

use bc_audio::AudioDevice;
use bc_engine::EngineConfig;
use bc_ir::{
    Clock, CycleConfig, OutgoingMidi, ScheduledMidiEvent, SchedulingContext, TimeSignature,
    TrackId,
};
use bc_master::{build_offline, parse_config, run_offline, OfflineRig};

const BLOCK: u64 = 256;
const LEAD: TrackId = TrackId(3);

type Seen = Arc<Mutex<Vec<OutgoingMidi>>>;

fn rig(config: EngineConfig, notes: &[(f64, u8)]) -> (OfflineRig, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let out = seen.clone();
    let mut rig = build_offline(
        SchedulingContext::new(120.0, 48_000.0, TimeSignature::default()),
        config,
        BLOCK,
        Box::new(move |event, _| out.lock().unwrap().push(event)),
    );
    rig.session.add_track(LEAD, "Lead").unwrap();
    rig.session.load_midi(notes.iter().flat_map(|&(beat, pitch)| {
        [
            ScheduledMidiEvent::note_on(beat, LEAD, 0, pitch, 100),
            ScheduledMidiEvent::note_off(beat + 0.5, LEAD, 0, pitch),
        ]
    }));
    rig.device.start().unwrap();
    (rig, seen)
}

fn note_ons(seen: &Seen) -> Vec<OutgoingMidi> {
    seen.lock().unwrap().iter().copied().filter(|e| e.is_note_on()).collect()
}

#[test]
fn looped_render_repeats_and_balances_notes() {
    let (mut rig, seen) = rig(EngineConfig::default(), &[(0.0, 60), (1.0, 62), (3.0, 70)]);
    rig.session.set_cycle(CycleConfig::new(0.0, 2.0));
    rig.session.play(0.0);
    run_offline(&mut rig, 96_000);
    rig.session.stop();
    run_offline(&mut rig, BLOCK);

    let pitches: Vec<u8> = note_ons(&seen).iter().map(|e| e.data1).collect();
    assert_eq!(pitches, vec![60, 62, 60, 62]);
    assert_eq!(rig.session.cycle_jumps(), 1);

    let seen = seen.lock().unwrap();
    for pitch in [60, 62] {
        let ons = seen.iter().filter(|e| e.is_note_on() && e.data1 == pitch).count();
        let offs = seen.iter().filter(|e| e.is_note_off() && e.data1 == pitch).count();
        assert!(offs >= ons, "pitch {pitch}: {ons} on, {offs} off");
    }
}

#[test]
fn tempo_change_mid_render_retimes_upcoming_notes() {
    let (mut rig, seen) = rig(EngineConfig::default(), &[(0.0, 60), (2.0, 64)]);
    rig.session.play(0.0);
    run_offline(&mut rig, 24_000);

    let changed_at = rig.device.renderer().clock().host_time();
    let beat = rig.session.position();
    rig.session.set_tempo(60.0);
    run_offline(&mut rig, 96_000);

    let ons = note_ons(&seen);
    assert_eq!(ons.len(), 2);
    let expected = changed_at + ((2.0 - beat) * 48_000.0).round() as u64;
    assert!(ons[1].sample_time.abs_diff(expected) <= 1);
}

#[test]
fn config_file_lookahead_controls_how_early_notes_are_sent() {
    let config = parse_config("(scheduler: (lookahead_ms: 200.0))").unwrap();
    let (mut rig, _) = rig(config, &[(1.0, 67)]);
    rig.session.play(0.0);
    // 0.85 beats in: inside a 200 ms window, outside the default 50 ms one.
    run_offline(&mut rig, 20_480);
    rig.session.scan();

    assert_eq!(rig.session.scheduler().stats().emitted, 1);
    assert_eq!(rig.session.scheduler().active_notes().len(), 1);
}
