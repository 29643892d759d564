//! Transport behaviour of a full session, driven by a manual clock.

use std::sync::{Arc, Mutex};

use bc_engine::{
    Click, ClickKind, EngineConfig, GraphHealth, MixerControls, PlayerNode, RealizationState,
    VecSink,
};
use bc_ir::{
    AudioRegion, AutomationLane, AutomationPoint, CycleConfig, ManualClock, NodeType,
    OutgoingMidi, ScheduledMidiEvent, SchedulingContext, TimeSignature, TrackId, TrackParam,
    IMMEDIATE,
};
use bc_master::Session;

const RATE: f64 = 48_000.0;
/// 5 ms at 48 kHz, the default scan interval.
const STEP: u64 = 240;
const KEYS: TrackId = TrackId(1);

struct Rig {
    clock: Arc<ManualClock>,
    session: Session<VecSink>,
}

impl Rig {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new());
        let mut session = Session::new(
            clock.clone(),
            SchedulingContext::new(120.0, RATE, TimeSignature::default()),
            EngineConfig::default(),
            VecSink::new(),
        );
        session.add_track(KEYS, "Keys").unwrap();
        Self { clock, session }
    }

    /// Advance in scan-sized steps, scanning and ticking after each.
    fn run(&mut self, seconds: f64) {
        let steps = (seconds * RATE / STEP as f64).round() as u64;
        for _ in 0..steps {
            self.clock.advance_frames(STEP, RATE);
            self.session.scan();
            self.session.smoothing_tick();
        }
    }

    fn run_until(&mut self, mut done: impl FnMut(&Session<VecSink>) -> bool) {
        for _ in 0..10_000 {
            if done(&self.session) {
                return;
            }
            self.clock.advance_frames(STEP, RATE);
            self.session.scan();
        }
        panic!("condition never reached");
    }

    fn events(&mut self) -> Vec<OutgoingMidi> {
        self.session.sink_mut().events().to_vec()
    }
}

fn note(beat: f64, pitch: u8, length: f64) -> [ScheduledMidiEvent; 2] {
    [
        ScheduledMidiEvent::note_on(beat, KEYS, 0, pitch, 100),
        ScheduledMidiEvent::note_off(beat + length, KEYS, 0, pitch),
    ]
}

fn notes(specs: &[(f64, u8, f64)]) -> Vec<ScheduledMidiEvent> {
    specs.iter().flat_map(|&(b, p, l)| note(b, p, l)).collect()
}

#[test]
fn stop_releases_exactly_the_sounding_notes() {
    let mut rig = Rig::new();
    rig.session
        .load_midi(notes(&[(0.0, 60, 0.5), (1.0, 62, 0.5), (2.0, 64, 0.5), (3.0, 65, 0.5)]));
    rig.session.play(0.0);
    rig.run(1.1);

    let before = rig.session.sink_mut().take();
    assert_eq!(before.iter().filter(|e| e.is_note_on()).count(), 3);
    assert_eq!(rig.session.scheduler().active_notes().len(), 1);

    rig.session.stop();
    let after = rig.events();
    let offs: Vec<u8> = after.iter().filter(|e| e.is_note_off()).map(|e| e.data1).collect();
    assert_eq!(offs, vec![64]);
    assert!(after.iter().all(|e| e.sample_time == IMMEDIATE));
    assert_eq!(after.iter().filter(|e| e.is_all_notes_off()).count(), 1);
    assert!(rig.session.scheduler().active_notes().is_empty());
}

#[test]
fn stop_with_nothing_sounding_is_silent_and_idempotent() {
    let mut rig = Rig::new();
    rig.session.stop();
    rig.session.play(0.0);
    rig.session.stop();
    rig.session.stop();
    assert!(rig.events().is_empty());
    assert!(!rig.session.is_playing());
}

#[test]
fn rapid_tempo_changes_at_onset_deliver_note_once() {
    let mut rig = Rig::new();
    rig.session.load_midi(notes(&[(4.0, 60, 0.5)]));
    rig.session.play(0.0);
    // Lookahead has just reached the onset.
    rig.run_until(|s| s.scheduler().sink().note_ons().count() == 1);

    for tempo in [140.0, 150.0, 160.0, 170.0, 100.0] {
        rig.session.set_tempo(tempo);
        rig.session.scan();
    }
    rig.run(1.5);

    let ons = rig.events().iter().filter(|e| e.is_note_on()).count();
    assert_eq!(ons, 1);
    assert_eq!(rig.session.timing().context().tempo(), 100.0);
}

#[test]
fn tempo_change_keeps_playhead_continuous() {
    let mut rig = Rig::new();
    rig.session.play(0.0);
    rig.run(0.5);
    let before = rig.session.position();
    rig.session.set_tempo(60.0);
    assert_eq!(rig.session.position(), before);
    rig.run(1.0);
    assert!((rig.session.position() - (before + 1.0)).abs() < 1e-9);
}

#[test]
fn cycle_jump_repeats_first_iteration() {
    let mut rig = Rig::new();
    rig.session.load_midi(notes(&[
        (0.0, 60, 0.5),
        (1.0, 61, 0.5),
        (2.0, 62, 0.5),
        (3.0, 63, 0.5),
        (5.0, 70, 0.5),
    ]));
    rig.session.set_cycle(CycleConfig::new(0.0, 4.0));
    rig.session.play(0.0);
    rig.run_until(|s| s.cycle_jumps() == 2);

    // Two full passes, then the downbeat of the third.
    let ons: Vec<u8> = rig
        .events()
        .iter()
        .filter(|e| e.is_note_on())
        .map(|e| e.data1)
        .collect();
    assert_eq!(ons, vec![60, 61, 62, 63, 60, 61, 62, 63, 60]);
}

#[test]
fn seek_while_playing_silences_and_resumes() {
    let mut rig = Rig::new();
    rig.session.load_midi(notes(&[(0.0, 60, 8.0), (2.0, 67, 0.5)]));
    rig.session.play(0.0);
    rig.run(0.1);
    rig.session.sink_mut().take();

    rig.session.seek(2.0);
    let events = rig.events();
    assert!(events
        .iter()
        .any(|e| e.is_note_off() && e.data1 == 60 && e.sample_time == IMMEDIATE));
    assert!(events.iter().any(|e| e.is_note_on() && e.data1 == 67));
    assert!((rig.session.position() - 2.0).abs() < 1e-9);
}

#[test]
fn metronome_clicks_follow_playhead() {
    let mut rig = Rig::new();
    let clicks: Arc<Mutex<Vec<Click>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = clicks.clone();
    rig.session.set_click_callback(move |c| sink.lock().unwrap().push(c));
    rig.session.play(0.0);
    rig.run(1.0);

    let clicks = clicks.lock().unwrap();
    let beats: Vec<f64> = clicks.iter().map(|c| c.beat).collect();
    assert_eq!(beats, vec![0.0, 1.0, 2.0]);
    assert_eq!(clicks[0].kind, ClickKind::Accent);
    assert_eq!(clicks[1].host_time, 24_000);
}

#[test]
fn automation_drives_smoothed_volume() {
    let mut rig = Rig::new();
    let outputs = rig.session.smoothing().outputs(KEYS).unwrap();
    let lane = AutomationLane::from_points(vec![
        AutomationPoint::linear(0.0, 0.0),
        AutomationPoint::linear(4.0, 1.0),
    ])
    .unwrap();
    rig.session.set_automation(KEYS, TrackParam::Volume, lane);
    rig.session.set_controls(
        KEYS,
        MixerControls {
            volume: 0.9,
            ..MixerControls::default()
        },
    );

    rig.session.play(0.0);
    assert_eq!(outputs.get(TrackParam::Volume), 0.0);
    rig.run(1.0);
    assert!((outputs.get(TrackParam::Volume) - 0.5).abs() < 0.03);
}

#[test]
fn audio_regions_start_with_playback() {
    let mut rig = Rig::new();
    rig.session
        .set_regions(KEYS, vec![AudioRegion::new("pad.wav", 1.0, 4.0)]);
    rig.session.play(2.0);
    let player = |s: &Session<VecSink>| s.coordinator().track(KEYS).unwrap().player.clone();
    assert_eq!(player(&rig.session).play_calls(), 1);
    assert_eq!(player(&rig.session).scheduled().len(), 1);

    rig.session.stop();
    assert!(!player(&rig.session).is_playing());
}

#[test]
fn removed_plugin_node_is_reconciled() {
    let mut rig = Rig::new();
    rig.session.add_plugin(KEYS, "EQ").unwrap();
    assert_eq!(rig.session.plugins()[0].state(), RealizationState::Realized);
    assert_eq!(rig.session.check_health(), GraphHealth::Healthy);

    let node = rig.session.plugins()[0].node().unwrap();
    rig.session.graph_mut().remove_node(node);
    rig.session.check_health();
    assert_eq!(rig.session.plugins()[0].state(), RealizationState::Uninstalled);
}

#[test]
fn removing_a_track_silences_it() {
    let mut rig = Rig::new();
    rig.session.load_midi(notes(&[(0.0, 60, 8.0)]));
    rig.session.play(0.0);
    rig.session.sink_mut().take();

    rig.session.remove_track(KEYS);
    let events = rig.events();
    assert!(events.iter().any(|e| e.is_note_off() && e.data1 == 60));
    assert!(rig.session.graph().find(NodeType::Player { track: KEYS }).is_none());
    assert!(rig.session.smoothing().outputs(KEYS).is_none());
}
