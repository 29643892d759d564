//! Per-track audio playback coordination.
//!
//! Regions are placed in beats; players are fed segments in seconds and
//! sample delays derived from the shared `SchedulingContext`, so audio and
//! MIDI agree on where every beat lands.

use bc_ir::{AudioGraph, AudioRegion, FileRef, NodeKey, TrackId};
use tracing::{debug, error};

use crate::latency::LatencyRegistry;
use crate::metronome::Metronome;
use crate::scheduler::MidiScheduler;
use crate::sink::MidiSink;
use crate::timing::SharedTiming;

/// A slice of an audio file queued on a player.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledSegment {
    pub file: FileRef,
    /// Where in the file playback starts.
    pub file_offset_secs: f64,
    pub duration_secs: f64,
    /// Samples between the player starting and this segment sounding.
    pub delay_samples: u64,
}

/// A per-track buffer player living in the audio graph.
pub trait PlayerNode: Send {
    fn node(&self) -> NodeKey;
    fn stop(&mut self);
    /// Drop everything scheduled.
    fn reset(&mut self);
    fn schedule(&mut self, segment: ScheduledSegment);
    fn scheduled(&self) -> &[ScheduledSegment];
    /// Start hardware playback. Callers go through [`safe_play`].
    fn play(&mut self);
    fn is_playing(&self) -> bool;
}

/// Player that records what it was asked to do. Used offline and in tests.
#[derive(Clone, Debug)]
pub struct SegmentPlayer {
    node: NodeKey,
    segments: Vec<ScheduledSegment>,
    playing: bool,
    play_calls: u32,
}

impl SegmentPlayer {
    pub fn new(node: NodeKey) -> Self {
        Self {
            node,
            segments: Vec::new(),
            playing: false,
            play_calls: 0,
        }
    }

    pub fn play_calls(&self) -> u32 {
        self.play_calls
    }
}

impl PlayerNode for SegmentPlayer {
    fn node(&self) -> NodeKey {
        self.node
    }

    fn stop(&mut self) {
        self.playing = false;
    }

    fn reset(&mut self) {
        self.segments.clear();
    }

    fn schedule(&mut self, segment: ScheduledSegment) {
        self.segments.push(segment);
    }

    fn scheduled(&self) -> &[ScheduledSegment] {
        &self.segments
    }

    fn play(&mut self) {
        self.playing = true;
        self.play_calls += 1;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

/// Start `player` only if the graph is running and the node is attached
/// with a live output connection. Returns whether play was invoked.
pub fn safe_play<P: PlayerNode + ?Sized>(graph: &AudioGraph, player: &mut P) -> bool {
    let node = player.node();
    if !graph.is_running() || !graph.is_attached(node) || !graph.has_output_connection(node) {
        return false;
    }
    player.play();
    true
}

/// One track's player and regions.
pub struct TrackPlayback<P> {
    pub track: TrackId,
    pub player: P,
    pub regions: Vec<AudioRegion>,
}

pub struct PlaybackCoordinator<P: PlayerNode> {
    timing: SharedTiming,
    tracks: Vec<TrackPlayback<P>>,
}

impl<P: PlayerNode> PlaybackCoordinator<P> {
    pub fn new(timing: SharedTiming) -> Self {
        Self {
            timing,
            tracks: Vec::new(),
        }
    }

    /// Add or replace the player for `track`.
    pub fn add_track(&mut self, track: TrackId, player: P) {
        match self.tracks.iter_mut().find(|t| t.track == track) {
            Some(existing) => existing.player = player,
            None => self.tracks.push(TrackPlayback {
                track,
                player,
                regions: Vec::new(),
            }),
        }
    }

    pub fn remove_track(&mut self, track: TrackId) -> Option<P> {
        let index = self.tracks.iter().position(|t| t.track == track)?;
        let mut removed = self.tracks.remove(index);
        removed.player.stop();
        removed.player.reset();
        Some(removed.player)
    }

    /// Replace a track's regions. Returns false for an unknown track.
    pub fn set_regions(&mut self, track: TrackId, regions: Vec<AudioRegion>) -> bool {
        match self.tracks.iter_mut().find(|t| t.track == track) {
            Some(t) => {
                t.regions = regions;
                true
            }
            None => false,
        }
    }

    pub fn track(&self, track: TrackId) -> Option<&TrackPlayback<P>> {
        self.tracks.iter().find(|t| t.track == track)
    }

    pub fn tracks(&self) -> &[TrackPlayback<P>] {
        &self.tracks
    }

    pub fn timing(&self) -> &SharedTiming {
        &self.timing
    }

    pub fn stop_all(&mut self) {
        for t in &mut self.tracks {
            t.player.stop();
            t.player.reset();
        }
    }

    /// Stop, reset and reschedule every track relative to a playhead at
    /// `beat`. Tracks with nothing left to play stay stopped.
    ///
    /// Returns the number of players started.
    pub fn reschedule_tracks_from_beat(
        &mut self,
        beat: f64,
        graph: &AudioGraph,
        latency: &LatencyRegistry,
    ) -> usize {
        let beat = if beat.is_finite() { beat.max(0.0) } else { 0.0 };
        let snapshot = self.timing.snapshot();
        let context = snapshot.context;
        let cycle = snapshot.cycle;
        let loop_end = (cycle.is_active() && beat < cycle.end_beat).then_some(cycle.end_beat);

        let mut started = 0;
        for t in &mut self.tracks {
            t.player.stop();
            t.player.reset();
            let compensation = latency.compensation(t.track);

            for region in &t.regions {
                if !region.sounds_at_or_after(beat) {
                    continue;
                }
                let end = match loop_end {
                    Some(loop_end) => region.end_beat().min(loop_end),
                    None => region.end_beat(),
                };
                let from = region.start_beat.max(beat);
                if end <= from {
                    continue;
                }
                t.player.schedule(ScheduledSegment {
                    file: region.file.clone(),
                    file_offset_secs: context.beats_to_seconds(from - region.start_beat),
                    duration_secs: context.beats_to_seconds(end - from),
                    delay_samples: context.beats_to_samples(from - beat) + compensation,
                });
            }

            if !t.player.scheduled().is_empty() && safe_play(graph, &mut t.player) {
                started += 1;
            }
        }
        debug!(beat, started, tracks = self.tracks.len(), "audio rescheduled");
        started
    }

    /// Loop jump: reschedule audio, seek MIDI and re-sync the click, then
    /// verify all three share one `samples_per_beat`.
    ///
    /// Returns false (after logging) if they diverge.
    pub fn handle_cycle_jump<S: MidiSink>(
        &mut self,
        to_beat: f64,
        scheduler: &mut MidiScheduler<S>,
        metronome: &mut Metronome,
        graph: &AudioGraph,
        latency: &LatencyRegistry,
    ) -> bool {
        self.reschedule_tracks_from_beat(to_beat, graph, latency);
        scheduler.jump_to(to_beat);
        metronome.sync_to_beat(to_beat);

        let expected = self.timing.context().samples_per_beat();
        let midi = scheduler.reference().map(|r| r.samples_per_beat());
        let click = metronome.samples_per_beat();
        let in_sync = [midi, click].iter().flatten().all(|&spb| spb == expected);
        if !in_sync {
            error!(
                expected,
                midi = ?midi,
                click = ?click,
                "samples_per_beat diverged across subsystems on cycle jump"
            );
        }
        in_sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use std::sync::Arc;

    use crate::config::SchedulerConfig;
    use crate::sink::VecSink;
    use bc_ir::{
        CycleConfig, ManualBeat, ManualClock, NodeType, SchedulingContext, TimeSignature,
    };

    struct Rig {
        graph: AudioGraph,
        latency: LatencyRegistry,
        coordinator: PlaybackCoordinator<SegmentPlayer>,
        timing: SharedTiming,
    }

    fn rig(regions: Vec<AudioRegion>) -> Rig {
        let mut graph = AudioGraph::with_output();
        graph.set_running(true);
        let node = graph.add_node(NodeType::Player { track: TrackId(1) }, "Track 1");
        graph.attach(node);
        let out = graph.output();
        graph.connect(node, out);

        let timing =
            SharedTiming::new(SchedulingContext::new(120.0, 48_000.0, TimeSignature::default()));
        let mut coordinator = PlaybackCoordinator::new(timing.clone());
        coordinator.add_track(TrackId(1), SegmentPlayer::new(node));
        coordinator.set_regions(TrackId(1), regions);
        Rig {
            graph,
            latency: LatencyRegistry::new(),
            coordinator,
            timing,
        }
    }

    fn player(rig: &Rig) -> &SegmentPlayer {
        &rig.coordinator.track(TrackId(1)).unwrap().player
    }

    #[test]
    fn region_under_playhead_starts_mid_file() {
        let mut rig = rig(vec![AudioRegion::new("a.wav", 2.0, 4.0)]);
        let started = rig.coordinator.reschedule_tracks_from_beat(3.0, &rig.graph, &rig.latency);
        assert_eq!(started, 1);

        let seg = &player(&rig).scheduled()[0];
        assert_eq!(seg.file_offset_secs, 0.5);
        assert_eq!(seg.duration_secs, 1.5);
        assert_eq!(seg.delay_samples, 0);
        assert!(player(&rig).is_playing());
    }

    #[test]
    fn future_region_is_delayed() {
        let mut rig = rig(vec![AudioRegion::new("a.wav", 4.0, 2.0)]);
        rig.coordinator.reschedule_tracks_from_beat(1.0, &rig.graph, &rig.latency);
        let seg = &player(&rig).scheduled()[0];
        assert_eq!(seg.file_offset_secs, 0.0);
        assert_eq!(seg.delay_samples, 72_000);
        assert_eq!(seg.duration_secs, 1.0);
    }

    #[test]
    fn tempo_changes_seconds_per_beat() {
        let mut rig = rig(vec![AudioRegion::new("a.wav", 0.0, 4.0)]);
        rig.timing.set_context(rig.timing.context().with_tempo(60.0));
        rig.coordinator.reschedule_tracks_from_beat(1.0, &rig.graph, &rig.latency);
        assert_eq!(player(&rig).scheduled()[0].file_offset_secs, 1.0);
    }

    #[test]
    fn finished_regions_leave_track_stopped() {
        let mut rig = rig(vec![AudioRegion::new("a.wav", 0.0, 2.0)]);
        let started = rig.coordinator.reschedule_tracks_from_beat(2.0, &rig.graph, &rig.latency);
        assert_eq!(started, 0);
        assert!(player(&rig).scheduled().is_empty());
        assert!(!player(&rig).is_playing());
        assert_eq!(player(&rig).play_calls(), 0);
    }

    #[test]
    fn latency_compensation_delays_faster_tracks() {
        let mut rig = rig(vec![AudioRegion::new("a.wav", 0.0, 8.0)]);
        rig.latency.set_track(TrackId(1), 64);
        rig.latency.set_track(TrackId(2), 256);
        rig.coordinator.reschedule_tracks_from_beat(0.0, &rig.graph, &rig.latency);
        assert_eq!(player(&rig).scheduled()[0].delay_samples, 192);
    }

    #[test]
    fn loop_end_truncates_segments() {
        let mut rig = rig(vec![
            AudioRegion::new("a.wav", 0.0, 8.0),
            AudioRegion::new("b.wav", 5.0, 1.0),
        ]);
        rig.timing.set_cycle(CycleConfig::new(0.0, 4.0));
        rig.coordinator.reschedule_tracks_from_beat(0.0, &rig.graph, &rig.latency);
        let segs = player(&rig).scheduled();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].duration_secs, 2.0);
    }

    #[test]
    fn reschedule_replaces_previous_segments() {
        let mut rig = rig(vec![AudioRegion::new("a.wav", 0.0, 8.0)]);
        rig.coordinator.reschedule_tracks_from_beat(0.0, &rig.graph, &rig.latency);
        rig.coordinator.reschedule_tracks_from_beat(4.0, &rig.graph, &rig.latency);
        assert_eq!(player(&rig).scheduled().len(), 1);
        assert_eq!(player(&rig).scheduled()[0].file_offset_secs, 2.0);
    }

    #[test]
    fn safe_play_requires_running_graph() {
        let mut rig = rig(vec![AudioRegion::new("a.wav", 0.0, 8.0)]);
        rig.graph.set_running(false);
        assert_eq!(rig.coordinator.reschedule_tracks_from_beat(0.0, &rig.graph, &rig.latency), 0);
        assert!(!player(&rig).is_playing());
    }

    #[test]
    fn safe_play_requires_attached_connected_node() {
        let mut graph = AudioGraph::with_output();
        graph.set_running(true);
        let node = graph.add_node(NodeType::Player { track: TrackId(0) }, "p");
        let mut p = SegmentPlayer::new(node);

        assert!(!safe_play(&graph, &mut p));
        graph.attach(node);
        assert!(!safe_play(&graph, &mut p));
        let out = graph.output();
        graph.connect(node, out);
        assert!(safe_play(&graph, &mut p));

        graph.remove_node(node);
        assert!(!safe_play(&graph, &mut p));
        assert_eq!(p.play_calls(), 1);
    }

    #[test]
    fn remove_track_returns_stopped_player() {
        let mut rig = rig(vec![AudioRegion::new("a.wav", 0.0, 8.0)]);
        rig.coordinator.reschedule_tracks_from_beat(0.0, &rig.graph, &rig.latency);
        let p = rig.coordinator.remove_track(TrackId(1)).unwrap();
        assert!(!p.is_playing());
        assert!(p.scheduled().is_empty());
        assert!(rig.coordinator.track(TrackId(1)).is_none());
    }

    fn cycle_jump_with(metronome_timing: Option<SharedTiming>) -> (bool, MidiScheduler<VecSink>) {
        let mut rig = rig(vec![AudioRegion::new("a.wav", 0.0, 4.0)]);
        let clock = Arc::new(ManualClock::new());
        let mut scheduler = MidiScheduler::new(
            clock.clone(),
            Arc::new(ManualBeat::new(0.0)),
            rig.timing.clone(),
            SchedulerConfig::default(),
            VecSink::new(),
        );
        scheduler.play(0.0);
        let timing = metronome_timing.unwrap_or_else(|| rig.timing.clone());
        let mut metronome = Metronome::new(clock, timing, Duration::from_secs(2));
        let in_sync = rig.coordinator.handle_cycle_jump(
            0.0,
            &mut scheduler,
            &mut metronome,
            &rig.graph,
            &rig.latency,
        );
        assert!(player(&rig).is_playing());
        (in_sync, scheduler)
    }

    #[test]
    fn cycle_jump_agrees_on_shared_timing() {
        let (in_sync, scheduler) = cycle_jump_with(None);
        assert!(in_sync);
        assert_eq!(scheduler.stats().flushes, 1);
    }

    #[test]
    fn cycle_jump_divergence_is_reported_not_fatal() {
        let other =
            SharedTiming::new(SchedulingContext::new(90.0, 48_000.0, TimeSignature::default()));
        let (in_sync, scheduler) = cycle_jump_with(Some(other));
        assert!(!in_sync);
        // MIDI still jumped and kept playing.
        assert!(scheduler.is_playing());
        assert_eq!(scheduler.stats().flushes, 1);
    }
}
