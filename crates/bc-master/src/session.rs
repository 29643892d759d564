//! One arrangement's worth of playback state, driven from control threads.

use std::sync::Arc;

use bc_engine::{
    Click, EngineConfig, GraphHealth, HealthMonitor, HealthSignal, LatencyRegistry, Metronome,
    MidiScheduler, MidiSink, MixerControls, PlaybackCoordinator, PlayerNode, PluginSlot,
    RealizationError, RealizationState, SegmentPlayer, SharedTiming, SmoothingEngine,
    TrackOutputs,
};
use bc_ir::{
    AudioGraph, AudioRegion, AutomationLane, AutomationSet, Clock, CycleConfig, NodeKey, NodeType,
    ScheduledMidiEvent, SchedulingContext, TrackId, TrackParam,
};
use tracing::{debug, info};

use crate::playhead::Playhead;

/// Single owner of every scheduling subsystem.
///
/// All subsystems read one `SharedTiming`, and every transport command
/// flushes MIDI before anything is rescheduled.
pub struct Session<S: MidiSink> {
    timing: SharedTiming,
    playhead: Arc<Playhead>,
    scheduler: MidiScheduler<S>,
    coordinator: PlaybackCoordinator<SegmentPlayer>,
    metronome: Metronome,
    smoothing: SmoothingEngine,
    automation: AutomationSet,
    graph: AudioGraph,
    mixer: NodeKey,
    latency: LatencyRegistry,
    plugins: Vec<PluginSlot>,
    health: HealthMonitor,
    config: EngineConfig,
    cycle_jumps: u64,
}

impl<S: MidiSink> Session<S> {
    pub fn new(
        clock: Arc<dyn Clock>,
        context: SchedulingContext,
        config: EngineConfig,
        sink: S,
    ) -> Self {
        let config = config.sanitized();
        let timing = SharedTiming::new(context);
        let playhead = Arc::new(Playhead::new(clock.clone(), timing.clone()));
        let scheduler = MidiScheduler::new(
            clock.clone(),
            playhead.clone(),
            timing.clone(),
            config.scheduler,
            sink,
        );
        let metronome = Metronome::new(
            clock,
            timing.clone(),
            config.scheduler.regenerate_interval(),
        );

        let mut graph = AudioGraph::with_output();
        let mixer = graph.add_node(NodeType::Mixer, "Mixer");
        graph.attach(mixer);
        let output = graph.output();
        graph.connect(mixer, output);
        graph.set_running(true);

        Self {
            coordinator: PlaybackCoordinator::new(timing.clone()),
            timing,
            playhead,
            scheduler,
            metronome,
            smoothing: SmoothingEngine::new(config.smoothing),
            automation: AutomationSet::new(),
            graph,
            mixer,
            latency: LatencyRegistry::new(),
            plugins: Vec::new(),
            health: HealthMonitor::new(config.health),
            config,
            cycle_jumps: 0,
        }
    }

    // --- Arrangement ---

    /// Add a track with a player routed into the mixer.
    ///
    /// Returns its published mixer outputs, or `None` if the scheduler's
    /// track table is full.
    pub fn add_track(&mut self, track: TrackId, name: &str) -> Option<Arc<TrackOutputs>> {
        if self.scheduler.is_track_registered(track) {
            return self.smoothing.outputs(track);
        }
        if !self.scheduler.register_track(track) {
            return None;
        }
        let node = self.graph.add_node(NodeType::Player { track }, name);
        self.graph.attach(node);
        self.graph.connect(node, self.mixer);
        self.coordinator.add_track(track, SegmentPlayer::new(node));
        debug!(track = track.0, name, "track added");
        Some(self.smoothing.add_track(track))
    }

    pub fn remove_track(&mut self, track: TrackId) {
        self.scheduler.remove_track(track);
        if let Some(player) = self.coordinator.remove_track(track) {
            self.graph.remove_node(player.node());
        }
        self.smoothing.remove_track(track);
        self.automation.remove_track(track);
        self.latency.remove_track(track);
        let graph = &mut self.graph;
        self.plugins.retain_mut(|slot| {
            if slot.track() != track {
                return true;
            }
            if slot.state() == RealizationState::Realized {
                let _ = slot.unrealize(graph);
            }
            let _ = slot.uninstall(graph);
            false
        });
        debug!(track = track.0, "track removed");
    }

    pub fn load_midi(&mut self, events: impl IntoIterator<Item = ScheduledMidiEvent>) {
        self.scheduler.load_events(events);
    }

    pub fn set_regions(&mut self, track: TrackId, regions: Vec<AudioRegion>) -> bool {
        if !self.coordinator.set_regions(track, regions) {
            return false;
        }
        if self.is_playing() {
            self.reschedule_audio(self.playhead.position());
        }
        true
    }

    pub fn set_automation(&mut self, track: TrackId, param: TrackParam, lane: AutomationLane) {
        self.automation.insert(track, param, lane);
    }

    pub fn clear_automation(&mut self, track: TrackId, param: TrackParam) {
        self.automation.remove(track, param);
    }

    pub fn set_controls(&mut self, track: TrackId, controls: MixerControls) -> bool {
        self.smoothing.set_controls(track, controls)
    }

    pub fn set_device_latency(&mut self, samples: u64) {
        self.latency.set_device_output(samples);
    }

    pub fn set_track_latency(&mut self, track: TrackId, samples: u64) {
        self.latency.set_track(track, samples);
        if self.is_playing() {
            self.reschedule_audio(self.playhead.position());
        }
    }

    pub fn set_click_callback(&mut self, f: impl FnMut(Click) + Send + 'static) {
        self.metronome.set_callback(f);
    }

    pub fn set_metronome_enabled(&mut self, enabled: bool) {
        self.metronome.set_enabled(enabled);
    }

    // --- Plugins ---

    /// Install an insert plugin on `track` and route it into the mixer.
    pub fn add_plugin(&mut self, track: TrackId, name: &str) -> Result<(), RealizationError> {
        let mut slot = PluginSlot::new(track);
        slot.install(&mut self.graph, name)?;
        if let Err(e) = slot.realize(&mut self.graph, self.mixer) {
            let _ = slot.uninstall(&mut self.graph);
            return Err(e);
        }
        self.plugins.push(slot);
        Ok(())
    }

    /// Tear down every plugin on `track`.
    pub fn remove_plugins(&mut self, track: TrackId) -> Result<usize, RealizationError> {
        let mut removed = 0;
        for slot in self.plugins.iter_mut().filter(|s| s.track() == track) {
            if slot.state() == RealizationState::Realized {
                slot.unrealize(&mut self.graph)?;
            }
            if slot.state() == RealizationState::Installed {
                slot.uninstall(&mut self.graph)?;
            }
            removed += 1;
        }
        self.plugins.retain(|s| s.track() != track);
        Ok(removed)
    }

    /// Re-derive every plugin's state from the graph. Returns how many
    /// were out of sync.
    pub fn reconcile_plugins(&mut self) -> usize {
        let mut changed = 0;
        for slot in &mut self.plugins {
            let cached = slot.state();
            if slot.reconcile(&self.graph) != cached {
                changed += 1;
            }
        }
        changed
    }

    pub fn plugins(&self) -> &[PluginSlot] {
        &self.plugins
    }

    // --- Transport ---

    pub fn play(&mut self, from_beat: f64) {
        let from_beat = if from_beat.is_finite() { from_beat.max(0.0) } else { 0.0 };
        info!(from_beat, "play");
        self.playhead.start(from_beat);
        self.scheduler.play(from_beat);
        self.metronome.sync_to_beat(from_beat);
        self.reschedule_audio(from_beat);
        self.smoothing.reset_smoothing(from_beat, &self.automation);
    }

    /// Stop everything. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let was_playing = self.is_playing();
        self.scheduler.stop();
        self.coordinator.stop_all();
        self.metronome.stop();
        let beat = self.playhead.stop();
        if was_playing {
            info!(beat, "stop");
        }
    }

    pub fn seek(&mut self, to_beat: f64) {
        let to_beat = if to_beat.is_finite() { to_beat.max(0.0) } else { 0.0 };
        debug!(to_beat, "seek");
        self.playhead.locate(to_beat);
        self.scheduler.seek(to_beat);
        if self.is_playing() {
            self.metronome.sync_to_beat(to_beat);
            self.reschedule_audio(to_beat);
            self.smoothing.reset_smoothing(to_beat, &self.automation);
        }
    }

    pub fn set_tempo(&mut self, tempo: f64) {
        let before = self.timing.context();
        self.scheduler.update_tempo(tempo);
        self.after_context_change(before);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        let before = self.timing.context();
        self.scheduler.update_sample_rate(sample_rate);
        self.after_context_change(before);
    }

    pub fn set_cycle(&mut self, cycle: CycleConfig) {
        debug!(
            enabled = cycle.enabled,
            start = cycle.start_beat,
            end = cycle.end_beat,
            "cycle set"
        );
        self.timing.set_cycle(cycle);
    }

    /// MIDI and audio were re-anchored by the scheduler; the playhead and
    /// players follow. The metronome recaptures on its next scan.
    fn after_context_change(&mut self, before: SchedulingContext) {
        if self.timing.context() == before {
            return;
        }
        self.playhead.reanchor();
        if self.is_playing() {
            self.reschedule_audio(self.playhead.position());
        }
    }

    // --- Periodic work ---

    /// One scheduling pass: loop jump if the playhead has reached the
    /// cycle end, otherwise release the lookahead window.
    pub fn scan(&mut self) {
        if !self.is_playing() {
            return;
        }
        let beat = self.playhead.position();
        let cycle = self.timing.cycle();
        if cycle.should_jump(beat) {
            self.cycle_jump(cycle.start_beat);
            return;
        }
        self.scheduler.scan();
        self.scan_metronome(beat);
    }

    /// Evaluate automation at the playhead and advance every smoother.
    pub fn smoothing_tick(&mut self) {
        if self.is_playing() {
            let beat = self.playhead.position();
            self.smoothing.apply_automation(&self.automation, beat);
        }
        self.smoothing.tick();
    }

    /// Graph health check plus plugin reconciliation.
    pub fn check_health(&mut self) -> GraphHealth {
        let health = self.health.run_once(&self.graph).health();
        self.reconcile_plugins();
        health
    }

    fn cycle_jump(&mut self, to_beat: f64) {
        self.playhead.locate(to_beat);
        self.coordinator.handle_cycle_jump(
            to_beat,
            &mut self.scheduler,
            &mut self.metronome,
            &self.graph,
            &self.latency,
        );
        self.smoothing.reset_smoothing(to_beat, &self.automation);
        self.scan_metronome(to_beat);
        self.cycle_jumps += 1;
    }

    fn scan_metronome(&mut self, beat: f64) {
        let snapshot = self.timing.snapshot();
        let lookahead = snapshot
            .context
            .seconds_to_beats(self.scheduler.config().lookahead_secs());
        let window_end = snapshot.cycle.clamp_window_end(beat + lookahead);
        self.metronome.scan(beat, window_end);
    }

    fn reschedule_audio(&mut self, beat: f64) {
        self.coordinator
            .reschedule_tracks_from_beat(beat, &self.graph, &self.latency);
    }

    // --- Accessors ---

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    pub fn position(&self) -> f64 {
        self.playhead.position()
    }

    pub fn playhead(&self) -> &Arc<Playhead> {
        &self.playhead
    }

    pub fn timing(&self) -> &SharedTiming {
        &self.timing
    }

    pub fn scheduler(&self) -> &MidiScheduler<S> {
        &self.scheduler
    }

    pub fn sink_mut(&mut self) -> &mut S {
        self.scheduler.sink_mut()
    }

    pub fn coordinator(&self) -> &PlaybackCoordinator<SegmentPlayer> {
        &self.coordinator
    }

    pub fn metronome(&self) -> &Metronome {
        &self.metronome
    }

    pub fn smoothing(&self) -> &SmoothingEngine {
        &self.smoothing
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    /// Direct graph access, for device resets and tests. Plugin states
    /// catch up on the next `check_health`.
    pub fn graph_mut(&mut self) -> &mut AudioGraph {
        &mut self.graph
    }

    pub fn latency(&self) -> &LatencyRegistry {
        &self.latency
    }

    pub fn health_signal(&self) -> HealthSignal {
        self.health.signal()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cycle_jumps(&self) -> u64 {
        self.cycle_jumps
    }
}
