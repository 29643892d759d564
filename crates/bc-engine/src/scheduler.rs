//! Lookahead MIDI scheduler.
//!
//! Walks a beat-sorted event list and, on every scan, releases the events
//! whose beat falls inside a rolling lookahead window to the sink, stamped
//! with absolute host sample times from the current [`TimingReference`].
//!
//! Every discontinuity (stop, seek, tempo or sample-rate change, loop jump)
//! runs the same flush before scheduling resumes:
//!
//! 1. one immediate note-off per active note,
//! 2. one All Notes Off per `(track, channel)` that had active notes,
//! 3. clear the registry,
//! 4. clear the sink's pending events after the current host time,
//! 5. recapture the reference and reposition the cursor,
//! 6. scan.
//!
//! For tempo and rate changes the cursor is rewound over exactly the events
//! step 4 discarded, so each note reaches the sink once no matter how many
//! changes land before it sounds.

use core::time::Duration;
use std::sync::Arc;

use bc_ir::{
    BeatSource, Clock, MidiKind, OutgoingMidi, ScheduledMidiEvent, SchedulingContext,
    TimingReference, TrackId, IMMEDIATE,
};
use heapless::FnvIndexSet;
use tracing::debug;

use crate::active_notes::{ActiveNoteKey, ActiveNoteRegistry, MAX_ACTIVE_NOTES};
use crate::config::SchedulerConfig;
use crate::event_queue::EventQueue;
use crate::sink::MidiSink;
use crate::timing::SharedTiming;

/// Maximum number of registered tracks.
pub const MAX_TRACKS: usize = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

/// Counters kept in place of logging on the emission path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub emitted: u64,
    pub dropped_unknown_track: u64,
    pub dropped_registry_full: u64,
    pub flushes: u64,
    pub regenerations: u64,
}

/// How to place the cursor after a flush.
#[derive(Clone, Copy, Debug)]
enum Reposition {
    /// First event at or after this beat.
    Seek(f64),
    /// Un-emit everything the sink just discarded, judged by the times
    /// this reference stamped.
    Rewind(TimingReference),
}

pub struct MidiScheduler<S: MidiSink> {
    clock: Arc<dyn Clock>,
    beat_source: Arc<dyn BeatSource>,
    timing: SharedTiming,
    config: SchedulerConfig,
    sink: S,
    queue: EventQueue,
    registry: ActiveNoteRegistry,
    tracks: FnvIndexSet<TrackId, MAX_TRACKS>,
    state: TransportState,
    reference: Option<TimingReference>,
    stats: SchedulerStats,
}

impl<S: MidiSink> MidiScheduler<S> {
    pub fn new(
        clock: Arc<dyn Clock>,
        beat_source: Arc<dyn BeatSource>,
        timing: SharedTiming,
        config: SchedulerConfig,
        sink: S,
    ) -> Self {
        Self {
            clock,
            beat_source,
            timing,
            config: config.sanitized(),
            sink,
            queue: EventQueue::new(),
            registry: ActiveNoteRegistry::new(),
            tracks: FnvIndexSet::new(),
            state: TransportState::Stopped,
            reference: None,
            stats: SchedulerStats::default(),
        }
    }

    /// Replace the event list. While playing, the current notes are flushed
    /// and scheduling restarts at the playhead.
    pub fn load_events(&mut self, events: impl IntoIterator<Item = ScheduledMidiEvent>) {
        self.queue.load(events);
        debug!(events = self.queue.len(), "midi events loaded");
        if self.state == TransportState::Playing {
            let beat = self.beat_source.current_beat();
            self.flush_and_resume(beat, Reposition::Seek(beat));
        }
    }

    /// Accept events for `track`. Returns false if the track table is full.
    pub fn register_track(&mut self, track: TrackId) -> bool {
        self.tracks.insert(track).is_ok()
    }

    /// Stop accepting events for `track`, silencing anything it left sounding.
    pub fn remove_track(&mut self, track: TrackId) {
        if !self.tracks.remove(&track) {
            return;
        }
        let mut channels: FnvIndexSet<u8, 16> = FnvIndexSet::new();
        let sink = &mut self.sink;
        self.registry.drain_track(track, |key| {
            sink.send(OutgoingMidi::note_off(key.track, key.channel, key.pitch, IMMEDIATE));
            let _ = channels.insert(key.channel);
        });
        for &channel in channels.iter() {
            self.sink
                .send(OutgoingMidi::all_notes_off(track, channel, IMMEDIATE));
        }
        debug!(track = track.0, "track removed from scheduler");
    }

    pub fn is_track_registered(&self, track: TrackId) -> bool {
        self.tracks.contains(&track)
    }

    /// Start (or restart) playback at `from_beat`.
    pub fn play(&mut self, from_beat: f64) {
        let from_beat = sanitize_beat(from_beat);
        debug!(from_beat, "scheduler play");
        if self.state == TransportState::Playing {
            self.flush_and_resume(from_beat, Reposition::Seek(from_beat));
            return;
        }
        self.registry.clear();
        self.state = TransportState::Playing;
        self.capture(from_beat);
        self.queue.seek_to(from_beat);
        self.scan_from(from_beat);
    }

    /// Stop playback, silencing every active note. Idempotent.
    pub fn stop(&mut self) {
        if self.state == TransportState::Stopped {
            return;
        }
        let released = self.registry.len();
        self.flush();
        self.state = TransportState::Stopped;
        self.reference = None;
        debug!(released, "scheduler stop");
    }

    /// Move the playhead. While stopped this only repositions the cursor.
    pub fn seek(&mut self, to_beat: f64) {
        let to_beat = sanitize_beat(to_beat);
        debug!(to_beat, playing = self.is_playing(), "scheduler seek");
        match self.state {
            TransportState::Stopped => self.queue.seek_to(to_beat),
            TransportState::Playing => self.flush_and_resume(to_beat, Reposition::Seek(to_beat)),
        }
    }

    /// Loop end reached: restart from the loop start.
    pub fn jump_to(&mut self, beat: f64) {
        self.seek(beat);
    }

    pub fn update_tempo(&mut self, tempo: f64) {
        let current = self.timing.context();
        let next = current.with_tempo(tempo);
        if next.tempo() == current.tempo() {
            return;
        }
        debug!(from = current.tempo(), to = next.tempo(), "scheduler tempo change");
        self.apply_context(next);
    }

    pub fn update_sample_rate(&mut self, sample_rate: f64) {
        let current = self.timing.context();
        let next = current.with_sample_rate(sample_rate);
        if next.sample_rate() == current.sample_rate() {
            return;
        }
        debug!(
            from = current.sample_rate(),
            to = next.sample_rate(),
            "scheduler sample rate change"
        );
        self.apply_context(next);
    }

    fn apply_context(&mut self, context: SchedulingContext) {
        self.timing.set_context(context);
        if self.state == TransportState::Playing {
            self.reanchor_after_context_change();
        }
    }

    /// Release every event inside the lookahead window.
    ///
    /// Called periodically by the owner. Never allocates or blocks unless the
    /// sink does.
    pub fn scan(&mut self) {
        if self.state != TransportState::Playing {
            return;
        }
        let beat = self.beat_source.current_beat();
        self.scan_from(beat);
    }

    fn scan_from(&mut self, beat: f64) {
        let beat = sanitize_beat(beat);
        let snapshot = self.timing.snapshot();

        let mut reference = match self.reference {
            Some(r) => r,
            None => return,
        };
        if !reference.matches(&snapshot.context) {
            // Someone else changed the shared context.
            self.reanchor_after_context_change();
            return;
        }

        let now = self.clock.now();
        if reference.age(now) >= self.config.regenerate_interval() {
            self.capture(beat);
            self.stats.regenerations += 1;
            if let Some(fresh) = self.reference {
                reference = fresh;
            }
        }

        let lookahead_beats = snapshot.context.seconds_to_beats(self.config.lookahead_secs());
        let window_end = snapshot.cycle.clamp_window_end(beat + lookahead_beats);
        while let Some(event) = self.queue.next_before(window_end) {
            self.emit(&event, &reference, now);
        }
        self.registry.prune(self.clock.host_time());
    }

    #[inline]
    fn emit(&mut self, event: &ScheduledMidiEvent, reference: &TimingReference, now: Duration) {
        if !self.tracks.contains(&event.track) {
            self.stats.dropped_unknown_track += 1;
            return;
        }
        let host_time = reference.host_time(event.beat, now);
        match event.kind() {
            MidiKind::NoteOn { channel, pitch } => {
                if !self.registry.note_on(ActiveNoteKey::new(event.track, channel, pitch)) {
                    self.stats.dropped_registry_full += 1;
                    return;
                }
            }
            MidiKind::NoteOff { channel, pitch } => {
                self.registry
                    .note_off(ActiveNoteKey::new(event.track, channel, pitch), host_time);
            }
            MidiKind::Other => {}
        }
        self.sink.send(OutgoingMidi::from_event(event, host_time));
        self.stats.emitted += 1;
    }

    fn reanchor_after_context_change(&mut self) {
        let beat = sanitize_beat(self.beat_source.current_beat());
        match self.reference {
            Some(old) => self.flush_and_resume(beat, Reposition::Rewind(old)),
            None => self.flush_and_resume(beat, Reposition::Seek(beat)),
        }
    }

    fn flush_and_resume(&mut self, beat: f64, reposition: Reposition) {
        let boundary = self.flush();
        self.capture(beat);
        match reposition {
            Reposition::Seek(at) => self.queue.seek_to(at),
            Reposition::Rewind(old) => {
                self.queue
                    .rewind_while(|e| committed_host_time(&old, e.beat) > boundary);
            }
        }
        self.scan_from(beat);
    }

    /// Steps 1-4 of the discontinuity protocol. Returns the clear boundary.
    fn flush(&mut self) -> u64 {
        let boundary = self.clock.host_time();
        self.registry.prune(boundary);

        let mut channels: FnvIndexSet<(TrackId, u8), MAX_ACTIVE_NOTES> = FnvIndexSet::new();
        for key in self.registry.keys() {
            self.sink
                .send(OutgoingMidi::note_off(key.track, key.channel, key.pitch, IMMEDIATE));
            let _ = channels.insert((key.track, key.channel));
        }
        for &(track, channel) in channels.iter() {
            self.sink
                .send(OutgoingMidi::all_notes_off(track, channel, IMMEDIATE));
        }
        self.registry.clear();
        self.sink.clear_pending(boundary);
        self.stats.flushes += 1;
        boundary
    }

    fn capture(&mut self, beat: f64) {
        let context = self.timing.context();
        self.reference = Some(
            TimingReference::now(beat, &context, self.clock.host_time(), self.clock.now())
                .with_stale_after(self.config.stale_after()),
        );
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn reference(&self) -> Option<&TimingReference> {
        self.reference.as_ref()
    }

    pub fn active_notes(&self) -> &ActiveNoteRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn timing(&self) -> &SharedTiming {
        &self.timing
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

/// Host time `beat` was emitted with, ignoring staleness.
///
/// Scans regenerate the reference before it can go stale, so this matches
/// what `emit` stamped.
#[inline]
fn committed_host_time(reference: &TimingReference, beat: f64) -> u64 {
    match reference.sample_offset(beat) {
        0 => IMMEDIATE,
        offset => reference.capture_host_time.saturating_add(offset),
    }
}

#[inline]
fn sanitize_beat(beat: f64) -> f64 {
    if beat.is_finite() {
        beat.max(0.0)
    } else {
        0.0
    }
}
