//! Transport position derived from the sample clock.

use std::sync::Arc;

use bc_engine::SharedTiming;
use bc_ir::{BeatSource, Clock};
use parking_lot::Mutex;

#[derive(Clone, Copy, Debug)]
struct Anchor {
    beat: f64,
    host_time: u64,
    samples_per_beat: f64,
    playing: bool,
}

impl Anchor {
    fn beat_at(&self, host_time: u64) -> f64 {
        if !self.playing {
            return self.beat;
        }
        let elapsed = host_time.saturating_sub(self.host_time) as f64;
        self.beat + elapsed / self.samples_per_beat
    }
}

/// Beat position that advances with rendered samples.
///
/// Anchored at a (beat, host time) pair; a tempo or rate change re-anchors
/// at the current position so the playhead never jumps.
pub struct Playhead {
    clock: Arc<dyn Clock>,
    timing: SharedTiming,
    anchor: Mutex<Anchor>,
}

impl Playhead {
    pub fn new(clock: Arc<dyn Clock>, timing: SharedTiming) -> Self {
        let samples_per_beat = timing.context().samples_per_beat();
        Self {
            clock,
            timing,
            anchor: Mutex::new(Anchor {
                beat: 0.0,
                host_time: 0,
                samples_per_beat,
                playing: false,
            }),
        }
    }

    pub fn start(&self, beat: f64) {
        self.set(beat, true);
    }

    /// Freeze at the current position and return it.
    pub fn stop(&self) -> f64 {
        let beat = self.position();
        self.set(beat, false);
        beat
    }

    /// Jump to `beat`, keeping the running state.
    pub fn locate(&self, beat: f64) {
        let playing = self.anchor.lock().playing;
        self.set(beat, playing);
    }

    /// Adopt the shared context's tempo from here on.
    pub fn reanchor(&self) {
        let host_time = self.clock.host_time();
        let mut anchor = self.anchor.lock();
        anchor.beat = anchor.beat_at(host_time);
        anchor.host_time = host_time;
        anchor.samples_per_beat = self.timing.context().samples_per_beat();
    }

    pub fn position(&self) -> f64 {
        self.anchor.lock().beat_at(self.clock.host_time())
    }

    pub fn is_playing(&self) -> bool {
        self.anchor.lock().playing
    }

    fn set(&self, beat: f64, playing: bool) {
        let beat = if beat.is_finite() { beat.max(0.0) } else { 0.0 };
        *self.anchor.lock() = Anchor {
            beat,
            host_time: self.clock.host_time(),
            samples_per_beat: self.timing.context().samples_per_beat(),
            playing,
        };
    }
}

impl BeatSource for Playhead {
    fn current_beat(&self) -> f64 {
        self.position()
    }
}
