//! Beat-synced click generator.
//!
//! Clicks fall on whole beats, with an accent on each bar downbeat. Times
//! come from a reference the metronome captures from the shared timing, so
//! after `sync_to_beat` it agrees with the scheduler on `samples_per_beat`.

use core::time::Duration;
use std::sync::Arc;

use bc_ir::{Clock, TimingReference};

use crate::timing::SharedTiming;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClickKind {
    /// Bar downbeat
    Accent,
    Beat,
}

/// One scheduled click.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Click {
    pub beat: f64,
    pub kind: ClickKind,
    /// Absolute host sample time, or `IMMEDIATE`.
    pub host_time: u64,
}

pub type ClickCallback = Box<dyn FnMut(Click) + Send>;

pub struct Metronome {
    clock: Arc<dyn Clock>,
    timing: SharedTiming,
    regenerate_after: Duration,
    enabled: bool,
    reference: Option<TimingReference>,
    next_beat: f64,
    on_click: Option<ClickCallback>,
}

impl Metronome {
    pub fn new(clock: Arc<dyn Clock>, timing: SharedTiming, regenerate_after: Duration) -> Self {
        Self {
            clock,
            timing,
            regenerate_after,
            enabled: true,
            reference: None,
            next_beat: 0.0,
            on_click: None,
        }
    }

    pub fn set_callback(&mut self, f: impl FnMut(Click) + Send + 'static) {
        self.on_click = Some(Box::new(f));
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Re-anchor at `beat` under the current shared context.
    ///
    /// The next click is the first whole beat at or after `beat`.
    pub fn sync_to_beat(&mut self, beat: f64) {
        let beat = if beat.is_finite() { beat.max(0.0) } else { 0.0 };
        self.capture(beat);
        self.next_beat = beat.ceil();
    }

    pub fn stop(&mut self) {
        self.reference = None;
    }

    /// Emit clicks for whole beats before `window_end`.
    pub fn scan(&mut self, beat: f64, window_end: f64) {
        let Some(mut reference) = self.reference else {
            return;
        };
        let now = self.clock.now();
        if !reference.matches(&self.timing.context())
            || reference.age(now) >= self.regenerate_after
        {
            self.capture(beat);
            if let Some(fresh) = self.reference {
                reference = fresh;
            }
        }
        let beats_per_bar = f64::from(self.timing.context().time_signature.beats_per_bar());
        while self.next_beat < window_end {
            let kind = if self.next_beat % beats_per_bar == 0.0 {
                ClickKind::Accent
            } else {
                ClickKind::Beat
            };
            let click = Click {
                beat: self.next_beat,
                kind,
                host_time: reference.host_time(self.next_beat, now),
            };
            if self.enabled {
                if let Some(f) = self.on_click.as_mut() {
                    f(click);
                }
            }
            self.next_beat += 1.0;
        }
    }

    /// `samples_per_beat` of the current reference.
    pub fn samples_per_beat(&self) -> Option<f64> {
        self.reference.map(|r| r.samples_per_beat())
    }

    pub fn reference(&self) -> Option<&TimingReference> {
        self.reference.as_ref()
    }

    fn capture(&mut self, beat: f64) {
        let context = self.timing.context();
        self.reference = Some(TimingReference::now(
            beat,
            &context,
            self.clock.host_time(),
            self.clock.now(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bc_ir::{ManualClock, SchedulingContext, TimeSignature, IMMEDIATE};
    use std::sync::Mutex;

    fn metronome(sig: TimeSignature) -> (Metronome, Arc<Mutex<Vec<Click>>>) {
        let timing = SharedTiming::new(SchedulingContext::new(120.0, 48_000.0, sig));
        let mut m = Metronome::new(Arc::new(ManualClock::new()), timing, Duration::from_secs(2));
        let clicks = Arc::new(Mutex::new(Vec::new()));
        let sink = clicks.clone();
        m.set_callback(move |c| sink.lock().unwrap().push(c));
        (m, clicks)
    }

    #[test]
    fn accents_bar_downbeats() {
        let (mut m, clicks) = metronome(TimeSignature::new(3, 4));
        m.sync_to_beat(0.0);
        m.scan(0.0, 6.0);
        let kinds: Vec<ClickKind> = clicks.lock().unwrap().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ClickKind::Accent,
                ClickKind::Beat,
                ClickKind::Beat,
                ClickKind::Accent,
                ClickKind::Beat,
                ClickKind::Beat
            ]
        );
    }

    #[test]
    fn click_times_follow_reference() {
        let (mut m, clicks) = metronome(TimeSignature::default());
        m.sync_to_beat(0.0);
        m.scan(0.0, 2.5);
        let times: Vec<u64> = clicks.lock().unwrap().iter().map(|c| c.host_time).collect();
        assert_eq!(times, vec![IMMEDIATE, 24_000, 48_000]);
    }

    #[test]
    fn sync_mid_beat_starts_at_next_whole_beat() {
        let (mut m, clicks) = metronome(TimeSignature::default());
        m.sync_to_beat(2.5);
        m.scan(2.5, 4.0);
        let beats: Vec<f64> = clicks.lock().unwrap().iter().map(|c| c.beat).collect();
        assert_eq!(beats, vec![3.0]);
    }

    #[test]
    fn disabled_metronome_stays_silent_but_advances() {
        let (mut m, clicks) = metronome(TimeSignature::default());
        m.set_enabled(false);
        m.sync_to_beat(0.0);
        m.scan(0.0, 2.0);
        m.set_enabled(true);
        m.scan(0.0, 3.0);
        let beats: Vec<f64> = clicks.lock().unwrap().iter().map(|c| c.beat).collect();
        assert_eq!(beats, vec![2.0]);
    }

    #[test]
    fn unsynced_metronome_does_nothing() {
        let (mut m, clicks) = metronome(TimeSignature::default());
        m.scan(0.0, 4.0);
        assert!(clicks.lock().unwrap().is_empty());
        assert_eq!(m.samples_per_beat(), None);
    }
}
