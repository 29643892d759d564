//! Beat-to-host-time anchor.
//!
//! A `TimingReference` pins one beat position to one hardware sample time
//! under a fixed tempo and sample rate. Every future event time is an offset
//! from that anchor, so the anchor must be recaptured whenever tempo, rate or
//! playhead position changes, and periodically during long playback.

use core::time::Duration;

use crate::context::SchedulingContext;

/// Sentinel sample time meaning "dispatch as soon as possible".
pub const IMMEDIATE: u64 = 0;

/// Age after which a reference may no longer extrapolate future times.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(10);

/// Captured beat ↔ sample-time mapping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimingReference {
    /// Hardware sample time at the moment of capture.
    pub capture_host_time: u64,
    /// Wall-clock instant of capture (clock-relative).
    pub created_at: Duration,
    /// Beat position the reference is anchored to.
    pub beat_at_capture: f64,
    pub tempo: f64,
    pub sample_rate: f64,
    /// Age beyond which the reference reports `IMMEDIATE` for every query.
    pub stale_after: Duration,
}

impl TimingReference {
    /// Capture a fresh reference anchored at `beat`.
    pub fn now(
        beat: f64,
        context: &SchedulingContext,
        host_time: u64,
        created_at: Duration,
    ) -> Self {
        Self {
            capture_host_time: host_time,
            created_at,
            beat_at_capture: if beat.is_finite() { beat.max(0.0) } else { 0.0 },
            tempo: context.tempo(),
            sample_rate: context.sample_rate(),
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// Override the staleness threshold.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    #[inline]
    pub fn samples_per_beat(&self) -> f64 {
        (60.0 / self.tempo) * self.sample_rate
    }

    /// Wall-clock age at `now`. Saturates at zero if the clock moved backwards.
    #[inline]
    pub fn age(&self, now: Duration) -> Duration {
        now.saturating_sub(self.created_at)
    }

    #[inline]
    pub fn is_stale(&self, now: Duration) -> bool {
        self.age(now) > self.stale_after
    }

    /// True when `beat` lies strictly before the anchor.
    #[inline]
    pub fn is_in_past(&self, beat: f64) -> bool {
        beat < self.beat_at_capture
    }

    /// Sample offset of `beat` from the anchor, ignoring staleness.
    ///
    /// Beats at or before the anchor clamp to 0, never negative.
    #[inline]
    pub fn sample_offset(&self, beat: f64) -> u64 {
        let delta = beat - self.beat_at_capture;
        if !(delta > 0.0) {
            return 0;
        }
        let samples = (delta * self.samples_per_beat()).round();
        if samples.is_finite() {
            samples as u64
        } else {
            0
        }
    }

    /// Sample offset of `beat`, or `IMMEDIATE` once the reference is stale.
    #[inline]
    pub fn sample_time(&self, beat: f64, now: Duration) -> u64 {
        if self.is_stale(now) {
            return IMMEDIATE;
        }
        self.sample_offset(beat)
    }

    /// Absolute hardware sample time for `beat`.
    ///
    /// Returns `IMMEDIATE` for beats at or before the anchor and for any query
    /// against a stale reference.
    #[inline]
    pub fn host_time(&self, beat: f64, now: Duration) -> u64 {
        match self.sample_time(beat, now) {
            IMMEDIATE => IMMEDIATE,
            offset => self.capture_host_time.saturating_add(offset),
        }
    }

    /// Whether this reference was captured under `context`.
    pub fn matches(&self, context: &SchedulingContext) -> bool {
        self.tempo == context.tempo() && self.sample_rate == context.sample_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TimeSignature;

    fn ctx(tempo: f64) -> SchedulingContext {
        SchedulingContext::new(tempo, 48_000.0, TimeSignature::default())
    }

    #[test]
    fn beat_zero_at_anchor_zero_is_immediate() {
        let r = TimingReference::now(0.0, &ctx(120.0), 1_000, Duration::ZERO);
        assert_eq!(r.sample_time(0.0, Duration::ZERO), 0);
        assert_eq!(r.host_time(0.0, Duration::ZERO), IMMEDIATE);
    }

    #[test]
    fn future_beat_offsets_by_samples_per_beat() {
        let r = TimingReference::now(4.0, &ctx(120.0), 1_000, Duration::ZERO);
        assert_eq!(r.sample_time(5.0, Duration::ZERO), 24_000);
        assert_eq!(r.host_time(5.5, Duration::ZERO), 1_000 + 36_000);
    }

    #[test]
    fn past_beats_clamp_to_zero() {
        let r = TimingReference::now(16.0, &ctx(90.0), 0, Duration::ZERO);
        for beat in [-100.0, 0.0, 3.25, 15.999, 16.0] {
            assert_eq!(r.sample_time(beat, Duration::ZERO), 0, "beat {}", beat);
        }
        assert!(r.is_in_past(15.0));
        assert!(!r.is_in_past(16.0));
    }

    #[test]
    fn stale_reference_returns_immediate() {
        let r = TimingReference::now(0.0, &ctx(120.0), 500, Duration::from_secs(3));
        let fresh = Duration::from_secs(13);
        let stale = Duration::from_millis(13_001);
        assert_eq!(r.sample_time(8.0, fresh), 8 * 24_000);
        assert!(r.is_stale(stale));
        assert_eq!(r.sample_time(8.0, stale), IMMEDIATE);
        assert_eq!(r.host_time(8.0, stale), IMMEDIATE);
    }

    #[test]
    fn clock_running_backwards_is_not_stale() {
        let r = TimingReference::now(0.0, &ctx(120.0), 0, Duration::from_secs(20));
        assert_eq!(r.age(Duration::from_secs(5)), Duration::ZERO);
        assert!(!r.is_stale(Duration::from_secs(5)));
    }

    #[test]
    fn non_finite_beat_anchors_at_zero() {
        let r = TimingReference::now(f64::NAN, &ctx(120.0), 0, Duration::ZERO);
        assert_eq!(r.beat_at_capture, 0.0);
        assert_eq!(r.sample_offset(f64::NAN), 0);
    }

    #[test]
    fn matches_context() {
        let c = ctx(128.0);
        let r = TimingReference::now(0.0, &c, 0, Duration::ZERO);
        assert!(r.matches(&c));
        assert!(!r.matches(&c.with_tempo(129.0)));
    }
}
