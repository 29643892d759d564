//! Tempo and sample-rate snapshot used to convert beats into samples.
//!
//! A `SchedulingContext` is an immutable value. Tempo or sample-rate changes
//! produce a new context which replaces the old one wholesale.

/// Slowest tempo accepted, in BPM.
pub const MIN_TEMPO: f64 = 1.0;
/// Fastest tempo accepted, in BPM.
pub const MAX_TEMPO: f64 = 999.0;
/// Lowest sample rate accepted, in Hz.
pub const MIN_SAMPLE_RATE: f64 = 8_000.0;
/// Highest sample rate accepted, in Hz.
pub const MAX_SAMPLE_RATE: f64 = 768_000.0;

/// Musical meter: `numerator` beats per bar, beat unit `denominator`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub const fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator: if numerator == 0 { 1 } else { numerator },
            denominator: if denominator == 0 { 4 } else { denominator },
        }
    }

    /// Beats per bar (never zero).
    pub fn beats_per_bar(&self) -> u32 {
        self.numerator.max(1) as u32
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

/// Immutable tempo / sample-rate snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulingContext {
    /// Tempo in BPM (already clamped).
    tempo: f64,
    /// Sample rate in Hz (already clamped).
    sample_rate: f64,
    pub time_signature: TimeSignature,
}

impl SchedulingContext {
    /// Build a context, clamping tempo and sample rate into their valid ranges.
    pub fn new(tempo: f64, sample_rate: f64, time_signature: TimeSignature) -> Self {
        Self {
            tempo: clamp_tempo(tempo),
            sample_rate: clamp_sample_rate(sample_rate),
            time_signature,
        }
    }

    /// Same context at a different tempo.
    pub fn with_tempo(self, tempo: f64) -> Self {
        Self::new(tempo, self.sample_rate, self.time_signature)
    }

    /// Same context at a different sample rate.
    pub fn with_sample_rate(self, sample_rate: f64) -> Self {
        Self::new(self.tempo, sample_rate, self.time_signature)
    }

    #[inline]
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// `(60 / tempo) * sample_rate`
    #[inline]
    pub fn samples_per_beat(&self) -> f64 {
        (60.0 / self.tempo) * self.sample_rate
    }

    #[inline]
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.tempo
    }

    /// Convert a beat span into seconds.
    #[inline]
    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * self.seconds_per_beat()
    }

    /// Convert a duration in seconds into beats.
    #[inline]
    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        seconds * self.tempo / 60.0
    }

    /// Convert a beat span into a whole number of samples (negative spans clamp to 0).
    #[inline]
    pub fn beats_to_samples(&self, beats: f64) -> u64 {
        if beats <= 0.0 {
            return 0;
        }
        (beats * self.samples_per_beat()).round() as u64
    }
}

impl Default for SchedulingContext {
    fn default() -> Self {
        Self::new(120.0, 48_000.0, TimeSignature::default())
    }
}

/// Clamp a tempo into `[MIN_TEMPO, MAX_TEMPO]`. NaN maps to the minimum.
pub fn clamp_tempo(tempo: f64) -> f64 {
    clamp_finite(tempo, MIN_TEMPO, MAX_TEMPO)
}

/// Clamp a sample rate into `[MIN_SAMPLE_RATE, MAX_SAMPLE_RATE]`. NaN maps to the minimum.
pub fn clamp_sample_rate(rate: f64) -> f64 {
    clamp_finite(rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE)
}

fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}
