//! Loop (cycle) range shared by every playback subsystem.

/// Loop region. Disabled or empty ranges never loop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CycleConfig {
    pub enabled: bool,
    pub start_beat: f64,
    pub end_beat: f64,
}

impl CycleConfig {
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            start_beat: 0.0,
            end_beat: 0.0,
        }
    }

    pub fn new(start_beat: f64, end_beat: f64) -> Self {
        Self {
            enabled: true,
            start_beat: start_beat.max(0.0),
            end_beat,
        }
    }

    /// Enabled with a non-empty range.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.enabled && self.end_beat > self.start_beat
    }

    #[inline]
    pub fn length(&self) -> f64 {
        (self.end_beat - self.start_beat).max(0.0)
    }

    /// Whether playback at `beat` has reached the loop end.
    #[inline]
    pub fn should_jump(&self, beat: f64) -> bool {
        self.is_active() && beat >= self.end_beat
    }

    /// Clamp a scheduling window end to the loop end while cycling.
    #[inline]
    pub fn clamp_window_end(&self, window_end: f64) -> f64 {
        if self.is_active() {
            window_end.min(self.end_beat)
        } else {
            window_end
        }
    }
}
