//! Audio region descriptors.

/// Opaque handle to an audio file owned by the host application.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileRef(pub String);

/// A placed audio clip on a track timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioRegion {
    pub file: FileRef,
    pub start_beat: f64,
    pub duration_beats: f64,
}

impl AudioRegion {
    pub fn new(file: impl Into<String>, start_beat: f64, duration_beats: f64) -> Self {
        Self {
            file: FileRef(file.into()),
            start_beat,
            duration_beats: duration_beats.max(0.0),
        }
    }

    #[inline]
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration_beats
    }

    /// Whether any part of the region lies at or after `beat`.
    #[inline]
    pub fn sounds_at_or_after(&self, beat: f64) -> bool {
        self.duration_beats > 0.0 && self.end_beat() > beat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_beat() {
        assert_eq!(AudioRegion::new("a.wav", 4.0, 2.5).end_beat(), 6.5);
    }

    #[test]
    fn negative_duration_clamps_to_empty() {
        let r = AudioRegion::new("a.wav", 4.0, -1.0);
        assert_eq!(r.duration_beats, 0.0);
        assert!(!r.sounds_at_or_after(0.0));
    }

    #[test]
    fn region_before_position_is_silent() {
        let r = AudioRegion::new("a.wav", 0.0, 4.0);
        assert!(r.sounds_at_or_after(3.0));
        assert!(!r.sounds_at_or_after(4.0));
    }
}
