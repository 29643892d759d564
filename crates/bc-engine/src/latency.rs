//! Output and per-track processing latency, in samples.
//!
//! Passed explicitly to whatever needs it; there is no global instance.

use std::collections::HashMap;

use bc_ir::TrackId;

#[derive(Clone, Debug, Default)]
pub struct LatencyRegistry {
    device_output: u64,
    tracks: HashMap<TrackId, u64>,
}

impl LatencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device_output(samples: u64) -> Self {
        Self {
            device_output: samples,
            tracks: HashMap::new(),
        }
    }

    pub fn set_device_output(&mut self, samples: u64) {
        self.device_output = samples;
    }

    /// Hardware output latency reported by the device.
    pub fn device_output(&self) -> u64 {
        self.device_output
    }

    /// Processing latency of a track's insert chain.
    pub fn set_track(&mut self, track: TrackId, samples: u64) {
        self.tracks.insert(track, samples);
    }

    pub fn remove_track(&mut self, track: TrackId) {
        self.tracks.remove(&track);
    }

    /// Unknown tracks report zero.
    pub fn track(&self, track: TrackId) -> u64 {
        self.tracks.get(&track).copied().unwrap_or(0)
    }

    /// Largest track latency.
    pub fn max_track(&self) -> u64 {
        self.tracks.values().copied().max().unwrap_or(0)
    }

    /// Delay to add to `track` so it lines up with the slowest track.
    pub fn compensation(&self, track: TrackId) -> u64 {
        self.max_track().saturating_sub(self.track(track))
    }

    /// Total latency from schedule to speaker for the slowest path.
    pub fn total(&self) -> u64 {
        self.device_output + self.max_track()
    }
}
