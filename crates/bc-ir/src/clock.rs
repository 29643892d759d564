//! Time providers injected into the scheduling components.
//!
//! `Clock` supplies both a monotonic wall-clock (for reference staleness) and
//! the hardware sample time. `BeatSource` is the pull-based "current beat"
//! provider owned by the transport.

use core::time::Duration;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Wall clock plus hardware sample clock.
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary, fixed epoch.
    fn now(&self) -> Duration;
    /// Current hardware sample time.
    fn host_time(&self) -> u64;
}

/// Pull-based playhead position in beats.
pub trait BeatSource: Send + Sync {
    fn current_beat(&self) -> f64;
}

/// Clock advanced by the render callback.
///
/// `host_time` counts frames rendered since construction.
#[derive(Debug)]
pub struct SampleClock {
    epoch: Instant,
    frames: AtomicU64,
}

impl SampleClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            frames: AtomicU64::new(0),
        }
    }

    /// Advance by one rendered block. Render-thread safe.
    #[inline]
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }
}

impl Default for SampleClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SampleClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn host_time(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }
}

/// Deterministic clock for offline rendering and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
    host: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance wall-clock and sample time together by `frames` at `sample_rate`.
    pub fn advance_frames(&self, frames: u64, sample_rate: f64) {
        let nanos = (frames as f64 / sample_rate * 1e9).round() as u64;
        self.nanos.fetch_add(nanos, Ordering::AcqRel);
        self.host.fetch_add(frames, Ordering::AcqRel);
    }

    /// Advance only the wall clock (idle time with no rendering).
    pub fn advance_wall(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }

    fn host_time(&self) -> u64 {
        self.host.load(Ordering::Acquire)
    }
}

/// Beat position set explicitly by its owner.
#[derive(Debug, Default)]
pub struct ManualBeat {
    bits: AtomicU64,
}

impl ManualBeat {
    pub fn new(beat: f64) -> Self {
        Self {
            bits: AtomicU64::new(beat.to_bits()),
        }
    }

    pub fn set(&self, beat: f64) {
        self.bits.store(beat.to_bits(), Ordering::Release);
    }
}

impl BeatSource for ManualBeat {
    fn current_beat(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
