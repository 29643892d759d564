//! Engine tuning knobs.
//!
//! The lookahead window and smoothing time constant are defaults, not
//! protocol constants. Values outside their useful range are clamped on
//! `sanitized()`.

use core::time::Duration;

use serde::Deserialize;
use tracing::warn;

/// Lookahead scheduler settings.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Forward span released to the sink on each scan.
    pub lookahead_ms: f64,
    /// Period between scans.
    pub scan_interval_ms: f64,
    /// Maximum reference age before a drift-bounding recapture.
    pub regenerate_interval_secs: f64,
    /// Age after which a reference only yields "immediate".
    pub stale_after_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 50.0,
            scan_interval_ms: 5.0,
            regenerate_interval_secs: 2.0,
            stale_after_secs: 10.0,
        }
    }
}

impl SchedulerConfig {
    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms / 1000.0
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs_f64(self.scan_interval_ms / 1000.0)
    }

    pub fn regenerate_interval(&self) -> Duration {
        Duration::from_secs_f64(self.regenerate_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs_f64(self.stale_after_secs)
    }

    pub fn sanitized(self) -> Self {
        let stale_after_secs = clamp_field("stale_after_secs", self.stale_after_secs, 1.0, 60.0);
        Self {
            lookahead_ms: clamp_field("lookahead_ms", self.lookahead_ms, 1.0, 500.0),
            scan_interval_ms: clamp_field("scan_interval_ms", self.scan_interval_ms, 0.5, 100.0),
            regenerate_interval_secs: clamp_field(
                "regenerate_interval_secs",
                self.regenerate_interval_secs,
                0.1,
                stale_after_secs,
            ),
            stale_after_secs,
        }
    }
}

/// Parameter smoothing settings.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Fixed tick rate of the smoothing engine.
    pub tick_rate_hz: f64,
    /// One-pole time constant of every parameter ramp.
    pub time_constant_ms: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 120.0,
            time_constant_ms: 10.0,
        }
    }
}

impl SmoothingConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz)
    }

    pub fn sanitized(self) -> Self {
        Self {
            tick_rate_hz: clamp_field("tick_rate_hz", self.tick_rate_hz, 10.0, 1000.0),
            time_constant_ms: clamp_field("time_constant_ms", self.time_constant_ms, 1.0, 100.0),
        }
    }
}

/// Graph health monitor settings.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_ms: u64,
    /// Budget for the cheap check, in microseconds.
    pub quick_budget_us: u64,
    /// Budget for the full check, in microseconds.
    pub full_budget_us: u64,
    /// Run a full check after this many quick checks.
    pub full_check_every: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 250,
            quick_budget_us: 500,
            full_budget_us: 3_000,
            full_check_every: 8,
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn quick_budget(&self) -> Duration {
        Duration::from_micros(self.quick_budget_us)
    }

    pub fn full_budget(&self) -> Duration {
        Duration::from_micros(self.full_budget_us)
    }
}

/// Complete engine configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub smoothing: SmoothingConfig,
    pub health: HealthConfig,
}

impl EngineConfig {
    pub fn sanitized(self) -> Self {
        Self {
            scheduler: self.scheduler.sanitized(),
            smoothing: self.smoothing.sanitized(),
            health: self.health,
        }
    }
}

fn clamp_field(name: &str, value: f64, min: f64, max: f64) -> f64 {
    let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
    if clamped != value {
        warn!(field = name, value, clamped, "config value out of range");
    }
    clamped
}
