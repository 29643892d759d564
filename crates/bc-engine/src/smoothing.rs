//! Per-track parameter smoothing for zipper-free automation.
//!
//! Every continuous parameter (volume, pan, three EQ bands) and the
//! mute/solo multiplier is a one-pole smoother advanced once per fixed-rate
//! tick:
//!
//! `current += coeff * (target - current)`, with
//! `coeff = 1 - exp(-1 / (time_constant * tick_rate))`.
//!
//! Results are published per track through [`TrackOutputs`] atomics, which
//! the render thread reads without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bc_ir::{AutomationSet, TrackId, TrackParam};
use tracing::debug;

use crate::config::SmoothingConfig;

/// Snap to the target once this close.
const SMOOTH_THRESHOLD: f64 = 1e-6;

/// One-pole smoother.
#[derive(Clone, Copy, Debug)]
pub struct ParamSmoother {
    current: f64,
    target: f64,
    coeff: f64,
    is_smoothing: bool,
}

impl ParamSmoother {
    pub fn new(initial: f64, coeff: f64) -> Self {
        Self {
            current: initial,
            target: initial,
            coeff,
            is_smoothing: false,
        }
    }

    /// Coefficient for a time constant in seconds at `tick_rate` Hz.
    pub fn coeff_for(time_constant_secs: f64, tick_rate: f64) -> f64 {
        let ticks = time_constant_secs * tick_rate;
        if !(ticks > 0.0) {
            return 1.0;
        }
        1.0 - libm::exp(-1.0 / ticks)
    }

    #[inline]
    pub fn set_target(&mut self, target: f64) {
        if !target.is_finite() {
            return;
        }
        if (self.target - target).abs() > SMOOTH_THRESHOLD {
            self.target = target;
            self.is_smoothing = true;
        }
    }

    /// Jump straight to `value` with no ramp.
    #[inline]
    pub fn set_immediate(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.current = value;
        self.target = value;
        self.is_smoothing = false;
    }

    #[inline]
    pub fn next_value(&mut self) -> f64 {
        if self.is_smoothing {
            self.current += self.coeff * (self.target - self.current);
            if (self.current - self.target).abs() < SMOOTH_THRESHOLD {
                self.current = self.target;
                self.is_smoothing = false;
            }
        }
        self.current
    }

    #[inline]
    pub fn current(&self) -> f64 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        self.is_smoothing
    }
}

/// User-facing mixer state for one track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixerControls {
    /// Linear gain
    pub volume: f64,
    /// -1.0 (left) to 1.0 (right)
    pub pan: f64,
    /// EQ band gains in dB; 0 is flat
    pub eq_low: f64,
    pub eq_mid: f64,
    pub eq_high: f64,
    pub muted: bool,
    pub soloed: bool,
}

impl Default for MixerControls {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            eq_low: 0.0,
            eq_mid: 0.0,
            eq_high: 0.0,
            muted: false,
            soloed: false,
        }
    }
}

impl MixerControls {
    pub fn value(&self, param: TrackParam) -> f64 {
        match param {
            TrackParam::Volume => self.volume,
            TrackParam::Pan => self.pan,
            TrackParam::EqLow => self.eq_low,
            TrackParam::EqMid => self.eq_mid,
            TrackParam::EqHigh => self.eq_high,
        }
    }
}

/// Automation targets for one tick. `None` keeps the previous target.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AutomationValues {
    pub volume: Option<f64>,
    pub pan: Option<f64>,
    pub eq_low: Option<f64>,
    pub eq_mid: Option<f64>,
    pub eq_high: Option<f64>,
}

impl AutomationValues {
    pub fn get(&self, param: TrackParam) -> Option<f64> {
        match param {
            TrackParam::Volume => self.volume,
            TrackParam::Pan => self.pan,
            TrackParam::EqLow => self.eq_low,
            TrackParam::EqMid => self.eq_mid,
            TrackParam::EqHigh => self.eq_high,
        }
    }

    pub fn set(&mut self, param: TrackParam, value: Option<f64>) {
        let slot = match param {
            TrackParam::Volume => &mut self.volume,
            TrackParam::Pan => &mut self.pan,
            TrackParam::EqLow => &mut self.eq_low,
            TrackParam::EqMid => &mut self.eq_mid,
            TrackParam::EqHigh => &mut self.eq_high,
        };
        *slot = value;
    }

    /// Evaluate every lane of `track` at `beat`.
    pub fn from_automation(automation: &AutomationSet, track: TrackId, beat: f64) -> Self {
        let mut values = Self::default();
        for param in TrackParam::ALL {
            values.set(param, automation.value_at(track, param, beat));
        }
        values
    }

    pub fn is_empty(&self) -> bool {
        TrackParam::ALL.iter().all(|&p| self.get(p).is_none())
    }
}

/// Smoothed values published for the render thread.
#[derive(Debug)]
pub struct TrackOutputs {
    params: [AtomicU64; 5],
    mute: AtomicU64,
}

impl TrackOutputs {
    fn new(controls: &MixerControls, mute: f64) -> Self {
        Self {
            params: TrackParam::ALL.map(|p| AtomicU64::new(controls.value(p).to_bits())),
            mute: AtomicU64::new(mute.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self, param: TrackParam) -> f64 {
        f64::from_bits(self.params[param.index()].load(Ordering::Acquire))
    }

    /// Mute/solo multiplier, 0.0 (silent) to 1.0.
    #[inline]
    pub fn mute(&self) -> f64 {
        f64::from_bits(self.mute.load(Ordering::Acquire))
    }

    /// `volume * mute`
    #[inline]
    pub fn effective_gain(&self) -> f64 {
        self.get(TrackParam::Volume) * self.mute()
    }

    #[inline]
    fn publish(&self, params: &[ParamSmoother; 5], mute: &ParamSmoother) {
        for (slot, smoother) in self.params.iter().zip(params) {
            slot.store(smoother.current().to_bits(), Ordering::Release);
        }
        self.mute.store(mute.current().to_bits(), Ordering::Release);
    }
}

struct TrackSmoothing {
    track: TrackId,
    controls: MixerControls,
    params: [ParamSmoother; 5],
    mute: ParamSmoother,
    outputs: Arc<TrackOutputs>,
}

impl TrackSmoothing {
    fn retarget(&mut self, values: &AutomationValues) {
        for param in TrackParam::ALL {
            if let Some(v) = values.get(param) {
                self.params[param.index()].set_target(v);
            }
        }
    }
}

/// Owns every track's smoothers. Single writer: whoever calls `tick`.
pub struct SmoothingEngine {
    config: SmoothingConfig,
    coeff: f64,
    tracks: Vec<TrackSmoothing>,
}

impl SmoothingEngine {
    pub fn new(config: SmoothingConfig) -> Self {
        let config = config.sanitized();
        let coeff =
            ParamSmoother::coeff_for(config.time_constant_ms / 1000.0, config.tick_rate_hz);
        Self {
            config,
            coeff,
            tracks: Vec::new(),
        }
    }

    pub fn config(&self) -> &SmoothingConfig {
        &self.config
    }

    pub fn coeff(&self) -> f64 {
        self.coeff
    }

    /// Create smoothing state for `track` at its default controls. Adding an
    /// existing track returns its current outputs.
    pub fn add_track(&mut self, track: TrackId) -> Arc<TrackOutputs> {
        if let Some(existing) = self.find(track) {
            return existing.outputs.clone();
        }
        let controls = MixerControls::default();
        let coeff = self.coeff;
        let mute = if self.any_solo() { 0.0 } else { 1.0 };
        let outputs = Arc::new(TrackOutputs::new(&controls, mute));
        self.tracks.push(TrackSmoothing {
            track,
            controls,
            params: TrackParam::ALL.map(|p| ParamSmoother::new(controls.value(p), coeff)),
            mute: ParamSmoother::new(mute, coeff),
            outputs: outputs.clone(),
        });
        outputs
    }

    pub fn remove_track(&mut self, track: TrackId) {
        self.tracks.retain(|t| t.track != track);
        self.update_mute_targets();
    }

    pub fn outputs(&self, track: TrackId) -> Option<Arc<TrackOutputs>> {
        self.find(track).map(|t| t.outputs.clone())
    }

    pub fn controls(&self, track: TrackId) -> Option<MixerControls> {
        self.find(track).map(|t| t.controls)
    }

    /// Store new mixer controls. Parameter targets move to the control
    /// values and every track's mute target is re-resolved.
    pub fn set_controls(&mut self, track: TrackId, controls: MixerControls) -> bool {
        let Some(t) = self.tracks.iter_mut().find(|t| t.track == track) else {
            return false;
        };
        t.controls = controls;
        for param in TrackParam::ALL {
            t.params[param.index()].set_target(controls.value(param));
        }
        self.update_mute_targets();
        debug!(
            track = track.0,
            muted = controls.muted,
            soloed = controls.soloed,
            "mixer controls set"
        );
        true
    }

    /// Set this tick's automation targets for `track`.
    pub fn apply_automation_values(&mut self, track: TrackId, values: AutomationValues) {
        if let Some(t) = self.tracks.iter_mut().find(|t| t.track == track) {
            t.retarget(&values);
        }
    }

    /// Evaluate every track's lanes at `beat` and retarget.
    pub fn apply_automation(&mut self, automation: &AutomationSet, beat: f64) {
        for t in &mut self.tracks {
            let values = AutomationValues::from_automation(automation, t.track, beat);
            t.retarget(&values);
        }
    }

    /// Advance every smoother one tick and publish. Never allocates.
    pub fn tick(&mut self) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.tick_inner());
        #[cfg(not(feature = "alloc_check"))]
        self.tick_inner();
    }

    #[inline]
    fn tick_inner(&mut self) {
        for t in &mut self.tracks {
            for smoother in &mut t.params {
                smoother.next_value();
            }
            t.mute.next_value();
            t.outputs.publish(&t.params, &t.mute);
        }
    }

    /// Re-anchor every smoother at `at_beat` with no ramp.
    ///
    /// A parameter with a lane point at or before `at_beat` takes the lane's
    /// value there; otherwise it takes the track's control value (flat 0 dB
    /// for untouched EQ bands). The mute multiplier jumps to its target.
    pub fn reset_smoothing(&mut self, at_beat: f64, automation: &AutomationSet) {
        let any_solo = self.any_solo();
        for t in &mut self.tracks {
            for param in TrackParam::ALL {
                let value = automation
                    .value_at(t.track, param, at_beat)
                    .unwrap_or_else(|| t.controls.value(param));
                t.params[param.index()].set_immediate(value);
            }
            t.mute.set_immediate(mute_target(&t.controls, any_solo));
            t.outputs.publish(&t.params, &t.mute);
        }
        debug!(at_beat, tracks = self.tracks.len(), "smoothing reset");
    }

    pub fn current(&self, track: TrackId, param: TrackParam) -> Option<f64> {
        self.find(track).map(|t| t.params[param.index()].current())
    }

    pub fn target(&self, track: TrackId, param: TrackParam) -> Option<f64> {
        self.find(track).map(|t| t.params[param.index()].target())
    }

    pub fn mute_multiplier(&self, track: TrackId) -> Option<f64> {
        self.find(track).map(|t| t.mute.current())
    }

    pub fn track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.tracks.iter().map(|t| t.track)
    }

    pub fn is_settled(&self) -> bool {
        self.tracks
            .iter()
            .all(|t| !t.mute.is_smoothing() && t.params.iter().all(|p| !p.is_smoothing()))
    }

    fn any_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.controls.soloed)
    }

    fn update_mute_targets(&mut self) {
        let any_solo = self.any_solo();
        for t in &mut self.tracks {
            t.mute.set_target(mute_target(&t.controls, any_solo));
        }
    }

    fn find(&self, track: TrackId) -> Option<&TrackSmoothing> {
        self.tracks.iter().find(|t| t.track == track)
    }
}

/// Audible unless muted, or unless another track is soloed.
#[inline]
fn mute_target(controls: &MixerControls, any_solo: bool) -> f64 {
    if !controls.muted && (!any_solo || controls.soloed) {
        1.0
    } else {
        0.0
    }
}
