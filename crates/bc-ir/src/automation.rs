//! Automation lanes: beat-stamped breakpoints with interpolation curves.
//!
//! Lanes are owned by the arrangement and consumed read-only here. A lane is
//! undefined before its first point, interpolates between points, and holds
//! its last value past the final point.

use core::f64::consts::FRAC_PI_2;
use std::collections::HashMap;

use thiserror::Error;

use crate::event::TrackId;

/// Which continuous track parameter a lane drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackParam {
    Volume,
    Pan,
    EqLow,
    EqMid,
    EqHigh,
}

impl TrackParam {
    pub const ALL: [TrackParam; 5] = [
        TrackParam::Volume,
        TrackParam::Pan,
        TrackParam::EqLow,
        TrackParam::EqMid,
        TrackParam::EqHigh,
    ];

    /// Dense index into per-parameter arrays.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            TrackParam::Volume => 0,
            TrackParam::Pan => 1,
            TrackParam::EqLow => 2,
            TrackParam::EqMid => 3,
            TrackParam::EqHigh => 4,
        }
    }
}

/// Interpolation curve between two breakpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum CurveKind {
    /// Hold this value until the next point.
    Step,
    /// Straight line to the next point.
    #[default]
    Linear,
    /// Sine quarter-wave interpolation.
    SineQuarter,
    /// Exponential curve. 0.0 = linear, >0 = starts slow, <0 = starts fast.
    Exponential(f64),
}

/// Interpolate between two values using the given curve at position `t` (0.0..1.0).
pub fn interpolate(curve: CurveKind, from: f64, to: f64, t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    let factor = match curve {
        CurveKind::Step => 0.0,
        CurveKind::Linear => t,
        CurveKind::SineQuarter => libm::sin(t * FRAC_PI_2),
        CurveKind::Exponential(k) => {
            if k.abs() < 1e-6 {
                t
            } else {
                (libm::exp(k * t) - 1.0) / (libm::exp(k) - 1.0)
            }
        }
    };
    from + (to - from) * factor
}

/// A breakpoint on an automation lane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutomationPoint {
    pub beat: f64,
    pub value: f64,
    /// How to interpolate FROM this point TO the next.
    pub curve: CurveKind,
}

impl AutomationPoint {
    pub fn new(beat: f64, value: f64, curve: CurveKind) -> Self {
        Self { beat, value, curve }
    }

    pub fn linear(beat: f64, value: f64) -> Self {
        Self::new(beat, value, CurveKind::Linear)
    }
}

/// Rejected lane data.
#[derive(Debug, Error, PartialEq)]
pub enum LaneError {
    #[error("automation point {index} at beat {beat} is not after the previous point")]
    NotAscending { index: usize, beat: f64 },
    #[error("automation point {index} has a non-finite beat or value")]
    NonFinite { index: usize },
}

/// Ordered, unique-beat breakpoints.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AutomationLane {
    points: Vec<AutomationPoint>,
}

impl AutomationLane {
    /// Build a lane, rejecting out-of-order, duplicate or non-finite points.
    pub fn from_points(points: Vec<AutomationPoint>) -> Result<Self, LaneError> {
        for (index, p) in points.iter().enumerate() {
            if !p.beat.is_finite() || !p.value.is_finite() {
                return Err(LaneError::NonFinite { index });
            }
            if index > 0 && p.beat <= points[index - 1].beat {
                return Err(LaneError::NotAscending { index, beat: p.beat });
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[AutomationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether at least one point sits at or before `beat`.
    pub fn has_point_at_or_before(&self, beat: f64) -> bool {
        self.points.first().is_some_and(|p| p.beat <= beat)
    }

    /// Evaluate the lane at `beat`.
    ///
    /// `None` before the first point; the caller supplies the fallback.
    pub fn value_at(&self, beat: f64) -> Option<f64> {
        if !self.has_point_at_or_before(beat) {
            return None;
        }
        // Index of the first point strictly after `beat`.
        let next = self.points.partition_point(|p| p.beat <= beat);
        let prev = &self.points[next - 1];
        match self.points.get(next) {
            None => Some(prev.value),
            Some(after) => {
                let t = (beat - prev.beat) / (after.beat - prev.beat);
                Some(interpolate(prev.curve, prev.value, after.value, t))
            }
        }
    }
}

/// All automation lanes of an arrangement, keyed by track and parameter.
#[derive(Clone, Debug, Default)]
pub struct AutomationSet {
    lanes: HashMap<(TrackId, TrackParam), AutomationLane>,
}

impl AutomationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace a lane.
    pub fn insert(&mut self, track: TrackId, param: TrackParam, lane: AutomationLane) {
        self.lanes.insert((track, param), lane);
    }

    pub fn remove(&mut self, track: TrackId, param: TrackParam) -> Option<AutomationLane> {
        self.lanes.remove(&(track, param))
    }

    /// Drop every lane belonging to `track`.
    pub fn remove_track(&mut self, track: TrackId) {
        self.lanes.retain(|(t, _), _| *t != track);
    }

    pub fn lane(&self, track: TrackId, param: TrackParam) -> Option<&AutomationLane> {
        self.lanes.get(&(track, param))
    }

    /// Evaluate `track`/`param` at `beat`; `None` if there is no lane or no
    /// point at or before `beat`.
    pub fn value_at(&self, track: TrackId, param: TrackParam, beat: f64) -> Option<f64> {
        self.lane(track, param).and_then(|lane| lane.value_at(beat))
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lane(points: &[(f64, f64)]) -> AutomationLane {
        AutomationLane::from_points(
            points.iter().map(|&(b, v)| AutomationPoint::linear(b, v)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn interpolate_step_holds_value() {
        assert_eq!(interpolate(CurveKind::Step, 0.0, 10.0, 0.5), 0.0);
        assert_eq!(interpolate(CurveKind::Step, 0.0, 10.0, 0.99), 0.0);
    }

    #[test]
    fn interpolate_linear_midpoint() {
        assert_eq!(interpolate(CurveKind::Linear, 0.0, 10.0, 0.5), 5.0);
        assert_eq!(interpolate(CurveKind::Linear, 10.0, -10.0, 0.5), 0.0);
    }

    #[test]
    fn interpolate_sine_quarter_midpoint_above_linear() {
        let sine_mid = interpolate(CurveKind::SineQuarter, 0.0, 10.0, 0.5);
        assert!(sine_mid > 5.0);
        assert!((interpolate(CurveKind::SineQuarter, 0.0, 10.0, 1.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn interpolate_exponential_shapes() {
        let zero = interpolate(CurveKind::Exponential(0.0), 0.0, 10.0, 0.5);
        assert!((zero - 5.0).abs() < 1e-9);
        assert!(interpolate(CurveKind::Exponential(3.0), 0.0, 10.0, 0.5) < 5.0);
        assert!(interpolate(CurveKind::Exponential(-3.0), 0.0, 10.0, 0.5) > 5.0);
    }

    #[test]
    fn value_before_first_point_is_undefined() {
        let l = lane(&[(4.0, 0.5), (8.0, 1.0)]);
        assert_eq!(l.value_at(3.99), None);
        assert_eq!(l.value_at(4.0), Some(0.5));
    }

    #[test]
    fn value_between_points_interpolates() {
        let l = lane(&[(0.0, 0.0), (4.0, 1.0)]);
        assert_eq!(l.value_at(1.0), Some(0.25));
        assert_eq!(l.value_at(2.0), Some(0.5));
    }

    #[test]
    fn value_after_last_point_holds() {
        let l = lane(&[(0.0, 0.2), (2.0, 0.9)]);
        assert_eq!(l.value_at(2.0), Some(0.9));
        assert_eq!(l.value_at(100.0), Some(0.9));
    }

    #[test]
    fn step_curve_holds_until_next_point() {
        let l = AutomationLane::from_points(vec![
            AutomationPoint::new(0.0, 0.1, CurveKind::Step),
            AutomationPoint::linear(4.0, 0.9),
        ])
        .unwrap();
        assert_eq!(l.value_at(3.9), Some(0.1));
        assert_eq!(l.value_at(4.0), Some(0.9));
    }

    #[test]
    fn rejects_unordered_points() {
        let err = AutomationLane::from_points(vec![
            AutomationPoint::linear(2.0, 0.0),
            AutomationPoint::linear(2.0, 1.0),
        ])
        .unwrap_err();
        assert_eq!(err, LaneError::NotAscending { index: 1, beat: 2.0 });
    }

    #[test]
    fn rejects_non_finite_points() {
        let err =
            AutomationLane::from_points(vec![AutomationPoint::linear(0.0, f64::NAN)]).unwrap_err();
        assert_eq!(err, LaneError::NonFinite { index: 0 });
    }

    #[test]
    fn set_lookup_by_track_and_param() {
        let mut set = AutomationSet::new();
        set.insert(TrackId(1), TrackParam::Pan, lane(&[(0.0, -1.0), (2.0, 1.0)]));
        assert_eq!(set.value_at(TrackId(1), TrackParam::Pan, 1.0), Some(0.0));
        assert_eq!(set.value_at(TrackId(1), TrackParam::Volume, 1.0), None);
        assert_eq!(set.value_at(TrackId(2), TrackParam::Pan, 1.0), None);

        set.remove_track(TrackId(1));
        assert!(set.is_empty());
    }
}
