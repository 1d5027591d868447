//! Parameter automation: sparse time-stamped markers turned into a dense curve

mod interpolate;
mod parameter;

pub use interpolate::{
    lerp, CubicSpline, FitError, LinearCurve, NearestCurve, QuadraticSpline, SmoothCurve,
};
pub use parameter::{Pan, Parameter, PitchBend, Volume, CHANNELS};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::context::{RateContext, TimeContext};
use crate::error::{QuaverError, Result};
use crate::pitch::PitchValue;
use crate::time::{TimeRecord, TimeValue};

/// How the segment leading into a marker is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// Hold the previous value, then jump
    Hard,
    Linear,
    /// Follow the smoothest spline the marker set supports
    #[default]
    Smooth,
}

impl FromStr for Transition {
    type Err = QuaverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hard" => Ok(Self::Hard),
            "linear" => Ok(Self::Linear),
            "smooth" => Ok(Self::Smooth),
            _ => Err(QuaverError::parse(s, "expected hard, linear or smooth")),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hard => "hard",
            Self::Linear => "linear",
            Self::Smooth => "smooth",
        };
        f.write_str(name)
    }
}

/// Value held by a marker. Pitches interpolate in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerValue {
    Scalar(f64),
    Pitch(PitchValue),
}

impl MarkerValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Scalar(v) => *v,
            Self::Pitch(p) => p.hz(),
        }
    }
}

impl From<f64> for MarkerValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<PitchValue> for MarkerValue {
    fn from(value: PitchValue) -> Self {
        Self::Pitch(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerMarker {
    pub time: TimeValue,
    pub value: MarkerValue,
    pub transition: Transition,
}

/// Result of moving a marker
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    /// The marker as it was before the move
    pub moved: ControllerMarker,
    /// A marker that already sat at the destination and was replaced
    pub overwritten: Option<ControllerMarker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveState {
    Empty,
    /// One marker: point queries only
    Sparse,
    /// Two or more markers: curves can be generated
    Dense,
}

/// Marker positions resolved to sample indices, in time order
struct Snapshot {
    xs: Vec<f64>,
    ys: Vec<f64>,
    transitions: Vec<Transition>,
}

/// Markers evaluated segment by segment; the trailing marker of each
/// segment picks its transition
struct Curve {
    snapshot: Snapshot,
    smooth: Option<SmoothCurve>,
}

impl Curve {
    fn build(snapshot: Snapshot) -> Self {
        let needs_fit = snapshot.transitions.iter().skip(1).any(|t| *t == Transition::Smooth);
        let smooth = if needs_fit {
            match SmoothCurve::fit(&snapshot.xs, &snapshot.ys) {
                Ok(curve) => {
                    tracing::trace!(tier = curve.tier(), "fitted smooth segments");
                    Some(curve)
                }
                Err(err) => {
                    tracing::debug!(%err, "no smooth fit, smooth segments drawn linear");
                    None
                }
            }
        } else {
            None
        };
        Self { snapshot, smooth }
    }

    fn first(&self) -> f64 {
        self.snapshot.xs[0]
    }

    fn last(&self) -> f64 {
        self.snapshot.xs[self.snapshot.xs.len() - 1]
    }

    /// `x` must lie within `[first, last]`
    fn eval(&self, x: f64) -> f64 {
        let Snapshot { xs, ys, transitions } = &self.snapshot;
        let upper = xs.partition_point(|&v| v <= x);
        let i = upper.saturating_sub(1);
        if xs[i] == x || i + 1 >= xs.len() {
            return ys[i];
        }
        match transitions[i + 1] {
            Transition::Hard => ys[i],
            Transition::Linear => lerp(xs[i], ys[i], xs[i + 1], ys[i + 1], x),
            Transition::Smooth => match &self.smooth {
                Some(curve) => curve.eval(x),
                None => lerp(xs[i], ys[i], xs[i + 1], ys[i + 1], x),
            },
        }
    }

    fn sample(&self, resolution: usize) -> Vec<(i64, f64)> {
        let first = self.first() as i64;
        let last = self.last() as i64;
        let mut out: Vec<(i64, f64)> = (first..=last)
            .step_by(resolution)
            .map(|index| (index, self.eval(index as f64)))
            .collect();
        if out.last().map(|(index, _)| *index) != Some(last) {
            out.push((last, self.eval(last as f64)));
        }
        out
    }
}

/// Automation for one named parameter
#[derive(Debug, Clone)]
pub struct Controller<P> {
    name: String,
    context: TimeContext,
    markers: BTreeMap<TimeValue, ControllerMarker>,
    parameter: P,
}

impl<P: Parameter> Controller<P> {
    pub fn new(name: impl Into<String>, parameter: P, context: TimeContext) -> Self {
        Self {
            name: name.into(),
            context,
            markers: BTreeMap::new(),
            parameter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> TimeContext {
        self.context
    }

    pub fn parameter(&self) -> &P {
        &self.parameter
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn state(&self) -> CurveState {
        match self.markers.len() {
            0 => CurveState::Empty,
            1 => CurveState::Sparse,
            _ => CurveState::Dense,
        }
    }

    /// Markers in time order
    pub fn markers(&self) -> impl Iterator<Item = &ControllerMarker> {
        self.markers.values()
    }

    pub fn marker_at(&self, time: &TimeValue) -> Option<&ControllerMarker> {
        self.markers.get(time)
    }

    /// First and last marker times
    pub fn span(&self) -> Option<(TimeValue, TimeValue)> {
        let first = self.markers.keys().next()?;
        let last = self.markers.keys().next_back()?;
        Some((*first, *last))
    }

    /// Insert a marker, returning the one it replaced at the same time
    pub fn add(
        &mut self,
        time: TimeValue,
        value: impl Into<MarkerValue>,
        transition: Transition,
    ) -> Result<Option<ControllerMarker>> {
        let value = value.into();
        self.parameter.validate(&value)?;
        // remove first so the key takes the new time's unit as well
        let replaced = self.markers.remove(&time);
        self.markers.insert(time, ControllerMarker { time, value, transition });
        if let Some(old) = &replaced {
            tracing::debug!(controller = %self.name, time = %old.time, "replaced marker");
        }
        Ok(replaced)
    }

    pub fn delete(&mut self, time: &TimeValue) -> Result<ControllerMarker> {
        self.markers
            .remove(time)
            .ok_or_else(|| QuaverError::NotFound { time: time.to_string() })
    }

    /// Move the marker at `old_time` to `new_time`, replacing anything there
    pub fn move_marker(
        &mut self,
        old_time: &TimeValue,
        new_time: TimeValue,
    ) -> Result<MoveOutcome> {
        let moved = self.delete(old_time)?;
        let overwritten = self.markers.remove(&new_time);
        self.markers.insert(new_time, ControllerMarker { time: new_time, ..moved });
        if let Some(old) = &overwritten {
            tracing::debug!(controller = %self.name, time = %old.time, "move overwrote marker");
        }
        Ok(MoveOutcome { moved, overwritten })
    }

    /// Resolve marker positions, at `rate` when given or each marker's own context otherwise
    fn snapshot(&self, rate: Option<&RateContext>) -> Result<Snapshot> {
        if self.markers.len() < 2 {
            return Err(QuaverError::InsufficientData {
                controller: self.name.clone(),
                markers: self.markers.len(),
            });
        }
        let mut points: Vec<(i64, f64, Transition)> = self
            .markers
            .values()
            .map(|m| {
                let time = match rate {
                    Some(rate) => m.time.rebind(TimeContext::new(*rate, m.time.context().tempo)),
                    None => m.time,
                };
                (time.to_samples(), m.value.as_f64(), m.transition)
            })
            .collect();
        points.sort_by_key(|p| p.0);
        points.dedup_by_key(|p| p.0);
        if points.len() < 2 {
            return Err(QuaverError::InsufficientData {
                controller: self.name.clone(),
                markers: points.len(),
            });
        }
        Ok(Snapshot {
            xs: points.iter().map(|p| p.0 as f64).collect(),
            ys: points.iter().map(|p| p.1).collect(),
            transitions: points.iter().map(|p| p.2).collect(),
        })
    }

    /// Evaluate the curve from the first marker to the last, inclusive, every
    /// `resolution` samples. The last marker is always included.
    pub fn generate(&self, resolution: usize) -> Result<Vec<(i64, f64)>> {
        if resolution == 0 {
            return Err(QuaverError::value("resolution", "must be at least 1 sample"));
        }
        let curve = Curve::build(self.snapshot(None)?);
        let points = curve.sample(resolution);
        tracing::trace!(controller = %self.name, points = points.len(), "generated curve");
        Ok(points)
    }

    /// Curve value at a single time. Exact marker hits work with one
    /// marker; anything else needs a dense controller and a time inside the span.
    pub fn value_at(&self, time: &TimeValue) -> Result<f64> {
        if let Some(marker) = self.markers.get(time) {
            return Ok(marker.value.as_f64());
        }
        let curve = Curve::build(self.snapshot(None)?);
        let x = time.to_samples() as f64;
        if x < curve.first() || x > curve.last() {
            return Err(QuaverError::Index { index: time.to_samples() });
        }
        Ok(curve.eval(x))
    }

    /// Apply the curve to an interleaved stereo recording at `rate`
    pub fn apply(&self, samples: &mut [f32], rate: &RateContext) -> Result<()> {
        let curve = Curve::build(self.snapshot(Some(rate))?).sample(1);
        self.parameter.apply(&curve, samples)
    }

    pub fn to_record(&self) -> ControllerRecord {
        ControllerRecord {
            name: self.name.clone(),
            markers: self
                .markers
                .values()
                .map(|m| MarkerRecord {
                    time: TimeRecord::from(&m.time),
                    value: m.value,
                    transition: m.transition,
                })
                .collect(),
        }
    }

    /// Rebuild from a record, re-validating every marker
    pub fn from_record(
        record: &ControllerRecord,
        parameter: P,
        context: TimeContext,
    ) -> Result<Self> {
        let mut controller = Self::new(record.name.clone(), parameter, context);
        for marker in &record.markers {
            let time = marker.time.restore(context)?;
            controller.add(time, marker.value, marker.transition)?;
        }
        Ok(controller)
    }
}

/// Persisted controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerRecord {
    pub name: String,
    pub markers: Vec<MarkerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub time: TimeRecord,
    pub value: MarkerValue,
    #[serde(default)]
    pub transition: Transition,
}

impl ControllerRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A controller shared between threads. Mutations take the write lock;
/// `generate` works from a snapshot taken under the read lock.
#[derive(Debug)]
pub struct SharedController<P>(Arc<RwLock<Controller<P>>>);

impl<P> Clone for SharedController<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P: Parameter> SharedController<P> {
    pub fn new(controller: Controller<P>) -> Self {
        Self(Arc::new(RwLock::new(controller)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Controller<P>> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Controller<P>> {
        self.0.write()
    }

    pub fn add(
        &self,
        time: TimeValue,
        value: impl Into<MarkerValue>,
        transition: Transition,
    ) -> Result<Option<ControllerMarker>> {
        self.0.write().add(time, value, transition)
    }

    pub fn delete(&self, time: &TimeValue) -> Result<ControllerMarker> {
        self.0.write().delete(time)
    }

    pub fn move_marker(&self, old_time: &TimeValue, new_time: TimeValue) -> Result<MoveOutcome> {
        self.0.write().move_marker(old_time, new_time)
    }

    pub fn generate(&self, resolution: usize) -> Result<Vec<(i64, f64)>> {
        if resolution == 0 {
            return Err(QuaverError::value("resolution", "must be at least 1 sample"));
        }
        let snapshot = self.0.read().snapshot(None)?;
        Ok(Curve::build(snapshot).sample(resolution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ParseMode;
    use approx::assert_abs_diff_eq;

    fn ctx() -> TimeContext {
        TimeContext::default()
    }

    fn at(samples: i64) -> TimeValue {
        TimeValue::samples(samples, ctx())
    }

    fn volume() -> Controller<Volume> {
        Controller::new("volume", Volume::default(), ctx())
    }

    fn value_at_index(curve: &[(i64, f64)], index: i64) -> f64 {
        curve.iter().find(|(i, _)| *i == index).map(|(_, v)| *v).unwrap()
    }

    #[test]
    fn test_add_replaces_at_same_time() {
        let mut c = volume();
        assert_eq!(c.add(at(10), 1.0, Transition::Hard).unwrap(), None);
        let replaced = c.add(at(10), 2.0, Transition::Linear).unwrap().unwrap();
        assert_eq!(replaced.value, MarkerValue::Scalar(1.0));
        assert_eq!(replaced.transition, Transition::Hard);
        assert_eq!(replaced.time, at(10));
        assert_eq!(c.len(), 1);
        assert_eq!(c.marker_at(&at(10)).unwrap().value, MarkerValue::Scalar(2.0));
    }

    #[test]
    fn test_equivalent_times_share_a_key() {
        let mut c = volume();
        let beat = TimeValue::parse("1b", ParseMode::Time, ctx()).unwrap();
        c.add(beat, 1.0, Transition::Smooth).unwrap();
        assert!(c.add(at(22050), 0.5, Transition::Smooth).unwrap().is_some());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_add_validates_domain() {
        let mut c = volume();
        let err = c.add(at(0), -1.0, Transition::Hard).unwrap_err();
        assert!(matches!(err, QuaverError::Value { .. }));
        assert!(c.is_empty());
    }

    #[test]
    fn test_state_tiers() {
        let mut c = volume();
        assert_eq!(c.state(), CurveState::Empty);
        c.add(at(0), 1.0, Transition::Hard).unwrap();
        assert_eq!(c.state(), CurveState::Sparse);
        c.add(at(5), 1.0, Transition::Hard).unwrap();
        assert_eq!(c.state(), CurveState::Dense);
        c.move_marker(&at(5), at(9)).unwrap();
        assert_eq!(c.state(), CurveState::Dense);
        c.delete(&at(0)).unwrap();
        assert_eq!(c.state(), CurveState::Sparse);
    }

    #[test]
    fn test_generate_needs_two_markers() {
        let mut c = volume();
        assert!(matches!(c.generate(1), Err(QuaverError::InsufficientData { markers: 0, .. })));
        c.add(at(0), 1.0, Transition::Hard).unwrap();
        assert!(matches!(c.generate(1), Err(QuaverError::InsufficientData { markers: 1, .. })));
        assert_eq!(c.value_at(&at(0)).unwrap(), 1.0);
        assert!(matches!(c.value_at(&at(3)), Err(QuaverError::InsufficientData { .. })));
    }

    #[test]
    fn test_generate_covers_marker_span() {
        let mut c = volume();
        c.add(at(20), 0.0, Transition::Linear).unwrap();
        c.add(at(120), 1.0, Transition::Linear).unwrap();
        let curve = c.generate(1).unwrap();
        assert_eq!(curve.len(), 101);
        assert_eq!(curve.first().unwrap().0, 20);
        assert_eq!(curve.last().unwrap().0, 120);

        let coarse = c.generate(30).unwrap();
        let indices: Vec<i64> = coarse.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![20, 50, 80, 110, 120]);
        assert!(c.generate(0).is_err());
    }

    #[test]
    fn test_two_markers_fall_back_to_linear() {
        let mut c = volume();
        c.add(at(0), 0.0, Transition::default()).unwrap();
        c.add(at(100), 1.0, Transition::default()).unwrap();
        let curve = c.generate(1).unwrap();
        assert_abs_diff_eq!(value_at_index(&curve, 50), 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(value_at_index(&curve, 25), 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_hard_transition_steps() {
        let mut c = volume();
        c.add(at(0), 1.0, Transition::Hard).unwrap();
        c.add(at(100), 2.0, Transition::Hard).unwrap();
        let curve = c.generate(1).unwrap();
        assert_eq!(value_at_index(&curve, 50), 1.0);
        assert_eq!(value_at_index(&curve, 99), 1.0);
        assert_eq!(value_at_index(&curve, 100), 2.0);
    }

    #[test]
    fn test_trailing_marker_picks_segment_style() {
        let mut c = volume();
        c.add(at(0), 0.0, Transition::Smooth).unwrap();
        c.add(at(100), 1.0, Transition::Linear).unwrap();
        c.add(at(200), 3.0, Transition::Hard).unwrap();
        let curve = c.generate(1).unwrap();
        assert_abs_diff_eq!(value_at_index(&curve, 50), 0.5, epsilon = 1e-9);
        assert_eq!(value_at_index(&curve, 150), 1.0);
        assert_eq!(value_at_index(&curve, 200), 3.0);
    }

    #[test]
    fn test_smooth_segments_pass_through_markers() {
        let mut c = volume();
        let points = [(0, 0.0), (100, 1.0), (200, 0.5), (300, 2.0), (400, 1.0)];
        for (t, v) in points {
            c.add(at(t), v, Transition::Smooth).unwrap();
        }
        let curve = c.generate(1).unwrap();
        for (t, v) in points {
            assert_abs_diff_eq!(value_at_index(&curve, t), v, epsilon = 1e-9);
        }
        let mid = value_at_index(&curve, 150);
        assert!(mid != 0.75, "smooth segment should not be a straight line");
    }

    #[test]
    fn test_delete_and_move() {
        let mut c = volume();
        assert!(matches!(c.delete(&at(5)), Err(QuaverError::NotFound { .. })));
        c.add(at(0), 1.0, Transition::Hard).unwrap();
        c.add(at(50), 2.0, Transition::Linear).unwrap();

        let outcome = c.move_marker(&at(0), at(50)).unwrap();
        assert_eq!(outcome.moved.time, at(0));
        assert_eq!(outcome.moved.value, MarkerValue::Scalar(1.0));
        assert_eq!(outcome.overwritten.unwrap().value, MarkerValue::Scalar(2.0));
        assert_eq!(c.len(), 1);
        let moved = c.marker_at(&at(50)).unwrap();
        assert_eq!(moved.value, MarkerValue::Scalar(1.0));
        assert_eq!(moved.transition, Transition::Hard);

        assert!(matches!(c.move_marker(&at(0), at(10)), Err(QuaverError::NotFound { .. })));
    }

    #[test]
    fn test_value_at_outside_span() {
        let mut c = volume();
        c.add(at(10), 0.0, Transition::Linear).unwrap();
        c.add(at(20), 1.0, Transition::Linear).unwrap();
        assert_abs_diff_eq!(c.value_at(&at(15)).unwrap(), 0.5);
        assert!(matches!(c.value_at(&at(25)), Err(QuaverError::Index { index: 25 })));
    }

    #[test]
    fn test_apply_volume_at_recording_rate() {
        let context = TimeContext::from_scalars(4.0, 120.0).unwrap();
        let mut c = Controller::new("volume", Volume::default(), context);
        c.add(TimeValue::seconds(0.0, context), 0.0, Transition::Linear).unwrap();
        c.add(TimeValue::seconds(1.0, context), 1.0, Transition::Linear).unwrap();

        let mut samples = vec![1.0f32; 12];
        c.apply(&mut samples, &RateContext::new(4.0).unwrap()).unwrap();
        assert_eq!(samples, vec![0.0, 0.0, 0.25, 0.25, 0.5, 0.5, 0.75, 0.75, 1.0, 1.0, 1.0, 1.0]);

        let mut short = vec![1.0f32; 4];
        let result = c.apply(&mut short, &RateContext::new(4.0).unwrap());
        assert!(matches!(result, Err(QuaverError::Index { .. })));
    }

    #[test]
    fn test_pitch_markers_interpolate_in_hz() {
        let reference = PitchValue::parse("A4").unwrap();
        let mut c = Controller::new("pitch", PitchBend::new(reference), ctx());
        c.add(at(0), PitchValue::parse("A4").unwrap(), Transition::Linear).unwrap();
        c.add(at(10), PitchValue::parse("A5").unwrap(), Transition::Linear).unwrap();
        assert_abs_diff_eq!(c.value_at(&at(5)).unwrap(), 660.0, epsilon = 1e-9);
        assert!(c.add(at(3), 1.0, Transition::Linear).is_err());
    }

    #[test]
    fn test_record_round_trip() {
        let mut c = volume();
        let beat = TimeValue::parse("1b", ParseMode::Time, ctx()).unwrap();
        let later = TimeValue::parse("2.0s", ParseMode::Time, ctx()).unwrap();
        c.add(beat, 0.5, Transition::Hard).unwrap();
        c.add(later, 1.5, Transition::Smooth).unwrap();

        let json = c.to_record().to_json().unwrap();
        let record = ControllerRecord::from_json(&json).unwrap();
        let restored = Controller::from_record(&record, Volume::default(), ctx()).unwrap();
        assert_eq!(restored.name(), "volume");
        assert_eq!(restored.generate(1).unwrap(), c.generate(1).unwrap());

        let mut bad = record.clone();
        bad.markers[0].value = MarkerValue::Scalar(-3.0);
        assert!(Controller::from_record(&bad, Volume::default(), ctx()).is_err());
    }

    #[test]
    fn test_record_with_off_table_pitch_rejected() {
        let reference = PitchValue::parse("A4").unwrap();
        let mut c = Controller::new("pitch", PitchBend::new(reference), ctx());
        c.add(at(0), PitchValue::parse("A4").unwrap(), Transition::Linear).unwrap();
        c.add(at(10), PitchValue::parse("A5").unwrap(), Transition::Linear).unwrap();
        let json = c.to_record().to_json().unwrap();
        assert!(json.contains(r#""octave": 5"#));

        let tampered = json.replace(r#""octave": 5"#, r#""octave": 11"#);
        assert!(matches!(ControllerRecord::from_json(&tampered), Err(QuaverError::Json(_))));
        let tampered = json.replace(r#""cents": 0.0"#, r#""cents": 5000.0"#);
        assert!(matches!(ControllerRecord::from_json(&tampered), Err(QuaverError::Json(_))));
    }

    #[test]
    fn test_shared_controller_across_threads() {
        let shared = SharedController::new(volume());
        shared.add(at(0), 0.0, Transition::Linear).unwrap();

        let writer = shared.clone();
        std::thread::spawn(move || {
            writer.add(at(100), 1.0, Transition::Linear).unwrap();
        })
        .join()
        .unwrap();

        let curve = shared.generate(10).unwrap();
        assert_eq!(curve.len(), 11);
        assert_eq!(shared.read().len(), 2);
    }
}
