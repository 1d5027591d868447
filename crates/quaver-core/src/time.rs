//! Durations and instants in samples, seconds, or beats

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::TimeContext;
use crate::error::{QuaverError, Result};

/// Fractions of a quarter-note beat, keyed by notation token
const BEAT_TOKENS: &[(&str, f64)] = &[
    // note family
    ("sfn", 1.0 / 16.0),
    ("tsn", 1.0 / 8.0),
    ("sn", 1.0 / 4.0),
    ("en", 1.0 / 2.0),
    ("qn", 1.0),
    ("hn", 2.0),
    ("wn", 4.0),
    // beat-fraction family
    ("sb", 1.0 / 16.0),
    ("eb", 1.0 / 8.0),
    ("qb", 1.0 / 4.0),
    ("hb", 1.0 / 2.0),
    ("b", 1.0),
];

static TIME_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?(?:\d+\.?\d*|\.\d+)(?:e[+-]?\d+)?)?\s*([a-z]*)$")
        .expect("time literal pattern is valid")
});

/// Slack added before truncating a fractional sample position, so values
/// like 0.3s * 44100 that land a hair under a whole sample still hit it
const INDEX_EPSILON: f64 = 1e-9;

fn beat_fraction(token: &str) -> Option<f64> {
    BEAT_TOKENS.iter().find(|(name, _)| *name == token).map(|(_, f)| *f)
}

/// Round-half-up to a whole sample count
fn round_samples(raw: f64) -> i64 {
    (raw + 0.5).floor() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Samples,
    Seconds,
    Beats,
}

impl TimeUnit {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Samples => "samp",
            Self::Seconds => "s",
            Self::Beats => "b",
        }
    }
}

/// How a number with no unit letters is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Any unit accepted; a bare number is seconds
    #[default]
    Time,
    /// Beat notation only; a bare number is beats
    StrictBeats,
}

/// Magnitude in the unit it was written in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Quantity {
    Samples(i64),
    Seconds(f64),
    Beats(f64),
}

impl Quantity {
    pub fn unit(&self) -> TimeUnit {
        match self {
            Self::Samples(_) => TimeUnit::Samples,
            Self::Seconds(_) => TimeUnit::Seconds,
            Self::Beats(_) => TimeUnit::Beats,
        }
    }
}

/// An immutable time quantity bound to the context it converts with.
///
/// Equality, ordering and hashing all go through the sample count, so `1b`
/// and `22050samp` are the same key at 44.1kHz / 120bpm.
#[derive(Debug, Clone, Copy)]
pub struct TimeValue {
    quantity: Quantity,
    context: TimeContext,
}

impl TimeValue {
    pub fn samples(count: i64, context: TimeContext) -> Self {
        Self { quantity: Quantity::Samples(count), context }
    }

    pub fn seconds(seconds: f64, context: TimeContext) -> Self {
        Self { quantity: Quantity::Seconds(seconds), context }
    }

    pub fn beats(beats: f64, context: TimeContext) -> Self {
        Self { quantity: Quantity::Beats(beats), context }
    }

    /// Rebuild from a persisted `(value, unit)` pair
    pub fn from_parts(value: f64, unit: TimeUnit, context: TimeContext) -> Result<Self> {
        if !value.is_finite() {
            return Err(QuaverError::value("time", format!("must be finite, got {value}")));
        }
        match unit {
            TimeUnit::Samples => {
                if value.fract() != 0.0 {
                    return Err(QuaverError::value(
                        "sample count",
                        format!("must be a whole number, got {value}"),
                    ));
                }
                Ok(Self::samples(value as i64, context))
            }
            TimeUnit::Seconds => Ok(Self::seconds(value, context)),
            TimeUnit::Beats => Ok(Self::beats(value, context)),
        }
    }

    pub fn to_parts(&self) -> (f64, TimeUnit) {
        (self.magnitude(), self.unit())
    }

    /// Parse canonical notation: `3qn`, `1.5b`, `2.0s`, `441samp`, or a bare
    /// number whose unit depends on `mode`
    pub fn parse(text: &str, mode: ParseMode, context: TimeContext) -> Result<Self> {
        let normalized = text.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(QuaverError::parse(text, "empty time value"));
        }
        let caps = TIME_LITERAL
            .captures(&normalized)
            .ok_or_else(|| QuaverError::parse(text, "expected a number followed by a unit"))?;

        let number = caps.get(1).map(|m| m.as_str());
        let unit = caps.get(2).map_or("", |m| m.as_str());

        let magnitude = match number {
            Some(n) => {
                let value: f64 = n
                    .parse()
                    .map_err(|_| QuaverError::parse(text, format!("invalid number '{n}'")))?;
                if !value.is_finite() {
                    return Err(QuaverError::parse(text, format!("number '{n}' is out of range")));
                }
                Some(value)
            }
            None => None,
        };

        let require_number = || {
            magnitude
                .ok_or_else(|| QuaverError::parse(text, format!("unit '{unit}' needs a number")))
        };
        let reject_in_strict = || {
            if mode == ParseMode::StrictBeats {
                return Err(QuaverError::parse(text, format!("'{unit}' is not beat notation")));
            }
            Ok(())
        };

        match unit {
            "" => {
                let value = require_number()?;
                match mode {
                    ParseMode::Time => Ok(Self::seconds(value, context)),
                    ParseMode::StrictBeats => Ok(Self::beats(value, context)),
                }
            }
            "s" | "sec" => {
                reject_in_strict()?;
                Ok(Self::seconds(require_number()?, context))
            }
            "samp" => {
                reject_in_strict()?;
                let raw = number
                    .ok_or_else(|| QuaverError::parse(text, "unit 'samp' needs a number"))?;
                let count: i64 = raw.parse().map_err(|_| {
                    QuaverError::parse(text, format!("sample count '{raw}' must be a whole number"))
                })?;
                Ok(Self::samples(count, context))
            }
            token => {
                let fraction = beat_fraction(token)
                    .ok_or_else(|| QuaverError::parse(text, format!("unknown unit '{token}'")))?;
                Ok(Self::beats(magnitude.unwrap_or(1.0) * fraction, context))
            }
        }
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn context(&self) -> TimeContext {
        self.context
    }

    pub fn unit(&self) -> TimeUnit {
        self.quantity.unit()
    }

    /// Raw number in the held unit
    pub fn magnitude(&self) -> f64 {
        match self.quantity {
            Quantity::Samples(s) => s as f64,
            Quantity::Seconds(s) | Quantity::Beats(s) => s,
        }
    }

    /// Same quantity read against another context
    pub fn rebind(&self, context: TimeContext) -> Self {
        Self { quantity: self.quantity, context }
    }

    pub fn to_samples(&self) -> i64 {
        match self.quantity {
            Quantity::Samples(s) => s,
            Quantity::Seconds(s) => round_samples(s * self.context.rate.get_rate()),
            Quantity::Beats(b) => round_samples(b * self.context.samples_per_beat()),
        }
    }

    pub fn to_seconds(&self) -> f64 {
        match self.quantity {
            Quantity::Samples(s) => s as f64 / self.context.rate.get_rate(),
            Quantity::Seconds(s) => s,
            Quantity::Beats(b) => b * self.context.tempo.seconds_per_beat(),
        }
    }

    pub fn to_beats(&self) -> f64 {
        match self.quantity {
            Quantity::Samples(s) => s as f64 / self.context.samples_per_beat(),
            Quantity::Seconds(s) => s / self.context.tempo.seconds_per_beat(),
            Quantity::Beats(b) => b,
        }
    }

    pub fn in_samples(&self) -> Self {
        match self.quantity {
            Quantity::Samples(_) => *self,
            _ => Self::samples(self.to_samples(), self.context),
        }
    }

    pub fn in_seconds(&self) -> Self {
        match self.quantity {
            Quantity::Seconds(_) => *self,
            _ => Self::seconds(self.to_seconds(), self.context),
        }
    }

    pub fn in_beats(&self) -> Self {
        match self.quantity {
            Quantity::Beats(_) => *self,
            _ => Self::beats(self.to_beats(), self.context),
        }
    }

    /// Re-express this value in `unit`
    pub fn in_unit(&self, unit: TimeUnit) -> Self {
        match unit {
            TimeUnit::Samples => self.in_samples(),
            TimeUnit::Seconds => self.in_seconds(),
            TimeUnit::Beats => self.in_beats(),
        }
    }

    /// Truncate to an array index. Negative positions are an `Index` error.
    pub fn floor_to_index(&self) -> Result<usize> {
        let raw = match self.quantity {
            Quantity::Samples(s) => s as f64,
            Quantity::Seconds(s) => s * self.context.rate.get_rate(),
            Quantity::Beats(b) => b * self.context.samples_per_beat(),
        };
        if raw < 0.0 {
            return Err(QuaverError::Index { index: raw.floor() as i64 });
        }
        Ok((raw + INDEX_EPSILON).floor() as usize)
    }

    fn from_sample_count(count: i64, unit: TimeUnit, context: TimeContext) -> Self {
        Self::samples(count, context).in_unit(unit)
    }

    fn scaled(&self, factor: f64) -> Self {
        let quantity = match self.quantity {
            Quantity::Samples(s) => Quantity::Samples(round_samples(s as f64 * factor)),
            Quantity::Seconds(s) => Quantity::Seconds(s * factor),
            Quantity::Beats(b) => Quantity::Beats(b * factor),
        };
        Self { quantity, context: self.context }
    }
}

impl PartialEq for TimeValue {
    fn eq(&self, other: &Self) -> bool {
        self.to_samples() == other.to_samples()
    }
}

impl Eq for TimeValue {}

impl PartialOrd for TimeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_samples().cmp(&other.to_samples())
    }
}

impl Hash for TimeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_samples().hash(state);
    }
}

impl Add for TimeValue {
    type Output = TimeValue;

    fn add(self, rhs: Self) -> Self::Output {
        let count = self.to_samples().saturating_add(rhs.to_samples());
        Self::from_sample_count(count, self.unit(), self.context)
    }
}

impl Sub for TimeValue {
    type Output = TimeValue;

    fn sub(self, rhs: Self) -> Self::Output {
        let count = self.to_samples().saturating_sub(rhs.to_samples());
        Self::from_sample_count(count, self.unit(), self.context)
    }
}

impl Mul<f64> for TimeValue {
    type Output = TimeValue;

    fn mul(self, rhs: f64) -> Self::Output {
        self.scaled(rhs)
    }
}

impl Div<f64> for TimeValue {
    type Output = TimeValue;

    fn div(self, rhs: f64) -> Self::Output {
        self.scaled(1.0 / rhs)
    }
}

impl Neg for TimeValue {
    type Output = TimeValue;

    fn neg(self) -> Self::Output {
        self.scaled(-1.0)
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude(), self.unit().suffix())
    }
}

/// Persisted form of a `TimeValue`; the context is supplied by the loader
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRecord {
    pub value: f64,
    pub unit: TimeUnit,
}

impl From<&TimeValue> for TimeRecord {
    fn from(time: &TimeValue) -> Self {
        let (value, unit) = time.to_parts();
        Self { value, unit }
    }
}

impl TimeRecord {
    pub fn restore(&self, context: TimeContext) -> Result<TimeValue> {
        TimeValue::from_parts(self.value, self.unit, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ctx() -> TimeContext {
        TimeContext::default()
    }

    fn parse(text: &str) -> TimeValue {
        TimeValue::parse(text, ParseMode::Time, ctx()).unwrap()
    }

    #[test]
    fn test_samples_round_trip() {
        for s in (0..500_000).step_by(37).chain([1, 2, 3, 22049, 22051, 44099]) {
            let t = TimeValue::samples(s, ctx());
            assert_eq!(TimeValue::seconds(t.to_seconds(), ctx()).to_samples(), s);
            assert_eq!(TimeValue::beats(t.to_beats(), ctx()).to_samples(), s);
        }
    }

    #[test]
    fn test_unit_conversions() {
        let one_beat = TimeValue::beats(1.0, ctx());
        assert_abs_diff_eq!(one_beat.to_seconds(), 0.5);
        assert_eq!(one_beat.to_samples(), 22050);

        let two_secs = TimeValue::seconds(2.0, ctx());
        assert_abs_diff_eq!(two_secs.to_beats(), 4.0);
        assert_eq!(two_secs.to_samples(), 88200);
    }

    #[test]
    fn test_half_sample_rounds_up() {
        let rate = crate::RateContext::new(2.0).unwrap();
        let ctx = TimeContext::new(rate, Default::default());
        assert_eq!(TimeValue::seconds(0.25, ctx).to_samples(), 1);
        assert_eq!(TimeValue::seconds(0.75, ctx).to_samples(), 2);
    }

    #[test]
    fn test_same_unit_conversion_is_identity() {
        let t = TimeValue::beats(1.25, ctx());
        assert_eq!(t.in_beats().quantity(), Quantity::Beats(1.25));
        let s = TimeValue::samples(17, ctx());
        assert_eq!(s.in_samples().quantity(), Quantity::Samples(17));
    }

    #[test]
    fn test_beat_notation_equivalence() {
        assert_eq!(parse("1qn"), parse("1b"));
        assert_eq!(parse("2en"), parse("1b"));
        assert_eq!(parse("4sn"), parse("qn"));
        assert_eq!(parse("wn"), parse("4b"));
        assert_eq!(parse("16sb"), parse("b"));
        assert_eq!(parse("2hb"), parse("1b"));
        assert_abs_diff_eq!(parse("3qn").to_beats(), 3.0);
        assert_abs_diff_eq!(parse("sfn").to_beats(), 0.0625);
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse("2.0s").quantity(), Quantity::Seconds(2.0));
        assert_eq!(parse("1.5sec").quantity(), Quantity::Seconds(1.5));
        assert_eq!(parse("441samp").quantity(), Quantity::Samples(441));
        assert_eq!(parse("1.5b").quantity(), Quantity::Beats(1.5));
        assert_eq!(parse(" 0.25 ").quantity(), Quantity::Seconds(0.25));
        assert_eq!(parse("3QN").quantity(), Quantity::Beats(3.0));
    }

    #[test]
    fn test_parse_mode_decides_bare_numbers() {
        let strict = TimeValue::parse("2", ParseMode::StrictBeats, ctx()).unwrap();
        assert_eq!(strict.quantity(), Quantity::Beats(2.0));
        assert!(TimeValue::parse("2s", ParseMode::StrictBeats, ctx()).is_err());
        assert!(TimeValue::parse("20samp", ParseMode::StrictBeats, ctx()).is_err());
        assert!(TimeValue::parse("2en", ParseMode::StrictBeats, ctx()).is_ok());
    }

    #[test]
    fn test_parse_errors_name_the_input() {
        for bad in ["", "qx", "3xyz", "s", "1.5samp", "abc", "1..2b", "samp"] {
            match TimeValue::parse(bad, ParseMode::Time, ctx()) {
                Err(QuaverError::Parse { input, .. }) => assert_eq!(input, bad),
                other => panic!("expected parse error for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_mixed_unit_arithmetic_keeps_left_unit() {
        let sum = parse("1b") + parse("22050samp");
        assert_eq!(sum.unit(), TimeUnit::Beats);
        assert_abs_diff_eq!(sum.to_beats(), 2.0);

        let diff = parse("1s") - parse("1b");
        assert_eq!(diff.unit(), TimeUnit::Seconds);
        assert_abs_diff_eq!(diff.to_seconds(), 0.5);

        let negative = parse("100samp") - parse("1s");
        assert_eq!(negative.to_samples(), 100 - 44100);
    }

    #[test]
    fn test_arithmetic_saturates_at_sample_limits() {
        let huge = parse("1e300s");
        let sum = huge + huge;
        assert_eq!(sum.unit(), TimeUnit::Seconds);
        assert!(sum.to_samples() > i64::MAX / 2);
        let diff = -huge - huge;
        assert!(diff.to_samples() < i64::MIN / 2);

        let max = TimeValue::samples(i64::MAX, ctx());
        let one = TimeValue::samples(1, ctx());
        assert_eq!((max + one).to_samples(), i64::MAX);
        let min = TimeValue::samples(i64::MIN, ctx());
        assert_eq!((min - one).to_samples(), i64::MIN);
    }

    #[test]
    fn test_scalar_scaling_preserves_unit() {
        let t = parse("1.5b") * 2.0;
        assert_eq!(t.quantity(), Quantity::Beats(3.0));
        let s = parse("441samp") / 2.0;
        assert_eq!(s.quantity(), Quantity::Samples(221));
        assert_eq!((-parse("2s")).quantity(), Quantity::Seconds(-2.0));
    }

    #[test]
    fn test_comparison_uses_samples() {
        assert!(parse("1b") < parse("1s"));
        assert!(parse("0.5s") <= parse("1b"));
        assert_eq!(parse("0.5s"), parse("1b"));
        assert!(parse("22051samp") > parse("1b"));
    }

    #[test]
    fn test_floor_to_index() {
        assert_eq!(parse("1b").floor_to_index().unwrap(), 22050);
        assert_eq!(TimeValue::seconds(0.3, ctx()).floor_to_index().unwrap(), 13230);
        let fractional = TimeValue::seconds(1.5 / 44100.0, ctx());
        assert_eq!(fractional.floor_to_index().unwrap(), 1);
        let err = TimeValue::samples(-5, ctx()).floor_to_index().unwrap_err();
        assert!(matches!(err, QuaverError::Index { index: -5 }));
    }

    #[test]
    fn test_display_parses_back() {
        for text in ["3qn", "1.5b", "2.0s", "441samp"] {
            let t = parse(text);
            let again = parse(&t.to_string());
            assert_eq!(again.quantity(), t.quantity());
        }
        assert_eq!(parse("441samp").to_string(), "441samp");
        assert_eq!(parse("1.5b").to_string(), "1.5b");
    }

    #[test]
    fn test_record_restore() {
        let record = TimeRecord::from(&parse("2en"));
        assert_eq!(record.unit, TimeUnit::Beats);
        let restored = record.restore(ctx()).unwrap();
        assert_eq!(restored, parse("1b"));

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"value":1.0,"unit":"beats"}"#);

        assert!(TimeValue::from_parts(1.5, TimeUnit::Samples, ctx()).is_err());
    }
}
