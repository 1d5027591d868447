//! Sample rate and tempo contexts used by every time conversion

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{QuaverError, Result};

pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;
pub const DEFAULT_BPM: f64 = 120.0;

/// Samples per second of a recording
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateContext {
    samples_per_second: f64,
}

impl Default for RateContext {
    fn default() -> Self {
        Self { samples_per_second: DEFAULT_SAMPLE_RATE }
    }
}

impl RateContext {
    pub fn new(samples_per_second: f64) -> Result<Self> {
        if !(samples_per_second.is_finite() && samples_per_second > 0.0) {
            return Err(QuaverError::value(
                "sample rate",
                format!("must be positive, got {samples_per_second}"),
            ));
        }
        Ok(Self { samples_per_second })
    }

    pub fn get_rate(&self) -> f64 {
        self.samples_per_second
    }
}

/// Tempo of one timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoContext {
    beats_per_minute: f64,
}

impl Default for TempoContext {
    fn default() -> Self {
        Self { beats_per_minute: DEFAULT_BPM }
    }
}

impl TempoContext {
    pub fn new(beats_per_minute: f64) -> Result<Self> {
        if !(beats_per_minute.is_finite() && beats_per_minute > 0.0) {
            return Err(QuaverError::value(
                "tempo",
                format!("must be positive, got {beats_per_minute} bpm"),
            ));
        }
        Ok(Self { beats_per_minute })
    }

    pub fn get_bpm(&self) -> f64 {
        self.beats_per_minute
    }

    /// Wall-clock length of one beat
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.beats_per_minute
    }
}

/// Both scalars a `TimeValue` needs to move between units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeContext {
    pub rate: RateContext,
    pub tempo: TempoContext,
}

impl TimeContext {
    pub fn new(rate: RateContext, tempo: TempoContext) -> Self {
        Self { rate, tempo }
    }

    /// Build from raw scalars, validating both
    pub fn from_scalars(samples_per_second: f64, beats_per_minute: f64) -> Result<Self> {
        Ok(Self {
            rate: RateContext::new(samples_per_second)?,
            tempo: TempoContext::new(beats_per_minute)?,
        })
    }

    /// Samples per beat at this tempo
    pub fn samples_per_beat(&self) -> f64 {
        self.rate.get_rate() * self.tempo.seconds_per_beat()
    }
}

/// Opaque identity of a timeline (e.g. a project id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextToken(pub String);

impl From<&str> for ContextToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Per-timeline tempo table.
///
/// Tempos are set once when a timeline is loaded. Looking up a timeline that
/// was never configured is an `InitOrder` error rather than a silent default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TempoRegistry {
    tempos: HashMap<ContextToken, TempoContext>,
}

impl TempoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure a timeline's tempo, returning the previous one
    pub fn set(
        &mut self,
        token: impl Into<ContextToken>,
        tempo: TempoContext,
    ) -> Option<TempoContext> {
        self.tempos.insert(token.into(), tempo)
    }

    pub fn tempo(&self, token: &ContextToken) -> Result<TempoContext> {
        self.tempos
            .get(token)
            .copied()
            .ok_or_else(|| {
                QuaverError::InitOrder(format!("no tempo set for timeline '{}'", token.0))
            })
    }

    pub fn get_bpm(&self, token: &ContextToken) -> Result<f64> {
        self.tempo(token).map(|t| t.get_bpm())
    }

    /// Full conversion context for a timeline at the given sample rate
    pub fn context(&self, token: &ContextToken, rate: RateContext) -> Result<TimeContext> {
        Ok(TimeContext::new(rate, self.tempo(token)?))
    }
}
