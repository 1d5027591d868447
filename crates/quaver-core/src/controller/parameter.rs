//! Automatable parameters: what a controller's values mean and how a
//! generated curve is applied to a recording

use serde::{Deserialize, Serialize};

use super::MarkerValue;
use crate::error::{QuaverError, Result};
use crate::pitch::PitchValue;

/// Interleaved stereo
pub const CHANNELS: usize = 2;

/// A parameter a `Controller` can drive
pub trait Parameter {
    fn name(&self) -> &str;

    /// Reject values outside the parameter's domain
    fn validate(&self, value: &MarkerValue) -> Result<()>;

    /// Apply `curve` (frame index, value) to interleaved stereo `samples`.
    /// Indices are already resolved at the recording's rate. Frames outside
    /// the curve are left untouched.
    fn apply(&self, curve: &[(i64, f64)], samples: &mut [f32]) -> Result<()>;
}

fn scalar_in_range(name: &str, value: &MarkerValue, min: f64, max: f64) -> Result<()> {
    let MarkerValue::Scalar(v) = *value else {
        return Err(QuaverError::value(name, "expects a plain number, not a pitch"));
    };
    if !(min..=max).contains(&v) {
        return Err(QuaverError::value(name, format!("{v} outside {min}..={max}")));
    }
    Ok(())
}

/// Check that every curve index addresses a frame of `samples`
fn check_span(curve: &[(i64, f64)], samples: &[f32]) -> Result<()> {
    let frames = (samples.len() / CHANNELS) as i64;
    for &(index, _) in [curve.first(), curve.last()].into_iter().flatten() {
        if index < 0 || index >= frames {
            return Err(QuaverError::Index { index });
        }
    }
    Ok(())
}

/// Multiplicative gain. Curve values are clamped to `0..=max_gain`, so a
/// smooth fit overshooting between markers never inverts the signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub max_gain: f64,
}

impl Default for Volume {
    fn default() -> Self {
        Self { max_gain: 16.0 }
    }
}

impl Parameter for Volume {
    fn name(&self) -> &str {
        "volume"
    }

    fn validate(&self, value: &MarkerValue) -> Result<()> {
        scalar_in_range(self.name(), value, 0.0, self.max_gain)
    }

    fn apply(&self, curve: &[(i64, f64)], samples: &mut [f32]) -> Result<()> {
        check_span(curve, samples)?;
        for &(frame, gain) in curve {
            let gain = gain.min(self.max_gain).max(0.0);
            let start = frame as usize * CHANNELS;
            for sample in &mut samples[start..start + CHANNELS] {
                *sample *= gain as f32;
            }
        }
        Ok(())
    }
}

/// Stereo balance (-1.0 left, 0.0 centre, 1.0 right). The curve value is an
/// offset from centre, clamped to -1.0..=1.0: the opposite channel is
/// attenuated, the near one kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pan;

impl Parameter for Pan {
    fn name(&self) -> &str {
        "pan"
    }

    fn validate(&self, value: &MarkerValue) -> Result<()> {
        scalar_in_range(self.name(), value, -1.0, 1.0)
    }

    fn apply(&self, curve: &[(i64, f64)], samples: &mut [f32]) -> Result<()> {
        check_span(curve, samples)?;
        for &(frame, pan) in curve {
            let pan = pan.clamp(-1.0, 1.0);
            let start = frame as usize * CHANNELS;
            samples[start] *= (1.0 - pan).min(1.0) as f32;
            samples[start + 1] *= (1.0 + pan).min(1.0) as f32;
        }
        Ok(())
    }
}

/// Varispeed pitch bend relative to `reference`: a curve value of twice the
/// reference frequency plays the covered region an octave up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitchBend {
    pub reference: PitchValue,
}

impl PitchBend {
    pub fn new(reference: PitchValue) -> Self {
        Self { reference }
    }
}

impl Parameter for PitchBend {
    fn name(&self) -> &str {
        "pitch"
    }

    fn validate(&self, value: &MarkerValue) -> Result<()> {
        match value {
            MarkerValue::Pitch(_) => Ok(()),
            MarkerValue::Scalar(_) => {
                Err(QuaverError::value(self.name(), "expects a pitch, not a plain number"))
            }
        }
    }

    fn apply(&self, curve: &[(i64, f64)], samples: &mut [f32]) -> Result<()> {
        check_span(curve, samples)?;
        let Some(&(first, _)) = curve.first() else {
            return Ok(());
        };
        let source = samples.to_vec();
        let frames = source.len() / CHANNELS;
        let reference = self.reference.hz();

        let mut position = first as f64;
        for &(frame, hz) in curve {
            let base = position.floor() as usize;
            let frac = (position - base as f64) as f32;
            let out = frame as usize * CHANNELS;
            for ch in 0..CHANNELS {
                let read = |i: usize| if i < frames { source[i * CHANNELS + ch] } else { 0.0 };
                samples[out + ch] = read(base) * (1.0 - frac) + read(base + 1) * frac;
            }
            position += hz.max(0.0) / reference;
        }
        Ok(())
    }
}
