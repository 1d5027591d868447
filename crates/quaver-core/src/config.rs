//! Session settings shared by a timeline's conversions

use serde::{Deserialize, Serialize};

use crate::context::{TimeContext, DEFAULT_BPM, DEFAULT_SAMPLE_RATE};
use crate::error::{QuaverError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    /// Sample step used when rendering curves
    #[serde(default = "default_resolution")]
    pub resolution: usize,
}

fn default_sample_rate() -> f64 {
    DEFAULT_SAMPLE_RATE
}

fn default_bpm() -> f64 {
    DEFAULT_BPM
}

fn default_resolution() -> usize {
    1
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            bpm: default_bpm(),
            resolution: default_resolution(),
        }
    }
}

impl SessionConfig {
    pub fn time_context(&self) -> Result<TimeContext> {
        TimeContext::from_scalars(self.sample_rate, self.bpm)
    }

    pub fn validate(&self) -> Result<()> {
        self.time_context()?;
        if self.resolution == 0 {
            return Err(QuaverError::value("resolution", "must be at least 1 sample"));
        }
        Ok(())
    }
}
