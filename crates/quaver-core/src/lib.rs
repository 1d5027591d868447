//! quaver-core: Musical time, pitch, and parameter automation

pub mod config;
mod context;
pub mod controller;
mod error;
mod pitch;
mod time;

pub use config::SessionConfig;
pub use context::{
    ContextToken, RateContext, TempoContext, TempoRegistry, TimeContext, DEFAULT_BPM,
    DEFAULT_SAMPLE_RATE,
};
pub use controller::{
    Controller, ControllerMarker, ControllerRecord, CurveState, MarkerRecord, MarkerValue,
    MoveOutcome, Pan, Parameter, PitchBend, SharedController, Transition, Volume,
};
pub use error::{QuaverError, Result};
pub use pitch::{PitchClass, PitchValue, A4_FREQ, MAX_CENTS, MAX_OCTAVE, PITCH_EPSILON_HZ};
pub use time::{ParseMode, Quantity, TimeRecord, TimeUnit, TimeValue};
