//! Error types for quaver

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuaverError {
    #[error("Cannot parse '{input}': {reason}")]
    Parse { input: String, reason: String },
    #[error("Value out of range for {what}: {bound}")]
    Value { what: String, bound: String },
    #[error("Invalid sample index: {index}")]
    Index { index: i64 },
    #[error("Controller '{controller}' needs at least 2 distinct markers, has {markers}")]
    InsufficientData { controller: String, markers: usize },
    #[error("Context not configured: {0}")]
    InitOrder(String),
    #[error("No marker at {time}")]
    NotFound { time: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QuaverError {
    pub(crate) fn parse(input: &str, reason: impl Into<String>) -> Self {
        Self::Parse { input: input.to_string(), reason: reason.into() }
    }

    pub(crate) fn value(what: impl Into<String>, bound: impl Into<String>) -> Self {
        Self::Value { what: what.into(), bound: bound.into() }
    }
}

pub type Result<T> = std::result::Result<T, QuaverError>;
