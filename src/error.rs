// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Error taxonomy for the detection engine
//!
//! Nothing in here is fatal. Sensor faults degrade to fallback values,
//! an unfitted model degrades to the neutral score, and a cycle fault only
//! costs the current tick.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, CrashGuardError>;

/// Errors raised by the crash detection engine
#[derive(Debug, Error)]
pub enum CrashGuardError {
    /// A speed or acceleration read failed or timed out
    #[error("sensor unavailable ({sensor}): {reason}")]
    SensorUnavailable {
        /// Which source failed ("speed" or "acceleration")
        sensor: &'static str,
        /// Human readable cause
        reason: String,
    },

    /// Scoring was requested from a forest with no trees
    #[error("isolation forest has not been fitted")]
    ModelNotFitted,

    /// Unexpected failure inside one detection tick
    #[error("detection cycle fault: {0}")]
    CycleFault(String),

    /// Configuration values that cannot drive a monitor
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Training corpus could not be loaded
    #[error("training corpus error: {0}")]
    Corpus(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CrashGuardError {
    /// Build a sensor fault
    pub fn sensor(sensor: &'static str, reason: impl Into<String>) -> Self {
        Self::SensorUnavailable {
            sensor,
            reason: reason.into(),
        }
    }
}
