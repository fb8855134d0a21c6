// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Analysis module - telemetry features and anomaly scoring

mod features;
mod isolation_forest;

pub use features::*;
pub use isolation_forest::*;

/// Maps a telemetry snapshot to an anomaly score in `[0, 1]`
///
/// Implementations must be pure: scoring never mutates model state, so one
/// fitted model can be shared across monitors.
pub trait AnomalyScorer: Send + Sync {
    fn score(&self, feature: &FeatureVector) -> f64;

    /// Whether the scorer can discriminate at all
    fn is_fitted(&self) -> bool {
        true
    }
}

impl AnomalyScorer for IsolationForest {
    fn score(&self, feature: &FeatureVector) -> f64 {
        IsolationForest::score(self, feature)
    }

    fn is_fitted(&self) -> bool {
        IsolationForest::is_fitted(self)
    }
}
