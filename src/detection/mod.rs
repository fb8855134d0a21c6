// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Detection module - per-tick scoring and crash verification

mod verifier;

pub use verifier::*;

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::analysis::{AnomalyScorer, FeatureVector};
use crate::config::DetectionConfig;
use crate::error::{CrashGuardError, Result};

/// What one detection tick produced
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Below the minimum speed: not scored, no window opened
    Skipped { speed: f64 },
    /// Scored without reaching a decision
    Scored { score: f64, state: VerifierState },
    /// Window expired and confirmed a crash
    Confirmed {
        score: Option<f64>,
        report: CrashReport,
    },
    /// Window expired without a crash
    Dismissed {
        score: Option<f64>,
        anomaly_ratio: f64,
        final_speed: f64,
    },
}

impl TickOutcome {
    /// Score computed this tick, if the tick was scored
    pub fn score(&self) -> Option<f64> {
        match self {
            TickOutcome::Skipped { .. } => None,
            TickOutcome::Scored { score, .. } => Some(*score),
            TickOutcome::Confirmed { score, .. } | TickOutcome::Dismissed { score, .. } => *score,
        }
    }

    pub fn is_crash(&self) -> bool {
        matches!(self, TickOutcome::Confirmed { .. })
    }
}

/// A scored tick kept in the rolling history
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoredSample {
    pub feature: FeatureVector,
    pub score: f64,
}

/// Scores features and drives the verifier; owns no sensors or timers
pub struct CrashDetector {
    scorer: Arc<dyn AnomalyScorer>,
    verifier: CrashVerifier,
    min_speed: f64,
    history: VecDeque<ScoredSample>,
    history_len: usize,
}

impl CrashDetector {
    pub fn new(scorer: Arc<dyn AnomalyScorer>, config: &DetectionConfig) -> Self {
        Self {
            scorer,
            verifier: CrashVerifier::new(config),
            min_speed: config.min_speed_for_crash_detection,
            history: VecDeque::with_capacity(config.score_history_len),
            history_len: config.score_history_len,
        }
    }

    /// Run one tick against `feature` observed at `now`
    ///
    /// Ticks below the minimum speed are never scored and never open or
    /// extend a window, but an open window still expires on them so its
    /// lifetime stays bounded.
    pub fn process(&mut self, feature: &FeatureVector, now: Instant) -> Result<TickOutcome> {
        if !feature.is_finite() {
            return Err(CrashGuardError::CycleFault(format!(
                "non-finite telemetry {:?}",
                feature
            )));
        }

        let score = if feature.speed >= self.min_speed {
            let score = self.scorer.score(feature);
            if !score.is_finite() {
                return Err(CrashGuardError::CycleFault(format!(
                    "scorer returned {} for {:?}",
                    score, feature
                )));
            }
            self.record(feature, score);
            self.verifier.observe(score, now);
            Some(score)
        } else {
            trace!("Speed {:.2} below {:.2}, tick not scored", feature.speed, self.min_speed);
            None
        };

        let outcome = match (self.verifier.check_expiry(feature.speed, now), score) {
            (Some(Verdict::Confirmed(report)), score) => TickOutcome::Confirmed { score, report },
            (
                Some(Verdict::Dismissed {
                    anomaly_ratio,
                    final_speed,
                }),
                score,
            ) => TickOutcome::Dismissed {
                score,
                anomaly_ratio,
                final_speed,
            },
            (None, Some(score)) => TickOutcome::Scored {
                score,
                state: self.verifier.state(),
            },
            (None, None) => TickOutcome::Skipped {
                speed: feature.speed,
            },
        };

        debug!("Tick outcome: {:?}", outcome);
        Ok(outcome)
    }

    fn record(&mut self, feature: &FeatureVector, score: f64) {
        if self.history_len == 0 {
            return;
        }
        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(ScoredSample {
            feature: *feature,
            score,
        });
    }

    pub fn state(&self) -> VerifierState {
        self.verifier.state()
    }

    pub fn window(&self) -> Option<&VerificationWindow> {
        self.verifier.window()
    }

    /// Recent scored ticks, oldest first
    pub fn score_history(&self) -> impl Iterator<Item = &ScoredSample> {
        self.history.iter()
    }

    /// Discard any open window without emitting a verdict
    pub fn cancel_verification(&mut self) {
        self.verifier.reset();
    }
}
