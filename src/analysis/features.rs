// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Telemetry feature vectors and the normal-driving training corpus

use std::path::Path;

use rand::prelude::*;
use rand_distr::{LogNormal, Normal};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CrashGuardError, Result};

/// Feature dimension a partition node splits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    Speed,
    Motion,
    DeltaSpeed,
}

impl Feature {
    pub const ALL: [Feature; 3] = [Feature::Speed, Feature::Motion, Feature::DeltaSpeed];
}

/// One telemetry snapshot
///
/// `speed` is in m/s, `motion` is the acceleration magnitude in m/s²,
/// `delta_speed` is the change in speed since the previous sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub speed: f64,
    pub motion: f64,
    pub delta_speed: f64,
}

impl FeatureVector {
    pub fn new(speed: f64, motion: f64, delta_speed: f64) -> Self {
        Self {
            speed,
            motion,
            delta_speed,
        }
    }

    #[inline]
    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Speed => self.speed,
            Feature::Motion => self.motion,
            Feature::DeltaSpeed => self.delta_speed,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.speed.is_finite() && self.motion.is_finite() && self.delta_speed.is_finite()
    }
}

/// Ordered collection of normal-driving samples
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingCorpus {
    samples: Vec<FeatureVector>,
}

impl TrainingCorpus {
    pub fn new(samples: Vec<FeatureVector>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[FeatureVector] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Load a JSON array of `{speed, motion, deltaSpeed}` objects
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let corpus: TrainingCorpus = serde_json::from_str(&content)?;

        if let Some(bad) = corpus.samples.iter().position(|s| !s.is_finite()) {
            return Err(CrashGuardError::Corpus(format!(
                "sample {} in {:?} is not finite",
                bad, path
            )));
        }

        info!("Loaded {} training samples from {:?}", corpus.len(), path);
        Ok(corpus)
    }

    /// Generate ordinary driving clustered around moderate speeds and gentle motion
    pub fn synthetic_normal_driving<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Self {
        let speed_dist = Normal::new(30.0, 8.0).unwrap();
        let motion_dist = LogNormal::new(0.1, 0.3).unwrap();
        // Mostly steady cruising, occasionally firmer acceleration or braking
        let steady = Normal::new(0.0, 0.5).unwrap();
        let firm = Normal::new(0.0, 1.5).unwrap();

        let samples = (0..n)
            .map(|_| {
                let speed: f64 = speed_dist.sample(rng);
                let motion: f64 = motion_dist.sample(rng);
                let delta: f64 = if rng.gen_bool(0.9) {
                    steady.sample(rng)
                } else {
                    firm.sample(rng)
                };
                FeatureVector::new(
                    speed.clamp(10.0, 50.0),
                    motion.clamp(0.5, 2.2),
                    delta.clamp(-2.5, 2.5),
                )
            })
            .collect();

        Self { samples }
    }
}

impl From<Vec<FeatureVector>> for TrainingCorpus {
    fn from(samples: Vec<FeatureVector>) -> Self {
        Self::new(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_feature_access() {
        let v = FeatureVector::new(12.0, 1.5, -0.5);
        assert_eq!(v.get(Feature::Speed), 12.0);
        assert_eq!(v.get(Feature::Motion), 1.5);
        assert_eq!(v.get(Feature::DeltaSpeed), -0.5);
        assert!(v.is_finite());
        assert!(!FeatureVector::new(f64::NAN, 0.0, 0.0).is_finite());
    }

    #[test]
    fn test_synthetic_corpus_stays_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let corpus = TrainingCorpus::synthetic_normal_driving(&mut rng, 400);
        assert_eq!(corpus.len(), 400);
        for s in corpus.samples() {
            assert!((10.0..=50.0).contains(&s.speed));
            assert!((0.5..=2.2).contains(&s.motion));
            assert!((-2.5..=2.5).contains(&s.delta_speed));
        }
    }

    #[test]
    fn test_load_json_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(
            &path,
            r#"[{"speed": 20.0, "motion": 1.0, "deltaSpeed": 0.5},
                {"speed": 30.0, "motion": 1.2, "deltaSpeed": -0.2}]"#,
        )
        .unwrap();

        let corpus = TrainingCorpus::load(&path).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.samples()[1].delta_speed, -0.2);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(TrainingCorpus::load(&path), Err(CrashGuardError::Json(_))));
    }
}
