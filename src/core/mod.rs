// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Core engine module - wires the model, sensors and verifier together

mod engine;
mod event_bus;

pub use engine::{CrashMonitor, FnTrigger, LogTrigger, MonitorStats, TriggerSink};
pub use event_bus::{EventBus, EventPayload, MonitorEvent};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::analysis::{IsolationForest, TrainingCorpus};
use crate::config::ModelConfig;
use crate::error::{CrashGuardError, Result};

/// Build the training corpus named by the model configuration
///
/// Loads `corpus_path` when set, otherwise generates synthetic normal
/// driving (seeded from `seed` when present).
pub fn load_corpus(model: &ModelConfig) -> Result<TrainingCorpus> {
    let corpus = match &model.corpus_path {
        Some(path) => TrainingCorpus::load(path)?,
        None => {
            let mut rng = match model.seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            info!(
                "Generating {} synthetic normal-driving samples",
                model.synthetic_corpus_size
            );
            TrainingCorpus::synthetic_normal_driving(&mut rng, model.synthetic_corpus_size)
        }
    };

    if corpus.is_empty() {
        return Err(CrashGuardError::Corpus("training corpus is empty".into()));
    }
    Ok(corpus)
}

/// Load or generate the corpus and fit a forest on it
pub fn train_forest(model: &ModelConfig) -> Result<IsolationForest> {
    let corpus = load_corpus(model)?;
    let forest = IsolationForest::from_config(&corpus, model);
    info!(
        "Anomaly model ready: {} trees over {} samples",
        forest.num_trees(),
        corpus.len()
    );
    Ok(forest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FeatureVector;
    use std::io::Write;

    #[test]
    fn test_train_from_synthetic_corpus() {
        let model = ModelConfig {
            num_trees: 20,
            seed: Some(9),
            ..ModelConfig::default()
        };
        let forest = train_forest(&model).unwrap();
        assert!(forest.is_fitted());
        assert_eq!(forest.num_trees(), 20);

        let again = train_forest(&model).unwrap();
        let x = FeatureVector::new(4.0, 30.0, -9.0);
        assert_eq!(forest.score(&x), again.score(&x));
    }

    #[test]
    fn test_train_from_corpus_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"speed": 20.0, "motion": 1.1, "deltaSpeed": 0.2}},
                {{"speed": 22.0, "motion": 0.9, "deltaSpeed": -0.4}},
                {{"speed": 21.0, "motion": 1.0, "deltaSpeed": 0.1}}]"#
        )
        .unwrap();

        let model = ModelConfig {
            corpus_path: Some(file.path().to_path_buf()),
            seed: Some(1),
            ..ModelConfig::default()
        };
        assert_eq!(load_corpus(&model).unwrap().len(), 3);
        assert!(train_forest(&model).unwrap().is_fitted());
    }

    #[test]
    fn test_empty_corpus_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();

        let model = ModelConfig {
            corpus_path: Some(file.path().to_path_buf()),
            ..ModelConfig::default()
        };
        assert!(matches!(
            train_forest(&model),
            Err(CrashGuardError::Corpus(_))
        ));
    }
}
