// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Isolation Forest over telemetry feature vectors
//!
//! Anomalies are isolated by random axis-aligned splits in fewer steps than
//! normal points. Each tree is grown on a bootstrap subsample; the score of
//! a vector is `2^(-E[h(x)] / c(n))` where `h(x)` is the leaf depth plus the
//! expected depth of the unresolved subtree below that leaf.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, warn};

use super::features::{Feature, FeatureVector, TrainingCorpus};
use crate::config::ModelConfig;
use crate::error::{CrashGuardError, Result};

/// Euler–Mascheroni constant
const EULER_GAMMA: f64 = 0.5772156649;

/// Score returned when the forest cannot discriminate
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Average path length of an unsuccessful BST search over `n` points
///
/// `c(n) = 2(ln(n-1) + γ) - 2(n-1)/n`, and `0` for `n <= 1`.
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}

/// Forest construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestParams {
    pub num_trees: usize,
    pub subsample_size: usize,
    pub max_depth: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            num_trees: 100,
            subsample_size: 256,
            max_depth: 12,
        }
    }
}

impl From<&ModelConfig> for ForestParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            num_trees: config.num_trees,
            subsample_size: config.subsample_size,
            max_depth: config.max_tree_depth,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Internal {
        feature: Feature,
        split: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

/// Uniform threshold in the open interval `(min, max)`, requires `min < max`
///
/// Both sides of a split at the returned value are non-empty.
fn draw_split<R: Rng + ?Sized>(min: f64, max: f64, rng: &mut R) -> f64 {
    let split = rng.gen_range(min..max);
    if split > min {
        return split;
    }
    // Drew the lower bound itself
    let mid = min + (max - min) / 2.0;
    if mid > min {
        mid
    } else {
        max
    }
}

/// One randomized partition tree
#[derive(Debug, Clone)]
pub struct PartitionTree {
    root: Node,
}

impl PartitionTree {
    fn grow<R: Rng + ?Sized>(sample: &[FeatureVector], max_depth: usize, rng: &mut R) -> Self {
        Self {
            root: Self::build_node(sample, 0, max_depth, rng),
        }
    }

    fn build_node<R: Rng + ?Sized>(
        data: &[FeatureVector],
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> Node {
        if depth >= max_depth || data.len() <= 1 {
            return Node::Leaf { size: data.len() };
        }

        let feature = Feature::ALL[rng.gen_range(0..Feature::ALL.len())];

        let (min, max) = data.iter().map(|v| v.get(feature)).fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), x| (lo.min(x), hi.max(x)),
        );

        // Constant along the chosen axis: no split separates anything
        if !(max > min) {
            return Node::Leaf { size: data.len() };
        }

        let split = draw_split(min, max, rng);

        let (left, right): (Vec<FeatureVector>, Vec<FeatureVector>) =
            data.iter().copied().partition(|v| v.get(feature) < split);

        Node::Internal {
            feature,
            split,
            left: Box::new(Self::build_node(&left, depth + 1, max_depth, rng)),
            right: Box::new(Self::build_node(&right, depth + 1, max_depth, rng)),
        }
    }

    /// Isolation depth of `x`, corrected by the size of the leaf it lands in
    pub fn path_length(&self, x: &FeatureVector) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;

        loop {
            match node {
                Node::Internal {
                    feature,
                    split,
                    left,
                    right,
                } => {
                    node = if x.get(*feature) < *split { left.as_ref() } else { right.as_ref() };
                    depth += 1;
                }
                Node::Leaf { size } => {
                    return depth as f64 + average_path_length(*size);
                }
            }
        }
    }

    /// Height of the tree in edges
    pub fn depth(&self) -> usize {
        fn height(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Internal { left, right, .. } => 1 + height(left).max(height(right)),
            }
        }
        height(&self.root)
    }

    pub fn leaf_count(&self) -> usize {
        fn leaves(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Internal { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        leaves(&self.root)
    }

    /// Total number of samples recorded in the leaves
    pub fn sample_count(&self) -> usize {
        fn count(node: &Node) -> usize {
            match node {
                Node::Leaf { size } => *size,
                Node::Internal { left, right, .. } => count(left) + count(right),
            }
        }
        count(&self.root)
    }
}

/// Ensemble of partition trees, read-only once fitted
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<PartitionTree>,
    params: ForestParams,
    normalization: f64,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::unfitted(ForestParams::default())
    }
}

impl IsolationForest {
    /// A forest with no trees; every score is neutral
    pub fn unfitted(params: ForestParams) -> Self {
        Self {
            trees: Vec::new(),
            params,
            normalization: average_path_length(params.subsample_size),
        }
    }

    /// Fit a forest drawing all randomness from `rng`
    ///
    /// Per-tree seeds are drawn from `rng` in order, so a seeded generator
    /// produces the same forest regardless of how rayon schedules the trees.
    pub fn fit<R: Rng + ?Sized>(corpus: &TrainingCorpus, params: ForestParams, rng: &mut R) -> Self {
        if corpus.is_empty() {
            warn!("Empty training corpus, isolation forest left without trees");
            return Self::unfitted(params);
        }

        let data = corpus.samples();
        let sample_size = params.subsample_size.min(data.len());
        let seeds: Vec<u64> = (0..params.num_trees).map(|_| rng.gen()).collect();

        let trees: Vec<PartitionTree> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut tree_rng = ChaCha8Rng::seed_from_u64(seed);
                let sample: Vec<FeatureVector> = (0..sample_size)
                    .map(|_| data[tree_rng.gen_range(0..data.len())])
                    .collect();
                PartitionTree::grow(&sample, params.max_depth, &mut tree_rng)
            })
            .collect();

        let forest = Self {
            trees,
            params,
            normalization: average_path_length(params.subsample_size),
        };

        debug!(
            "Fitted isolation forest: {} trees, subsample {}, max depth {}, c(n)={:.4}",
            forest.trees.len(),
            sample_size,
            params.max_depth,
            forest.normalization
        );

        forest
    }

    /// Fit reproducibly from a seed
    pub fn fit_seeded(corpus: &TrainingCorpus, params: ForestParams, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self::fit(corpus, params, &mut rng)
    }

    /// Fit from model configuration, seeded when the config carries a seed
    pub fn from_config(corpus: &TrainingCorpus, config: &ModelConfig) -> Self {
        let params = ForestParams::from(config);
        match config.seed {
            Some(seed) => Self::fit_seeded(corpus, params, seed),
            None => Self::fit(corpus, params, &mut ChaCha8Rng::from_entropy()),
        }
    }

    /// Anomaly score in `[0, 1]`; neutral when the forest has no trees
    pub fn score(&self, x: &FeatureVector) -> f64 {
        match self.try_score(x) {
            Ok(score) => score,
            Err(e) => {
                debug!("{}, returning neutral score", e);
                NEUTRAL_SCORE
            }
        }
    }

    /// Like [`score`](Self::score) but reports an unfitted forest
    pub fn try_score(&self, x: &FeatureVector) -> Result<f64> {
        if self.trees.is_empty() {
            return Err(CrashGuardError::ModelNotFitted);
        }
        if self.normalization <= 0.0 {
            return Ok(NEUTRAL_SCORE);
        }

        let mean_path = self.mean_path_length(x);
        let score = 2.0_f64.powf(-mean_path / self.normalization);

        Ok(if score.is_nan() { NEUTRAL_SCORE } else { score.clamp(0.0, 1.0) })
    }

    /// `E[h(x)]` across all trees
    pub fn mean_path_length(&self, x: &FeatureVector) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[PartitionTree] {
        &self.trees
    }

    pub fn params(&self) -> ForestParams {
        self.params
    }

    /// Cached `c(subsample_size)`
    pub fn normalization(&self) -> f64 {
        self.normalization
    }

    /// Height of the tallest tree
    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(PartitionTree::depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn driving_corpus(seed: u64) -> TrainingCorpus {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        TrainingCorpus::synthetic_normal_driving(&mut rng, 512)
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert!((average_path_length(2) - 0.1544313298).abs() < 1e-9);
        assert!((average_path_length(256) - 10.244770920).abs() < 1e-6);
    }

    #[test]
    fn test_unfitted_forest_is_neutral() {
        let forest = IsolationForest::default();
        assert!(!forest.is_fitted());
        assert_eq!(forest.score(&FeatureVector::new(30.0, 1.0, 0.0)), NEUTRAL_SCORE);
        assert_eq!(forest.score(&FeatureVector::new(0.0, 80.0, -40.0)), NEUTRAL_SCORE);
        assert!(matches!(
            forest.try_score(&FeatureVector::new(1.0, 1.0, 1.0)),
            Err(CrashGuardError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_empty_corpus_fits_zero_trees() {
        let forest = IsolationForest::fit_seeded(&TrainingCorpus::default(), ForestParams::default(), 1);
        assert_eq!(forest.num_trees(), 0);
        assert_eq!(forest.score(&FeatureVector::new(12.0, 3.0, 1.0)), NEUTRAL_SCORE);
    }

    #[test]
    fn test_trees_respect_max_depth() {
        let corpus = driving_corpus(3);
        for max_depth in [1, 4, 12] {
            let params = ForestParams {
                num_trees: 25,
                subsample_size: 256,
                max_depth,
            };
            let forest = IsolationForest::fit_seeded(&corpus, params, 11);
            assert_eq!(forest.num_trees(), 25);
            for tree in forest.trees() {
                assert!(tree.depth() <= max_depth);
                assert_eq!(tree.sample_count(), 256);
            }
        }
    }

    #[test]
    fn test_outlier_scores_above_cluster_member() {
        let forest = IsolationForest::fit_seeded(&driving_corpus(42), ForestParams::default(), 42);

        let typical = forest.score(&FeatureVector::new(30.0, 1.0, 0.0));
        let impact = forest.score(&FeatureVector::new(0.0, 50.0, -45.0));

        assert!(typical < impact, "typical {typical} vs impact {impact}");
        assert!(impact > 0.65, "impact {impact}");
        assert!(typical < 0.55, "typical {typical}");
    }

    fn smallest_leaf(node: &Node) -> usize {
        match node {
            Node::Leaf { size } => *size,
            Node::Internal { left, right, .. } => smallest_leaf(left).min(smallest_leaf(right)),
        }
    }

    #[test]
    fn test_split_lies_strictly_above_min() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for _ in 0..200 {
            let split = draw_split(0.0, 10.0, &mut rng);
            assert!(split > 0.0 && split < 10.0);
        }

        // Adjacent floats: the only value in [lo, hi) is lo itself
        let lo = 1.0_f64;
        let hi = f64::from_bits(lo.to_bits() + 1);
        for _ in 0..20 {
            let split = draw_split(lo, hi, &mut rng);
            assert!(split > lo && split <= hi);
        }

        let data = [FeatureVector::new(lo, lo, lo), FeatureVector::new(hi, hi, hi)];
        let tree = PartitionTree::grow(&data, 12, &mut rng);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(smallest_leaf(&tree.root), 1);
    }

    #[test]
    fn test_fitted_trees_have_no_empty_leaves() {
        let forest = IsolationForest::fit_seeded(&driving_corpus(12), ForestParams::default(), 12);
        for tree in forest.trees() {
            assert!(smallest_leaf(&tree.root) >= 1);
        }
    }

    /// Counts WARN events seen by the current dispatcher
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_unfitted_scoring_warns_only_at_fit() {
        use tracing_subscriber::prelude::*;

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let forest =
                IsolationForest::fit_seeded(&TrainingCorpus::default(), ForestParams::default(), 1);
            for _ in 0..20 {
                assert_eq!(forest.score(&FeatureVector::new(12.0, 1.0, 0.0)), NEUTRAL_SCORE);
            }
        });

        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_seeded_fit_is_reproducible() {
        let corpus = driving_corpus(5);
        let a = IsolationForest::fit_seeded(&corpus, ForestParams::default(), 99);
        let b = IsolationForest::fit_seeded(&corpus, ForestParams::default(), 99);

        for probe in [
            FeatureVector::new(25.0, 1.3, 0.4),
            FeatureVector::new(2.5, 20.0, -15.0),
            FeatureVector::new(49.0, 0.6, 2.0),
        ] {
            assert_eq!(a.score(&probe), b.score(&probe));
        }
    }

    #[test]
    fn test_constant_corpus_scores_neutral() {
        let corpus = TrainingCorpus::new(vec![FeatureVector::new(20.0, 1.0, 0.0); 300]);
        let forest = IsolationForest::fit_seeded(&corpus, ForestParams::default(), 8);

        // Every root is a leaf holding the full subsample, so h(x) = c(256)
        for tree in forest.trees() {
            assert_eq!(tree.leaf_count(), 1);
        }
        let score = forest.score(&FeatureVector::new(90.0, 9.0, 9.0));
        assert!((score - NEUTRAL_SCORE).abs() < 1e-12);
    }

    #[test]
    fn test_small_corpus_subsample_capped() {
        let corpus = TrainingCorpus::new(vec![
            FeatureVector::new(10.0, 1.0, 0.0),
            FeatureVector::new(20.0, 1.5, 0.5),
            FeatureVector::new(30.0, 2.0, -0.5),
        ]);
        let forest = IsolationForest::fit_seeded(&corpus, ForestParams::default(), 2);
        for tree in forest.trees() {
            assert_eq!(tree.sample_count(), 3);
        }
    }

    proptest! {
        #[test]
        fn prop_score_is_bounded(
            speed in 0.0f64..200.0,
            motion in 0.0f64..500.0,
            delta in -200.0f64..200.0,
        ) {
            let corpus = TrainingCorpus::new(vec![
                FeatureVector::new(15.0, 1.0, 0.2),
                FeatureVector::new(22.0, 1.8, -0.4),
                FeatureVector::new(35.0, 0.9, 1.1),
                FeatureVector::new(41.0, 2.1, -1.3),
                FeatureVector::new(28.0, 1.2, 0.0),
            ]);
            let params = ForestParams { num_trees: 10, subsample_size: 256, max_depth: 12 };
            let forest = IsolationForest::fit_seeded(&corpus, params, 17);
            let score = forest.score(&FeatureVector::new(speed, motion, delta));
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
