//! Binary random forest over edge feature vectors.
//!
//! Bagged CART trees with gini splits and sqrt-feature subsampling. The
//! classifier recognizes exactly the classes 0 (merge) and 1 (cut);
//! [`RandomForest::predict_proba`] returns P(cut) per row. Training fails
//! distinctly when a class has no labeled sample, so the orchestrator can
//! report missing label coverage as its own outcome.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

use agglo_core::FeatureMatrix;

/// Class value meaning "merge across this edge".
pub const LABEL_MERGE: u64 = 0;
/// Class value meaning "cut this edge".
pub const LABEL_CUT: u64 = 1;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("no labeled samples to train on")]
    NoSamples,

    #[error("got {labels} labels for {samples} samples")]
    LengthMismatch { samples: usize, labels: usize },

    #[error("label {0} is not one of the known classes (0, 1)")]
    UnknownLabel(u64),

    #[error("no label for classes {missing:?}")]
    MissingClasses { missing: Vec<u64> },
}

#[derive(Debug, Clone)]
pub struct RandomForestConfig {
    /// Number of bagged trees.
    pub n_estimators: usize,
    /// Depth limit per tree.
    pub max_depth: usize,
    /// Seed for bootstrap and feature subsampling.
    pub seed: u64,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 16,
            seed: 42,
        }
    }
}

#[derive(Debug)]
enum TreeNode {
    Leaf {
        p_cut: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            TreeNode::Leaf { p_cut } => *p_cut,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

/// A trained forest. Immutable once fit.
#[derive(Debug)]
pub struct RandomForest {
    trees: Vec<TreeNode>,
}

impl RandomForest {
    /// Train a forest on the labeled sample rows.
    ///
    /// Fails with [`TrainError::MissingClasses`] when one of the two classes
    /// has no sample at all; that condition is surfaced to callers as a
    /// distinct recompute outcome.
    pub fn fit(
        samples: &FeatureMatrix,
        labels: &[u64],
        config: &RandomForestConfig,
    ) -> Result<Self, TrainError> {
        if labels.len() != samples.rows() {
            return Err(TrainError::LengthMismatch {
                samples: samples.rows(),
                labels: labels.len(),
            });
        }
        if samples.is_empty() {
            return Err(TrainError::NoSamples);
        }
        for &label in labels {
            if label != LABEL_MERGE && label != LABEL_CUT {
                return Err(TrainError::UnknownLabel(label));
            }
        }
        let missing: Vec<u64> = [LABEL_MERGE, LABEL_CUT]
            .into_iter()
            .filter(|class| !labels.contains(class))
            .collect();
        if !missing.is_empty() {
            return Err(TrainError::MissingClasses { missing });
        }

        let n = samples.rows();
        let n_features = samples.cols();
        let features_per_split = (n_features as f64).sqrt().ceil() as usize;
        let features_per_split = features_per_split.clamp(1, n_features);

        let mut trees = Vec::with_capacity(config.n_estimators);
        for tree_index in 0..config.n_estimators {
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(tree_index as u64));
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            trees.push(build_tree(
                samples,
                labels,
                &bootstrap,
                features_per_split,
                config.max_depth,
                &mut rng,
            ));
        }

        debug!(
            trees = trees.len(),
            samples = n,
            features = n_features,
            "trained random forest"
        );
        Ok(Self { trees })
    }

    /// Average P(cut) over all trees, one value per feature row.
    pub fn predict_proba(&self, features: &FeatureMatrix) -> Vec<f64> {
        let scale = 1.0 / self.trees.len() as f64;
        features
            .iter_rows()
            .map(|row| self.trees.iter().map(|t| t.predict(row)).sum::<f64>() * scale)
            .collect()
    }
}

fn build_tree(
    samples: &FeatureMatrix,
    labels: &[u64],
    indices: &[usize],
    features_per_split: usize,
    depth_remaining: usize,
    rng: &mut StdRng,
) -> TreeNode {
    let cut_count = indices.iter().filter(|&&i| labels[i] == LABEL_CUT).count();
    let p_cut = cut_count as f64 / indices.len() as f64;

    if depth_remaining == 0 || indices.len() < 2 || cut_count == 0 || cut_count == indices.len() {
        return TreeNode::Leaf { p_cut };
    }

    let Some((feature, threshold)) =
        best_split(samples, labels, indices, features_per_split, rng)
    else {
        return TreeNode::Leaf { p_cut };
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| samples.row(i)[feature] <= threshold);
    if left_idx.is_empty() || right_idx.is_empty() {
        return TreeNode::Leaf { p_cut };
    }

    TreeNode::Split {
        feature,
        threshold,
        left: Box::new(build_tree(
            samples,
            labels,
            &left_idx,
            features_per_split,
            depth_remaining - 1,
            rng,
        )),
        right: Box::new(build_tree(
            samples,
            labels,
            &right_idx,
            features_per_split,
            depth_remaining - 1,
            rng,
        )),
    }
}

/// Pick the (feature, threshold) with the best gini gain among a random
/// feature subset. Returns `None` when no candidate split separates anything.
fn best_split(
    samples: &FeatureMatrix,
    labels: &[u64],
    indices: &[usize],
    features_per_split: usize,
    rng: &mut StdRng,
) -> Option<(usize, f64)> {
    let all_features: Vec<usize> = (0..samples.cols()).collect();
    let candidates: Vec<usize> = all_features
        .choose_multiple(rng, features_per_split)
        .copied()
        .collect();

    let parent_gini = gini(labels, indices);
    let mut best: Option<(usize, f64, f64)> = None;

    for &feature in &candidates {
        let mut values: Vec<(f64, u64)> = indices
            .iter()
            .map(|&i| (samples.row(i)[feature], labels[i]))
            .collect();
        values.sort_by(|x, y| x.0.total_cmp(&y.0));

        let total = values.len() as f64;
        let total_cut = values.iter().filter(|(_, l)| *l == LABEL_CUT).count() as f64;

        let mut left_n = 0.0;
        let mut left_cut = 0.0;
        for window in 0..values.len() - 1 {
            left_n += 1.0;
            if values[window].1 == LABEL_CUT {
                left_cut += 1.0;
            }
            // Only split between distinct feature values.
            if values[window].0 == values[window + 1].0 {
                continue;
            }

            let right_n = total - left_n;
            let right_cut = total_cut - left_cut;
            let weighted = (left_n / total) * gini_from_counts(left_n, left_cut)
                + (right_n / total) * gini_from_counts(right_n, right_cut);
            let gain = parent_gini - weighted;

            if gain > 1e-12 && best.map(|(_, _, g)| gain > g).unwrap_or(true) {
                let threshold = (values[window].0 + values[window + 1].0) / 2.0;
                best = Some((feature, threshold, gain));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

fn gini(labels: &[u64], indices: &[usize]) -> f64 {
    let n = indices.len() as f64;
    let cut = indices.iter().filter(|&&i| labels[i] == LABEL_CUT).count() as f64;
    gini_from_counts(n, cut)
}

fn gini_from_counts(n: f64, cut: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    let p = cut / n;
    2.0 * p * (1.0 - p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_data() -> (FeatureMatrix, Vec<u64>) {
        // Second feature separates the classes cleanly (>= 0.9 vs <= 0.2).
        let samples = FeatureMatrix::new(
            vec![
                0.5, 1.0, 0.5, //
                0.7, 0.9, 0.8, //
                0.3, 0.9, 0.2, //
                0.5, 0.2, 0.6, //
                0.4, 0.1, 0.3,
            ],
            5,
            3,
        );
        (samples, vec![0, 0, 0, 1, 1])
    }

    #[test]
    fn fit_and_predict_separable() {
        let (samples, labels) = separable_data();
        let forest = RandomForest::fit(&samples, &labels, &RandomForestConfig::default()).unwrap();

        let probs = forest.predict_proba(&samples);
        assert_eq!(probs.len(), 5);
        for p in &probs[..3] {
            assert!(*p < 0.5, "merge edge predicted as cut: {}", p);
        }
        for p in &probs[3..] {
            assert!(*p > 0.5, "cut edge predicted as merge: {}", p);
        }
    }

    #[test]
    fn fit_is_deterministic_for_a_seed() {
        let (samples, labels) = separable_data();
        let config = RandomForestConfig {
            n_estimators: 10,
            ..Default::default()
        };
        let a = RandomForest::fit(&samples, &labels, &config).unwrap();
        let b = RandomForest::fit(&samples, &labels, &config).unwrap();
        assert_eq!(a.predict_proba(&samples), b.predict_proba(&samples));
    }

    #[test]
    fn missing_class_is_a_distinct_error() {
        let samples = FeatureMatrix::new(vec![0.1, 0.2, 0.3, 0.4], 2, 2);
        let err = RandomForest::fit(&samples, &[0, 0], &RandomForestConfig::default()).unwrap_err();
        match err {
            TrainError::MissingClasses { missing } => assert_eq!(missing, vec![LABEL_CUT]),
            other => panic!("expected MissingClasses, got {:?}", other),
        }
    }

    #[test]
    fn empty_samples_fail() {
        let samples = FeatureMatrix::empty(3);
        assert!(matches!(
            RandomForest::fit(&samples, &[], &RandomForestConfig::default()),
            Err(TrainError::NoSamples)
        ));
    }

    #[test]
    fn unknown_label_fails() {
        let samples = FeatureMatrix::new(vec![0.1, 0.9], 2, 1);
        assert!(matches!(
            RandomForest::fit(&samples, &[0, 7], &RandomForestConfig::default()),
            Err(TrainError::UnknownLabel(7))
        ));
    }

    #[test]
    fn label_count_must_match_rows() {
        let samples = FeatureMatrix::new(vec![0.1, 0.9], 2, 1);
        assert!(matches!(
            RandomForest::fit(&samples, &[0], &RandomForestConfig::default()),
            Err(TrainError::LengthMismatch { .. })
        ));
    }
}
