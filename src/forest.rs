//! Random forest for binary risk classification
//!
//! An ensemble of CART decision trees trained on bootstrap samples, with
//! Gini-impurity splits over a random sqrt-sized feature subset per node and
//! feature-importance tracking (total Gini decrease, normalized). All
//! randomness flows from a single `u64` seed, so repeated runs over the same
//! data produce an identical ensemble and identical metrics.
//!
//! # References
//!
//! Breiman, L. (2001). Random forests. Machine Learning, 45(1), 5-32.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of trees in the ensemble
pub const DEFAULT_TREE_COUNT: usize = 100;

/// Default depth limit per tree
pub const DEFAULT_MAX_DEPTH: usize = 12;

#[derive(Error, Debug)]
pub enum ForestError {
    #[error("training requires at least {required} samples, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("labels and samples differ in length: {labels} vs {samples}")]
    LengthMismatch { labels: usize, samples: usize },

    #[error("sample width {actual} does not match trained width {expected}")]
    FeatureWidthMismatch { expected: usize, actual: usize },

    #[error("label {0} is not binary (expected 0 or 1)")]
    NonBinaryLabel(u8),

    #[error("model not fitted")]
    NotFitted,
}

pub type Result<T> = std::result::Result<T, ForestError>;

/// A node in one decision tree
#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Internal {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    Leaf {
        probability: f64,
        samples: usize,
    },
}

impl TreeNode {
    fn probability(&self, sample: &[f64]) -> f64 {
        match self {
            TreeNode::Internal {
                feature_idx,
                threshold,
                left,
                right,
            } => {
                if sample[*feature_idx] < *threshold {
                    left.probability(sample)
                } else {
                    right.probability(sample)
                }
            }
            TreeNode::Leaf { probability, .. } => *probability,
        }
    }
}

/// Single CART tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: TreeNode,
}

/// Candidate split chosen for one node
struct Split {
    feature_idx: usize,
    threshold: f64,
    impurity_decrease: f64,
}

/// Gini impurity of a node holding `positives` of `total` samples
fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

impl DecisionTree {
    fn build(
        samples: &[Vec<f64>],
        labels: &[u8],
        rows: &[usize],
        max_depth: usize,
        rng: &mut StdRng,
        importance: &mut [f64],
    ) -> Self {
        let n_features = samples[0].len();
        let root = Self::build_node(samples, labels, rows, 0, max_depth, n_features, rng, importance);
        DecisionTree { root }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_node(
        samples: &[Vec<f64>],
        labels: &[u8],
        rows: &[usize],
        depth: usize,
        max_depth: usize,
        n_features: usize,
        rng: &mut StdRng,
        importance: &mut [f64],
    ) -> TreeNode {
        let positives = rows.iter().filter(|&&i| labels[i] == 1).count();
        let leaf = |positives: usize| TreeNode::Leaf {
            probability: if rows.is_empty() {
                0.0
            } else {
                positives as f64 / rows.len() as f64
            },
            samples: rows.len(),
        };

        if depth >= max_depth || rows.len() < 2 || positives == 0 || positives == rows.len() {
            return leaf(positives);
        }

        let split = match Self::best_split(samples, labels, rows, n_features, rng) {
            Some(s) => s,
            None => return leaf(positives),
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .copied()
            .partition(|&i| samples[i][split.feature_idx] < split.threshold);
        if left_rows.is_empty() || right_rows.is_empty() {
            return leaf(positives);
        }

        importance[split.feature_idx] += split.impurity_decrease * rows.len() as f64;

        let left = Box::new(Self::build_node(
            samples, labels, &left_rows, depth + 1, max_depth, n_features, rng, importance,
        ));
        let right = Box::new(Self::build_node(
            samples, labels, &right_rows, depth + 1, max_depth, n_features, rng, importance,
        ));
        TreeNode::Internal {
            feature_idx: split.feature_idx,
            threshold: split.threshold,
            left,
            right,
        }
    }

    /// Best Gini split over a random sqrt-sized feature subset
    fn best_split(
        samples: &[Vec<f64>],
        labels: &[u8],
        rows: &[usize],
        n_features: usize,
        rng: &mut StdRng,
    ) -> Option<Split> {
        let subset_size = ((n_features as f64).sqrt().ceil() as usize).max(1);
        let mut candidates: Vec<usize> = (0..n_features).collect();
        candidates.shuffle(rng);
        candidates.truncate(subset_size);

        let total = rows.len();
        let total_pos = rows.iter().filter(|&&i| labels[i] == 1).count();
        let parent_gini = gini(total_pos, total);

        let mut best: Option<Split> = None;
        for &feature_idx in &candidates {
            let mut ordered: Vec<(f64, u8)> = rows
                .iter()
                .map(|&i| (samples[i][feature_idx], labels[i]))
                .collect();
            ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut left_count = 0usize;
            let mut left_pos = 0usize;
            for w in 0..total - 1 {
                left_count += 1;
                left_pos += ordered[w].1 as usize;
                // Only cut between distinct feature values
                if ordered[w].0 == ordered[w + 1].0 {
                    continue;
                }
                let right_count = total - left_count;
                let right_pos = total_pos - left_pos;
                let weighted = (left_count as f64 * gini(left_pos, left_count)
                    + right_count as f64 * gini(right_pos, right_count))
                    / total as f64;
                let decrease = parent_gini - weighted;
                if decrease > 1e-12
                    && best
                        .as_ref()
                        .map(|b| decrease > b.impurity_decrease)
                        .unwrap_or(true)
                {
                    best = Some(Split {
                        feature_idx,
                        threshold: (ordered[w].0 + ordered[w + 1].0) / 2.0,
                        impurity_decrease: decrease,
                    });
                }
            }
        }
        best
    }

    fn probability(&self, sample: &[f64]) -> f64 {
        self.root.probability(sample)
    }
}

/// Bagged ensemble of decision trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_trees: usize,
    pub max_depth: usize,
    pub seed: u64,
    n_features: usize,
    feature_importance: Vec<f64>,
}

impl RandomForest {
    pub fn new(n_trees: usize, max_depth: usize, seed: u64) -> Self {
        Self {
            trees: Vec::new(),
            n_trees,
            max_depth,
            seed,
            n_features: 0,
            feature_importance: Vec::new(),
        }
    }

    /// Train on row-major feature vectors and binary labels
    pub fn fit(&mut self, samples: &[Vec<f64>], labels: &[u8]) -> Result<()> {
        if samples.len() != labels.len() {
            return Err(ForestError::LengthMismatch {
                labels: labels.len(),
                samples: samples.len(),
            });
        }
        if samples.len() < 2 {
            return Err(ForestError::InsufficientData {
                required: 2,
                actual: samples.len(),
            });
        }
        if let Some(&bad) = labels.iter().find(|&&l| l > 1) {
            return Err(ForestError::NonBinaryLabel(bad));
        }

        let n = samples.len();
        self.n_features = samples[0].len();
        self.trees.clear();
        self.feature_importance = vec![0.0; self.n_features];

        let mut rng = StdRng::seed_from_u64(self.seed);
        for _ in 0..self.n_trees {
            // Bootstrap sample: n draws with replacement
            let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let tree = DecisionTree::build(
                samples,
                labels,
                &rows,
                self.max_depth,
                &mut rng,
                &mut self.feature_importance,
            );
            self.trees.push(tree);
        }

        let total: f64 = self.feature_importance.iter().sum();
        if total > 0.0 {
            for v in &mut self.feature_importance {
                *v /= total;
            }
        }
        Ok(())
    }

    /// Fraction-of-trees style probability that the sample is class 1
    pub fn predict_proba(&self, sample: &[f64]) -> Result<f64> {
        if self.trees.is_empty() {
            return Err(ForestError::NotFitted);
        }
        if sample.len() != self.n_features {
            return Err(ForestError::FeatureWidthMismatch {
                expected: self.n_features,
                actual: sample.len(),
            });
        }
        let sum: f64 = self.trees.iter().map(|t| t.probability(sample)).sum();
        Ok(sum / self.trees.len() as f64)
    }

    pub fn predict(&self, sample: &[f64]) -> Result<bool> {
        Ok(self.predict_proba(sample)? >= 0.5)
    }

    /// Normalized Gini-decrease importance per feature
    pub fn feature_importance(&self) -> &[f64] {
        &self.feature_importance
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}
