//! CART decision tree for binary classification and regression
//!
//! Leaves store the mean target of their samples: for 0/1 labels that is the
//! probability of the positive class, for regression it is the prediction.

use crate::error::{Result, TrendlabError};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        gain: f64,
    },
}

impl TreeNode {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                if row[*feature_idx] <= *threshold {
                    left.predict_row(row)
                } else {
                    right.predict_row(row)
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    /// Gini impurity, 0/1 labels
    Gini,
    /// Shannon entropy, 0/1 labels
    Entropy,
    /// Variance, regression targets
    Mse,
}

impl Criterion {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "gini" => Ok(Criterion::Gini),
            "entropy" => Ok(Criterion::Entropy),
            "mse" | "squared_error" => Ok(Criterion::Mse),
            other => Err(TrendlabError::invalid_parameter(
                "criterion",
                other,
                "expected gini, entropy or mse",
            )),
        }
    }

    fn is_classification(&self) -> bool {
        !matches!(self, Criterion::Mse)
    }

    /// Impurity from running sums over `count` samples
    fn impurity(&self, count: usize, sum: f64, sq_sum: f64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let n = count as f64;
        match self {
            Criterion::Gini => {
                let p = sum / n;
                2.0 * p * (1.0 - p)
            }
            Criterion::Entropy => {
                let p = sum / n;
                [p, 1.0 - p]
                    .iter()
                    .filter(|&&q| q > 0.0)
                    .map(|&q| -q * q.ln())
                    .sum()
            }
            Criterion::Mse => (sq_sum / n - (sum / n).powi(2)).max(0.0),
        }
    }
}

/// Tree hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeConfig {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn at random per node; all when `None`
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    pub random_state: Option<u64>,
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
        }
    }
}

impl DecisionTreeConfig {
    pub fn regressor() -> Self {
        Self {
            criterion: Criterion::Mse,
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_split(mut self, n: usize) -> Self {
        self.min_samples_split = n.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, n: usize) -> Self {
        self.min_samples_leaf = n.max(1);
        self
    }

    pub fn with_max_features(mut self, n: Option<usize>) -> Self {
        self.max_features = n;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    config: DecisionTreeConfig,
    root: Option<TreeNode>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl DecisionTree {
    pub fn new(config: DecisionTreeConfig) -> Self {
        Self {
            config,
            root: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    pub fn config(&self) -> &DecisionTreeConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Fit the tree. Classification criteria require 0/1 labels.
    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(TrendlabError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(TrendlabError::InsufficientData("no training rows".to_string()));
        }
        if self.config.criterion.is_classification() && y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(TrendlabError::InvalidInput(
                "classification trees expect 0/1 labels".to_string(),
            ));
        }

        self.n_features = x.ncols();
        let mut importances = Array1::zeros(self.n_features);
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(x, y, &indices, 0, &mut importances, &mut rng);

        let total = importances.sum();
        if total > 0.0 {
            importances /= total;
        }
        self.root = Some(root);
        self.feature_importances = Some(importances);
        Ok(())
    }

    fn leaf(y: ArrayView1<f64>, indices: &[usize]) -> TreeNode {
        let sum: f64 = indices.iter().map(|&i| y[i]).sum();
        TreeNode::Leaf {
            value: sum / indices.len().max(1) as f64,
            n_samples: indices.len(),
        }
    }

    fn build_tree(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut Array1<f64>,
        rng: &mut Xoshiro256PlusPlus,
    ) -> TreeNode {
        let n_samples = indices.len();
        let pure = indices.windows(2).all(|w| y[w[0]] == y[w[1]]);

        if pure
            || n_samples < self.config.min_samples_split
            || n_samples < 2 * self.config.min_samples_leaf
            || self.config.max_depth.is_some_and(|d| depth >= d)
        {
            return Self::leaf(y, indices);
        }

        let mut features: Vec<usize> = (0..self.n_features).collect();
        if let Some(k) = self.config.max_features {
            if k < self.n_features {
                features.shuffle(rng);
                features.truncate(k.max(1));
                features.sort_unstable();
            }
        }

        let Some(best) = self.find_best_split(x, y, indices, &features) else {
            return Self::leaf(y, indices);
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, best.feature_idx]] <= best.threshold);
        if left_idx.is_empty() || right_idx.is_empty() {
            return Self::leaf(y, indices);
        }

        importances[best.feature_idx] += n_samples as f64 * best.gain;

        let left = self.build_tree(x, y, &left_idx, depth + 1, importances, rng);
        let right = self.build_tree(x, y, &right_idx, depth + 1, importances, rng);

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left: Box::new(left),
            right: Box::new(right),
            n_samples,
            gain: best.gain,
        }
    }

    /// Scan every candidate feature in parallel; each feature sweeps its sorted
    /// values once, updating left/right sums incrementally.
    fn find_best_split(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        indices: &[usize],
        features: &[usize],
    ) -> Option<Candidate> {
        let criterion = self.config.criterion;
        let min_leaf = self.config.min_samples_leaf;
        let n = indices.len();
        let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
        let parent = criterion.impurity(n, total_sum, total_sq);

        let per_feature: Vec<Option<Candidate>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut order: Vec<usize> = indices.to_vec();
                order.sort_by(|&a, &b| {
                    x[[a, feature_idx]]
                        .partial_cmp(&x[[b, feature_idx]])
                        .unwrap_or(Ordering::Equal)
                });

                let mut best: Option<Candidate> = None;
                let mut left_sum = 0.0;
                let mut left_sq = 0.0;
                for pos in 0..n - 1 {
                    let yi = y[order[pos]];
                    left_sum += yi;
                    left_sq += yi * yi;

                    let here = x[[order[pos], feature_idx]];
                    let next = x[[order[pos + 1], feature_idx]];
                    let left_count = pos + 1;
                    let right_count = n - left_count;
                    if here == next || left_count < min_leaf || right_count < min_leaf {
                        continue;
                    }

                    let weighted = (left_count as f64
                        * criterion.impurity(left_count, left_sum, left_sq)
                        + right_count as f64
                            * criterion.impurity(right_count, total_sum - left_sum, total_sq - left_sq))
                        / n as f64;
                    let gain = parent - weighted;
                    if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                        // the midpoint of ulp-adjacent values can round up to `next`
                        let mut threshold = (here + next) / 2.0;
                        if threshold >= next {
                            threshold = here;
                        }
                        best = Some(Candidate {
                            feature_idx,
                            threshold,
                            gain,
                        });
                    }
                }
                best
            })
            .collect();

        per_feature
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<Candidate>, c| match acc {
                Some(a) if a.gain >= c.gain => Some(a),
                _ => Some(c),
            })
    }

    /// Leaf value per row: positive-class probability or regression output
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(TrendlabError::NotFitted)?;
        if x.ncols() != self.n_features {
            return Err(TrendlabError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows().into_iter().map(|row| root.predict_row(row)).collect())
    }
}
