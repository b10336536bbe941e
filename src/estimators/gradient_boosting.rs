//! Gradient boosted trees for binary classification (log loss)

use super::decision_tree::{DecisionTree, DecisionTreeConfig};
use crate::error::{Result, TrendlabError};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Boosting hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn per tree
    pub subsample: f64,
    /// Fraction of columns drawn per tree
    pub colsample_bytree: f64,
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: None,
        }
    }
}

impl GradientBoostingConfig {
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_subsample(mut self, ratio: f64) -> Self {
        self.subsample = ratio;
        self
    }

    pub fn with_colsample_bytree(mut self, ratio: f64) -> Self {
        self.colsample_bytree = ratio;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(TrendlabError::invalid_parameter("n_estimators", self.n_estimators, "must be at least 1"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(TrendlabError::invalid_parameter("learning_rate", self.learning_rate, "must be positive"));
        }
        for (name, ratio) in [("subsample", self.subsample), ("colsample_bytree", self.colsample_bytree)] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(TrendlabError::invalid_parameter(name, ratio, "must lie in (0, 1]"));
            }
        }
        Ok(())
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Boosted classifier; each stage fits a regression tree to the log-loss
/// residuals on a row/column sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    columns_per_tree: Vec<Vec<usize>>,
    initial_log_odds: f64,
    feature_importances: Vec<f64>,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            columns_per_tree: Vec::new(),
            initial_log_odds: 0.0,
            feature_importances: Vec::new(),
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        self.config.validate()?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples != y.len() {
            return Err(TrendlabError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_features == 0 {
            return Err(TrendlabError::InsufficientData(
                "boosting needs at least one row and one feature".to_string(),
            ));
        }

        let p = y.mean().unwrap_or(0.5).clamp(1e-6, 1.0 - 1e-6);
        self.initial_log_odds = (p / (1.0 - p)).ln();
        self.trees.clear();
        self.columns_per_tree.clear();
        self.feature_importances = vec![0.0; n_features];

        let mut log_odds = Array1::from_elem(n_samples, self.initial_log_odds);
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        for _ in 0..self.config.n_estimators {
            let residuals: Array1<f64> = y
                .iter()
                .zip(log_odds.iter())
                .map(|(&yi, &lo)| yi - sigmoid(lo))
                .collect();

            let rows = sample_indices(n_samples, self.config.subsample, &mut rng);
            let cols = sample_indices(n_features, self.config.colsample_bytree, &mut rng);
            let x_sub = x.select(Axis(0), &rows).select(Axis(1), &cols);
            let r_sub = residuals.select(Axis(0), &rows);

            let tree_config = DecisionTreeConfig::regressor()
                .with_max_depth(Some(self.config.max_depth))
                .with_min_samples_leaf(self.config.min_samples_leaf)
                .with_random_state(self.config.random_state);
            let mut tree = DecisionTree::new(tree_config);
            tree.fit(x_sub.view(), r_sub.view())?;

            let update = tree.predict(x.select(Axis(1), &cols).view())?;
            log_odds.scaled_add(self.config.learning_rate, &update);

            if let Some(importances) = tree.feature_importances() {
                for (j, &col) in cols.iter().enumerate() {
                    self.feature_importances[col] += importances[j];
                }
            }
            self.trees.push(tree);
            self.columns_per_tree.push(cols);
        }

        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            self.feature_importances.iter_mut().for_each(|v| *v /= total);
        }
        Ok(())
    }

    /// Positive-class probability
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(TrendlabError::NotFitted);
        }
        let mut log_odds = Array1::from_elem(x.nrows(), self.initial_log_odds);
        for (tree, cols) in self.trees.iter().zip(&self.columns_per_tree) {
            let update = tree.predict(x.select(Axis(1), cols).view())?;
            log_odds.scaled_add(self.config.learning_rate, &update);
        }
        Ok(log_odds.mapv(sigmoid))
    }
}

fn sample_indices(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    if ratio >= 1.0 {
        return indices;
    }
    let size = ((n as f64) * ratio).ceil().max(1.0) as usize;
    indices.shuffle(rng);
    indices.truncate(size);
    indices.sort_unstable();
    indices
}
