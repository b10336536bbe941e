//! Numeric estimators
//!
//! Every estimator is a binary classifier over 0/1 labels that exposes `fit`
//! and `predict_proba` (probability of class 1). [`ModelHandle`] wraps them
//! behind one enum so the classifier layer can own, clone and ensemble them
//! uniformly.

pub mod baseline;
pub mod decision_tree;
pub mod gaussian_process;
pub mod gradient_boosting;
pub mod naive_bayes;
pub mod neural_network;
pub mod recurrent;
pub mod svm;
pub mod voting;

pub use baseline::{AsPrevious, SameClass};
pub use decision_tree::{Criterion, DecisionTree, DecisionTreeConfig, TreeNode};
pub use gaussian_process::{GaussianProcessClassifier, GaussianProcessConfig};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use naive_bayes::GaussianNaiveBayes;
pub use neural_network::{Activation, MlpClassifier, MlpConfig};
pub use recurrent::{RecurrentArchitecture, RecurrentConfig, RecurrentNetwork, RecurrentObjective};
pub use svm::{KernelType, SupportVectorMachine, SvmConfig};
pub use voting::{VotingEnsemble, VotingStrategy};

use crate::error::{Result, TrendlabError};
use crate::splitter::ModelInput;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature z-score scaling; constant features keep unit scale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standardizer {
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl Standardizer {
    pub fn fit(x: ArrayView2<f64>) -> Self {
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let std = if x.nrows() == 0 {
            Array1::ones(x.ncols())
        } else {
            x.std_axis(Axis(0), 0.0)
                .mapv(|s| if s > 1e-12 && s.is_finite() { s } else { 1.0 })
        };
        Self { mean, std }
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Array2<f64> {
        (&x - &self.mean) / &self.std
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn std(&self) -> &Array1<f64> {
        &self.std
    }
}

/// Mean training loss per epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    loss: Vec<f64>,
}

impl TrainingHistory {
    pub fn push(&mut self, loss: f64) {
        self.loss.push(loss);
    }

    pub fn loss(&self) -> &[f64] {
        &self.loss
    }

    pub fn len(&self) -> usize {
        self.loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss.is_empty()
    }

    pub fn last_loss(&self) -> Option<f64> {
        self.loss.last().copied()
    }
}

/// A fitted or unfitted estimator, owned by exactly one classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelHandle {
    SameClass(SameClass),
    AsPrevious(AsPrevious),
    DecisionTree(DecisionTree),
    GradientBoosting(GradientBoostingClassifier),
    Svm(SupportVectorMachine),
    NaiveBayes(GaussianNaiveBayes),
    GaussianProcess(GaussianProcessClassifier),
    Mlp(MlpClassifier),
    Recurrent(RecurrentNetwork),
    Voting(VotingEnsemble),
}

impl ModelHandle {
    /// Estimator family
    pub fn kind(&self) -> &'static str {
        match self {
            ModelHandle::SameClass(_) => "same class",
            ModelHandle::AsPrevious(_) => "as previous",
            ModelHandle::DecisionTree(_) => "decision tree",
            ModelHandle::GradientBoosting(_) => "gradient boosting",
            ModelHandle::Svm(_) => "svm",
            ModelHandle::NaiveBayes(_) => "gaussian naive bayes",
            ModelHandle::GaussianProcess(_) => "gaussian process",
            ModelHandle::Mlp(_) => "mlp",
            ModelHandle::Recurrent(m) => m.architecture().name(),
            ModelHandle::Voting(_) => "voting",
        }
    }

    pub fn fit(&mut self, input: ModelInput<'_>, y: ArrayView1<f64>) -> Result<()> {
        if input.len() != y.len() {
            return Err(TrendlabError::ShapeError {
                expected: format!("{} labels", input.len()),
                actual: format!("{} labels", y.len()),
            });
        }
        match self {
            ModelHandle::SameClass(_) => Ok(()),
            ModelHandle::AsPrevious(_) => input.require_previous().map(|_| ()),
            ModelHandle::DecisionTree(m) => m.fit(input.rows, y),
            ModelHandle::GradientBoosting(m) => m.fit(input.rows, y),
            ModelHandle::Svm(m) => m.fit(input.rows, y),
            ModelHandle::NaiveBayes(m) => m.fit(input.rows, y),
            ModelHandle::GaussianProcess(m) => m.fit(input.rows, y),
            ModelHandle::Mlp(m) => m.fit(input.rows, y),
            ModelHandle::Recurrent(m) => m.fit(input.require_windows()?, y),
            ModelHandle::Voting(m) => m.fit(input, y),
        }
    }

    /// Probability of class 1 per row
    pub fn predict_proba(&self, input: ModelInput<'_>) -> Result<Array1<f64>> {
        match self {
            ModelHandle::SameClass(m) => Ok(m.predict_proba(input)),
            ModelHandle::AsPrevious(m) => m.predict_proba(input),
            ModelHandle::DecisionTree(m) => m.predict(input.rows),
            ModelHandle::GradientBoosting(m) => m.predict_proba(input.rows),
            ModelHandle::Svm(m) => m.predict_proba(input.rows),
            ModelHandle::NaiveBayes(m) => m.predict_proba(input.rows),
            ModelHandle::GaussianProcess(m) => m.predict_proba(input.rows),
            ModelHandle::Mlp(m) => m.predict_proba(input.rows),
            ModelHandle::Recurrent(m) => m.predict_proba(input.require_windows()?),
            ModelHandle::Voting(m) => m.predict_proba(input),
        }
    }

    /// Hard 0/1 labels
    pub fn predict(&self, input: ModelInput<'_>) -> Result<Array1<f64>> {
        match self {
            ModelHandle::Voting(m) => m.predict(input),
            _ => Ok(self
                .predict_proba(input)?
                .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 })),
        }
    }

    /// Loss per epoch for the gradient-trained families
    pub fn history(&self) -> Option<&TrainingHistory> {
        match self {
            ModelHandle::Mlp(m) => Some(m.history()),
            ModelHandle::Recurrent(m) => Some(m.history()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standardizer_constant_column() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let scaler = Standardizer::fit(x.view());
        let z = scaler.transform(x.view());
        assert_eq!(z, array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_handle_predicts_labels_from_probabilities() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut handle = ModelHandle::DecisionTree(DecisionTree::new(DecisionTreeConfig::default()));
        let input = ModelInput::from_rows(x.view());
        handle.fit(input, y.view()).unwrap();
        assert_eq!(handle.predict(input).unwrap(), y);
        assert_eq!(handle.kind(), "decision tree");
        assert!(handle.history().is_none());
    }

    #[test]
    fn test_handle_rejects_label_mismatch() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0];
        let mut handle = ModelHandle::NaiveBayes(GaussianNaiveBayes::new());
        assert!(handle.fit(ModelInput::from_rows(x.view()), y.view()).is_err());
    }

    #[test]
    fn test_recurrent_handle_requires_windows() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let mut handle = ModelHandle::Recurrent(RecurrentNetwork::new(RecurrentConfig::default()));
        assert!(matches!(
            handle.fit(ModelInput::from_rows(x.view()), y.view()),
            Err(TrendlabError::InvalidInput(_))
        ));
    }
}
