//! Voting ensemble over model handles

use super::ModelHandle;
use crate::error::{Result, TrendlabError};
use crate::splitter::ModelInput;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How member outputs are combined
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VotingStrategy {
    /// Weighted majority of hard labels
    Hard,
    /// Weighted mean of positive-class probabilities
    #[default]
    Soft,
}

impl VotingStrategy {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "hard" => Ok(VotingStrategy::Hard),
            "soft" => Ok(VotingStrategy::Soft),
            other => Err(TrendlabError::invalid_parameter("voting", other, "expected soft or hard")),
        }
    }
}

/// Named members combined by soft or hard voting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingEnsemble {
    strategy: VotingStrategy,
    members: Vec<(String, ModelHandle)>,
    /// Normalized to sum to one
    weights: Vec<f64>,
}

impl VotingEnsemble {
    pub fn new(members: Vec<(String, ModelHandle)>, strategy: VotingStrategy) -> Result<Self> {
        if members.is_empty() {
            return Err(TrendlabError::InvalidInput("voting needs at least one estimator".to_string()));
        }
        let n = members.len();
        Ok(Self {
            strategy,
            members,
            weights: vec![1.0 / n as f64; n],
        })
    }

    pub fn with_weights(mut self, weights: &[f64]) -> Result<Self> {
        if weights.len() != self.members.len() {
            return Err(TrendlabError::ShapeError {
                expected: format!("{} weights", self.members.len()),
                actual: format!("{} weights", weights.len()),
            });
        }
        let total: f64 = weights.iter().sum();
        if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) || total <= 0.0 {
            return Err(TrendlabError::invalid_parameter(
                "weights",
                format!("{:?}", weights),
                "weights must be non-negative with a positive sum",
            ));
        }
        self.weights = weights.iter().map(|w| w / total).collect();
        Ok(self)
    }

    pub fn strategy(&self) -> VotingStrategy {
        self.strategy
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn members(&self) -> &[(String, ModelHandle)] {
        &self.members
    }

    /// Refit every member on the same training input
    pub fn fit(&mut self, input: ModelInput<'_>, y: ArrayView1<f64>) -> Result<()> {
        for (name, handle) in &mut self.members {
            debug!(member = name.as_str(), "Fitting voting member");
            handle.fit(input, y)?;
        }
        Ok(())
    }

    /// Positive-class score: the weighted mean probability for soft voting,
    /// the weighted share of positive votes for hard voting
    pub fn predict_proba(&self, input: ModelInput<'_>) -> Result<Array1<f64>> {
        let mut score = Array1::zeros(input.len());
        for ((_, handle), &weight) in self.members.iter().zip(&self.weights) {
            let member = match self.strategy {
                VotingStrategy::Soft => handle.predict_proba(input)?,
                VotingStrategy::Hard => handle.predict(input)?,
            };
            score.scaled_add(weight, &member);
        }
        Ok(score)
    }

    /// Hard labels; a tied hard vote goes to class 0
    pub fn predict(&self, input: ModelInput<'_>) -> Result<Array1<f64>> {
        let score = self.predict_proba(input)?;
        Ok(match self.strategy {
            VotingStrategy::Soft => score.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }),
            VotingStrategy::Hard => score.mapv(|p| if p > 0.5 + 1e-12 { 1.0 } else { 0.0 }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::baseline::{AsPrevious, SameClass};
    use ndarray::{array, Array2};

    fn members() -> Vec<(String, ModelHandle)> {
        vec![
            ("ones".to_string(), ModelHandle::SameClass(SameClass::new(1).unwrap())),
            ("zeros".to_string(), ModelHandle::SameClass(SameClass::new(0).unwrap())),
            ("previous".to_string(), ModelHandle::AsPrevious(AsPrevious)),
        ]
    }

    #[test]
    fn test_hard_vote_majority() {
        let rows = Array2::zeros((2, 1));
        let previous = array![1.0, 0.0];
        let input = ModelInput::from_rows(rows.view()).with_previous(previous.view());

        let ensemble = VotingEnsemble::new(members(), VotingStrategy::Hard).unwrap();
        assert_eq!(ensemble.predict(input).unwrap(), array![1.0, 0.0]);
    }

    #[test]
    fn test_weights_are_normalized() {
        let rows = Array2::zeros((1, 1));
        let previous = array![0.0];
        let input = ModelInput::from_rows(rows.view()).with_previous(previous.view());

        let ensemble = VotingEnsemble::new(members(), VotingStrategy::Soft)
            .unwrap()
            .with_weights(&[2.0, 1.0, 1.0])
            .unwrap();
        assert_eq!(ensemble.weights(), &[0.5, 0.25, 0.25]);
        assert!((ensemble.predict_proba(input).unwrap()[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(VotingEnsemble::new(Vec::new(), VotingStrategy::Soft).is_err());
        let ensemble = VotingEnsemble::new(members(), VotingStrategy::Soft).unwrap();
        assert!(ensemble.clone().with_weights(&[1.0]).is_err());
        assert!(ensemble.with_weights(&[0.0, 0.0, 0.0]).is_err());
        assert!(VotingStrategy::parse("plurality").is_err());
    }
}
