//! Trivial baselines used to sanity-check metrics

use crate::error::{Result, TrendlabError};
use crate::splitter::ModelInput;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Predicts one fixed class for every row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SameClass {
    class: f64,
}

impl SameClass {
    pub fn new(class: u8) -> Result<Self> {
        if class > 1 {
            return Err(TrendlabError::invalid_parameter("class", class, "expected 0 or 1"));
        }
        Ok(Self { class: class as f64 })
    }

    pub fn class(&self) -> f64 {
        self.class
    }

    pub fn predict_proba(&self, input: ModelInput<'_>) -> Array1<f64> {
        Array1::from_elem(input.len(), self.class)
    }
}

/// Persistence baseline: each row repeats the label of the row before it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsPrevious;

impl AsPrevious {
    pub fn predict_proba(&self, input: ModelInput<'_>) -> Result<Array1<f64>> {
        let previous = input.require_previous()?;
        Ok(previous.mapv(|v| if v >= 0.5 { 1.0 } else { 0.0 }))
    }

    /// Share of rows whose label equals the previous one
    pub fn persistence(input: ModelInput<'_>, y: ArrayView1<f64>) -> Result<f64> {
        let previous = input.require_previous()?;
        if y.is_empty() {
            return Ok(0.0);
        }
        let same = previous.iter().zip(y.iter()).filter(|(a, b)| a == b).count();
        Ok(same as f64 / y.len() as f64)
    }
}
