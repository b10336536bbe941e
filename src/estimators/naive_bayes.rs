//! Gaussian naive Bayes over 0/1 labels

use crate::error::{Result, TrendlabError};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassStats {
    log_prior: f64,
    means: Vec<f64>,
    variances: Vec<f64>,
}

impl ClassStats {
    fn log_likelihood(&self, row: ArrayView1<f64>) -> f64 {
        row.iter()
            .zip(self.means.iter().zip(&self.variances))
            .map(|(&x, (&mean, &var))| -0.5 * ((x - mean).powi(2) / var + var.ln() + (2.0 * PI).ln()))
            .sum()
    }
}

/// Gaussian naive Bayes. Variances are smoothed by `var_smoothing` times the
/// largest feature variance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    var_smoothing: f64,
    /// Index 0 holds the negative class, index 1 the positive class
    classes: [Option<ClassStats>; 2],
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            var_smoothing: 1e-9,
            classes: [None, None],
        }
    }

    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    pub fn var_smoothing(&self) -> f64 {
        self.var_smoothing
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples != y.len() || n_samples == 0 {
            return Err(TrendlabError::ShapeError {
                expected: format!("{} non-empty labels", n_samples),
                actual: format!("{} labels", y.len()),
            });
        }
        if self.var_smoothing < 0.0 {
            return Err(TrendlabError::invalid_parameter("var_smoothing", self.var_smoothing, "must be >= 0"));
        }

        let max_variance = x
            .columns()
            .into_iter()
            .map(|c| c.var(0.0))
            .fold(0.0, f64::max);
        let epsilon = (self.var_smoothing * max_variance).max(1e-12);

        self.classes = [None, None];
        for (slot, label) in [(0usize, 0.0), (1usize, 1.0)] {
            let rows: Vec<usize> = (0..n_samples).filter(|&i| (y[i] >= 0.5) == (label == 1.0)).collect();
            if rows.is_empty() {
                continue;
            }

            // Welford per feature
            let mut means = vec![0.0; n_features];
            let mut m2 = vec![0.0; n_features];
            for (count, &i) in rows.iter().enumerate() {
                let count = (count + 1) as f64;
                for (j, &v) in x.row(i).iter().enumerate() {
                    let delta = v - means[j];
                    means[j] += delta / count;
                    m2[j] += delta * (v - means[j]);
                }
            }
            let variances = m2.iter().map(|&s| s / rows.len() as f64 + epsilon).collect();

            self.classes[slot] = Some(ClassStats {
                log_prior: (rows.len() as f64 / n_samples as f64).ln(),
                means,
                variances,
            });
        }
        Ok(())
    }

    /// Positive-class probability, normalized with log-sum-exp
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        match &self.classes {
            [None, None] => Err(TrendlabError::NotFitted),
            [Some(_), None] => Ok(Array1::zeros(x.nrows())),
            [None, Some(_)] => Ok(Array1::ones(x.nrows())),
            [Some(neg), Some(pos)] => Ok(x
                .rows()
                .into_iter()
                .map(|row| {
                    let l0 = neg.log_prior + neg.log_likelihood(row);
                    let l1 = pos.log_prior + pos.log_likelihood(row);
                    let max = l0.max(l1);
                    let log_sum = max + ((l0 - max).exp() + (l1 - max).exp()).ln();
                    (l1 - log_sum).exp()
                })
                .collect()),
        }
    }
}
