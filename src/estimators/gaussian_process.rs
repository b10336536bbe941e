//! Gaussian process classifier
//!
//! Labels are mapped to -1/+1 and regressed with an RBF Gaussian process; the
//! latent mean is squashed through a logistic link moderated by the predictive
//! variance.

use super::svm::KernelType;
use super::Standardizer;
use crate::error::{Result, TrendlabError};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianProcessConfig {
    pub length_scale: f64,
    pub signal_variance: f64,
    pub noise_variance: f64,
    /// Training rows kept; larger sets are thinned evenly
    pub max_training_size: usize,
}

impl Default for GaussianProcessConfig {
    fn default() -> Self {
        Self {
            length_scale: 1.0,
            signal_variance: 1.0,
            noise_variance: 0.1,
            max_training_size: 2000,
        }
    }
}

impl GaussianProcessConfig {
    pub fn with_length_scale(mut self, length_scale: f64) -> Self {
        self.length_scale = length_scale;
        self
    }

    pub fn with_noise_variance(mut self, noise: f64) -> Self {
        self.noise_variance = noise;
        self
    }

    pub fn with_max_training_size(mut self, size: usize) -> Self {
        self.max_training_size = size;
        self
    }

    fn kernel(&self) -> KernelType {
        KernelType::Rbf {
            gamma: 1.0 / (2.0 * self.length_scale.powi(2)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GpModel {
    scaler: Standardizer,
    x_train: Array2<f64>,
    /// `K^-1 (y - mean)`
    alpha: Array1<f64>,
    /// Lower Cholesky factor of `K + noise I`
    cholesky: Array2<f64>,
    y_mean: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianProcessClassifier {
    config: GaussianProcessConfig,
    model: Option<GpModel>,
}

impl GaussianProcessClassifier {
    pub fn new(config: GaussianProcessConfig) -> Self {
        Self { config, model: None }
    }

    pub fn config(&self) -> &GaussianProcessConfig {
        &self.config
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            return Err(TrendlabError::TrainingError(format!(
                "{} rows against {} labels",
                n,
                y.len()
            )));
        }
        let cfg = &self.config;
        if !(cfg.length_scale > 0.0 && cfg.signal_variance > 0.0 && cfg.noise_variance >= 0.0) {
            return Err(TrendlabError::invalid_parameter(
                "length_scale/signal_variance/noise_variance",
                format!("{}/{}/{}", cfg.length_scale, cfg.signal_variance, cfg.noise_variance),
                "length scale and signal variance must be positive, noise non-negative",
            ));
        }
        if cfg.max_training_size == 0 {
            return Err(TrendlabError::invalid_parameter("max_training_size", 0, "must be at least 1"));
        }

        let rows: Vec<usize> = if n > cfg.max_training_size {
            let step = n.div_ceil(cfg.max_training_size);
            (0..n).step_by(step).collect()
        } else {
            (0..n).collect()
        };

        let scaler = Standardizer::fit(x);
        let x_train = scaler.transform(x).select(Axis(0), &rows);
        let targets: Array1<f64> = rows.iter().map(|&i| if y[i] >= 0.5 { 1.0 } else { -1.0 }).collect();
        let y_mean = targets.mean().unwrap_or(0.0);
        let centered = &targets - y_mean;

        let mut k = cfg.kernel().matrix(x_train.view(), x_train.view()) * cfg.signal_variance;
        // jitter keeps the factorization stable when noise is zero
        for i in 0..k.nrows() {
            k[[i, i]] += cfg.noise_variance + 1e-8;
        }
        let cholesky = cholesky(&k)?;
        let alpha = cholesky_solve(&cholesky, &centered);

        self.model = Some(GpModel {
            scaler,
            x_train,
            alpha,
            cholesky,
            y_mean,
        });
        Ok(())
    }

    /// Latent mean and variance at each row
    pub fn predict_latent(&self, x: ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        let model = self.model.as_ref().ok_or(TrendlabError::NotFitted)?;
        let xs = model.scaler.transform(x);
        let k_star = self.config.kernel().matrix(xs.view(), model.x_train.view()) * self.config.signal_variance;

        let mean = k_star.dot(&model.alpha) + model.y_mean;
        let variance = k_star
            .rows()
            .into_iter()
            .map(|ks| {
                let v = forward_substitution(&model.cholesky, ks);
                (self.config.signal_variance - v.dot(&v)).max(1e-10)
            })
            .collect();
        Ok((mean, variance))
    }

    /// Positive-class probability
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let (mean, variance) = self.predict_latent(x)?;
        Ok(mean
            .iter()
            .zip(variance.iter())
            .map(|(&m, &v)| {
                let z = m / (1.0 + PI * v / 8.0).sqrt();
                1.0 / (1.0 + (-z).exp())
            })
            .collect())
    }
}

/// Lower Cholesky factor `L` with `A = L L^T`
fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let val = a[[i, i]] - sum;
                if val <= 0.0 {
                    return Err(TrendlabError::ComputationError(
                        "kernel matrix is not positive definite".to_string(),
                    ));
                }
                l[[i, j]] = val.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Ok(l)
}

fn forward_substitution(l: &Array2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }
    y
}

/// Solve `L L^T x = b`
fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let y = forward_substitution(l, b.view());
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_cholesky_solve() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let l = cholesky(&a).unwrap();
        let x = cholesky_solve(&l, &b);
        let back = a.dot(&x);
        assert!((back[0] - 2.0).abs() < 1e-10);
        assert!((back[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_gp_classifier_clusters() {
        let x = array![[0.0], [0.2], [0.4], [3.0], [3.2], [3.4]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut gp = GaussianProcessClassifier::new(GaussianProcessConfig::default());
        gp.fit(x.view(), y.view()).unwrap();

        let p = gp.predict_proba(x.view()).unwrap();
        assert!(p.iter().take(3).all(|&v| v < 0.5));
        assert!(p.iter().skip(3).all(|&v| v > 0.5));
    }

    #[test]
    fn test_thinning_respects_max_size() {
        let x = Array2::from_shape_fn((50, 1), |(i, _)| i as f64);
        let y: Array1<f64> = (0..50).map(|i| (i >= 25) as u8 as f64).collect();
        let config = GaussianProcessConfig::default().with_max_training_size(10);
        let mut gp = GaussianProcessClassifier::new(config);
        gp.fit(x.view(), y.view()).unwrap();
        assert!(gp.model.as_ref().unwrap().x_train.nrows() <= 10);
    }

    #[test]
    fn test_not_fitted() {
        let gp = GaussianProcessClassifier::new(GaussianProcessConfig::default());
        assert!(matches!(gp.predict_proba(array![[1.0]].view()), Err(TrendlabError::NotFitted)));
    }
}
