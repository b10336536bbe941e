//! Multi-layer perceptron for binary classification
//!
//! Hidden layers use the configured activation; the output is a single
//! sigmoid unit trained on binary cross-entropy with momentum SGD.

use super::{Standardizer, TrainingHistory};
use crate::error::{Result, TrendlabError};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hidden-layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Sigmoid,
    Tanh,
    Identity,
}

impl Activation {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "logistic" | "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "identity" | "linear" => Ok(Activation::Identity),
            other => Err(TrendlabError::invalid_parameter(
                "activation",
                other,
                "expected relu, logistic, tanh or identity",
            )),
        }
    }

    fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => z.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv(sigmoid),
            Activation::Tanh => z.mapv(f64::tanh),
            Activation::Identity => z.clone(),
        }
    }

    fn derivative(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => z.mapv(|v| {
                let s = sigmoid(v);
                s * (1.0 - s)
            }),
            Activation::Tanh => z.mapv(|v| 1.0 - v.tanh().powi(2)),
            Activation::Identity => Array2::ones(z.raw_dim()),
        }
    }
}

pub(crate) fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Mean binary cross-entropy
pub(crate) fn log_loss(y: ArrayView1<f64>, p: ArrayView1<f64>) -> f64 {
    let eps = 1e-12;
    let n = y.len().max(1) as f64;
    y.iter()
        .zip(p.iter())
        .map(|(&t, &q)| {
            let q = q.clamp(eps, 1.0 - eps);
            -(t * q.ln() + (1.0 - t) * (1.0 - q).ln())
        })
        .sum::<f64>()
        / n
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpConfig {
    pub hidden_layer_sizes: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    /// L2 penalty
    pub alpha: f64,
    pub momentum: f64,
    /// Stop after this many epochs without a loss improvement of `tol`
    pub n_iter_no_change: usize,
    pub tol: f64,
    pub random_state: Option<u64>,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_layer_sizes: vec![100],
            activation: Activation::Relu,
            learning_rate: 0.01,
            max_epochs: 200,
            batch_size: 32,
            alpha: 1e-4,
            momentum: 0.9,
            n_iter_no_change: 10,
            tol: 1e-4,
            random_state: None,
        }
    }
}

impl MlpConfig {
    pub fn with_hidden_layer_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.hidden_layer_sizes = sizes;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_max_epochs(mut self, epochs: usize) -> Self {
        self.max_epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpClassifier {
    config: MlpConfig,
    scaler: Option<Standardizer>,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    history: TrainingHistory,
}

impl MlpClassifier {
    pub fn new(config: MlpConfig) -> Self {
        Self {
            config,
            scaler: None,
            weights: Vec::new(),
            biases: Vec::new(),
            history: TrainingHistory::default(),
        }
    }

    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    fn initialize(&mut self, n_features: usize, rng: &mut Xoshiro256PlusPlus) {
        let mut sizes = vec![n_features];
        sizes.extend(&self.config.hidden_layer_sizes);
        sizes.push(1);

        self.weights.clear();
        self.biases.clear();
        for pair in sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            // Xavier/Glorot uniform
            let limit = (6.0 / (n_in + n_out) as f64).sqrt();
            self.weights
                .push(Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-limit..limit)));
            self.biases.push(Array1::zeros(n_out));
        }
    }

    /// Pre-activations and activations per layer; the last activation is the
    /// sigmoid output
    fn forward(&self, x: &Array2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let mut activations = vec![x.clone()];
        let mut pre = Vec::with_capacity(self.weights.len());
        let last = self.weights.len() - 1;
        for (i, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let z = activations[i].dot(w) + b;
            let a = if i == last {
                z.mapv(sigmoid)
            } else {
                self.config.activation.apply(&z)
            };
            pre.push(z);
            activations.push(a);
        }
        (pre, activations)
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            return Err(TrendlabError::TrainingError(format!("{} rows against {} labels", n, y.len())));
        }
        if self.config.hidden_layer_sizes.iter().any(|&s| s == 0) {
            return Err(TrendlabError::invalid_parameter(
                "hidden_layer_sizes",
                format!("{:?}", self.config.hidden_layer_sizes),
                "layer sizes must be positive",
            ));
        }

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        let scaler = Standardizer::fit(x);
        let xs = scaler.transform(x);
        self.scaler = Some(scaler);
        self.initialize(x.ncols(), &mut rng);
        self.history = TrainingHistory::default();

        let mut vel_w: Vec<Array2<f64>> = self.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect();
        let mut vel_b: Vec<Array1<f64>> = self.biases.iter().map(|b| Array1::zeros(b.len())).collect();
        let batch_size = self.config.batch_size.max(1);
        let mut best_loss = f64::INFINITY;
        let mut stale = 0;
        let mut order: Vec<usize> = (0..n).collect();

        for epoch in 0..self.config.max_epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(batch_size) {
                let xb = xs.select(Axis(0), batch);
                let yb = y.select(Axis(0), batch).insert_axis(Axis(1));
                let (pre, acts) = self.forward(&xb);

                // sigmoid + cross-entropy gradient
                let mut delta = (&acts[acts.len() - 1] - &yb) / batch.len() as f64;
                for layer in (0..self.weights.len()).rev() {
                    let grad_w = acts[layer].t().dot(&delta) + &self.weights[layer] * self.config.alpha;
                    let grad_b = delta.sum_axis(Axis(0));
                    if layer > 0 {
                        delta = delta.dot(&self.weights[layer].t()) * self.config.activation.derivative(&pre[layer - 1]);
                    }
                    vel_w[layer] = &vel_w[layer] * self.config.momentum - grad_w * self.config.learning_rate;
                    vel_b[layer] = &vel_b[layer] * self.config.momentum - grad_b * self.config.learning_rate;
                    self.weights[layer] += &vel_w[layer];
                    self.biases[layer] += &vel_b[layer];
                }
            }

            let proba = self.forward(&xs).1.pop().map(|p| p.column(0).to_owned()).unwrap_or_default();
            let loss = log_loss(y, proba.view());
            if !loss.is_finite() {
                return Err(TrendlabError::TrainingError(format!("loss diverged at epoch {}", epoch)));
            }
            self.history.push(loss);
            debug!(epoch, loss, "MLP epoch");

            if loss < best_loss - self.config.tol {
                best_loss = loss;
                stale = 0;
            } else {
                stale += 1;
                if stale >= self.config.n_iter_no_change {
                    break;
                }
            }
        }
        Ok(())
    }

    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let scaler = self.scaler.as_ref().ok_or(TrendlabError::NotFitted)?;
        let xs = scaler.transform(x);
        let (_, mut acts) = self.forward(&xs);
        acts.pop()
            .map(|p| p.column(0).to_owned())
            .ok_or(TrendlabError::NotFitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| {
            let base = if i < 30 { -2.0 } else { 2.0 };
            base + ((i * 7 + j * 13) % 10) as f64 * 0.1
        });
        let y: Array1<f64> = (0..60).map(|i| if i < 30 { 0.0 } else { 1.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_mlp_learns_blobs() {
        let (x, y) = blobs();
        let config = MlpConfig::default()
            .with_hidden_layer_sizes(vec![8])
            .with_max_epochs(100)
            .with_random_state(Some(1));
        let mut mlp = MlpClassifier::new(config);
        mlp.fit(x.view(), y.view()).unwrap();

        let p = mlp.predict_proba(x.view()).unwrap();
        let correct = p.iter().zip(y.iter()).filter(|(&p, &t)| (p >= 0.5) == (t == 1.0)).count();
        assert_eq!(correct, 60);
        assert!(!mlp.history().is_empty());
    }

    #[test]
    fn test_loss_history_decreases() {
        let (x, y) = blobs();
        let config = MlpConfig::default()
            .with_hidden_layer_sizes(vec![4, 4])
            .with_activation(Activation::Tanh)
            .with_max_epochs(30)
            .with_random_state(Some(5));
        let mut mlp = MlpClassifier::new(config);
        mlp.fit(x.view(), y.view()).unwrap();
        let loss = mlp.history().loss();
        assert!(loss.last().unwrap() < &loss[0]);
    }

    #[test]
    fn test_activation_parse() {
        assert_eq!(Activation::parse("logistic").unwrap(), Activation::Sigmoid);
        assert!(Activation::parse("swish").is_err());
    }
}
