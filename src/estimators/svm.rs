//! Support vector classifier trained with simplified SMO

use super::Standardizer;
use crate::error::{Result, TrendlabError};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Largest training set for which the Gram matrix is built
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelType {
    /// `x . y`
    Linear,
    /// `(gamma x . y + coef0)^degree`
    Polynomial { degree: u32, gamma: f64, coef0: f64 },
    /// `exp(-gamma |x - y|^2)`
    Rbf { gamma: f64 },
    /// `tanh(gamma x . y + coef0)`
    Sigmoid { gamma: f64, coef0: f64 },
}

impl KernelType {
    /// Parse a kernel name; `gamma` falls back to `1 / n_features` when `None`
    pub fn from_name(
        name: &str,
        gamma: Option<f64>,
        degree: u32,
        coef0: f64,
        n_features: usize,
    ) -> Result<Self> {
        let gamma = gamma.unwrap_or(1.0 / n_features.max(1) as f64);
        match name.to_lowercase().as_str() {
            "linear" => Ok(KernelType::Linear),
            "poly" | "polynomial" => Ok(KernelType::Polynomial { degree, gamma, coef0 }),
            "rbf" => Ok(KernelType::Rbf { gamma }),
            "sigmoid" => Ok(KernelType::Sigmoid { gamma, coef0 }),
            other => Err(TrendlabError::invalid_parameter(
                "kernel",
                other,
                "expected linear, poly, rbf or sigmoid",
            )),
        }
    }

    pub fn compute(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            KernelType::Linear => a.dot(&b),
            KernelType::Polynomial { degree, gamma, coef0 } => {
                (gamma * a.dot(&b) + coef0).powi(*degree as i32)
            }
            KernelType::Rbf { gamma } => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * sq).exp()
            }
            KernelType::Sigmoid { gamma, coef0 } => (gamma * a.dot(&b) + coef0).tanh(),
        }
    }

    /// Kernel matrix between the rows of `a` and `b`, rows computed in parallel
    pub fn matrix(&self, a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
        let rows: Vec<Vec<f64>> = (0..a.nrows())
            .into_par_iter()
            .map(|i| {
                let ai = a.row(i);
                b.rows().into_iter().map(|bj| self.compute(ai, bj)).collect()
            })
            .collect();
        let mut k = Array2::zeros((a.nrows(), b.nrows()));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, v) in row.into_iter().enumerate() {
                k[[i, j]] = v;
            }
        }
        k
    }
}

/// SVC hyperparameters. `kernel` stays a name until the feature count is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmConfig {
    pub kernel: String,
    pub c: f64,
    /// `None` means `1 / n_features`
    pub gamma: Option<f64>,
    pub degree: u32,
    pub coef0: f64,
    pub tol: f64,
    /// Passes over the training set
    pub max_iter: usize,
    pub random_state: Option<u64>,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            kernel: "rbf".to_string(),
            c: 1.0,
            gamma: None,
            degree: 3,
            coef0: 0.0,
            tol: 1e-3,
            max_iter: 200,
            random_state: Some(42),
        }
    }
}

impl SvmConfig {
    pub fn with_kernel(mut self, kernel: impl Into<String>) -> Self {
        self.kernel = kernel.into();
        self
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_gamma(mut self, gamma: Option<f64>) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SvmModel {
    kernel: KernelType,
    scaler: Standardizer,
    support_vectors: Array2<f64>,
    /// `alpha_i * y_i` per support vector
    coefficients: Array1<f64>,
    bias: f64,
}

/// Binary SVC over 0/1 labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportVectorMachine {
    config: SvmConfig,
    model: Option<SvmModel>,
}

impl SupportVectorMachine {
    pub fn new(config: SvmConfig) -> Self {
        Self { config, model: None }
    }

    pub fn config(&self) -> &SvmConfig {
        &self.config
    }

    pub fn n_support_vectors(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.support_vectors.nrows())
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        let n = x.nrows();
        if n != y.len() {
            return Err(TrendlabError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n == 0 {
            return Err(TrendlabError::InsufficientData("no training rows".to_string()));
        }
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(TrendlabError::InvalidInput(format!(
                "{} training rows exceed the kernel matrix limit of {}",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }
        if !(self.config.c > 0.0) {
            return Err(TrendlabError::invalid_parameter("c", self.config.c, "must be positive"));
        }

        let kernel = KernelType::from_name(
            &self.config.kernel,
            self.config.gamma,
            self.config.degree,
            self.config.coef0,
            x.ncols(),
        )?;
        let scaler = Standardizer::fit(x);
        let xs = scaler.transform(x);
        let signs: Array1<f64> = y.mapv(|v| if v >= 0.5 { 1.0 } else { -1.0 });

        // a single class leaves nothing to separate
        if signs.iter().all(|&s| s == signs[0]) {
            self.model = Some(SvmModel {
                kernel,
                scaler,
                support_vectors: Array2::zeros((0, x.ncols())),
                coefficients: Array1::zeros(0),
                bias: signs[0],
            });
            return Ok(());
        }

        let gram = kernel.matrix(xs.view(), xs.view());
        let (alphas, bias) = self.smo(&gram, &signs);

        let support: Vec<usize> = (0..n).filter(|&i| alphas[i] > 1e-8).collect();
        let coefficients = support.iter().map(|&i| alphas[i] * signs[i]).collect();
        self.model = Some(SvmModel {
            kernel,
            support_vectors: xs.select(Axis(0), &support),
            scaler,
            coefficients,
            bias,
        });
        Ok(())
    }

    fn smo(&self, k: &Array2<f64>, y: &Array1<f64>) -> (Array1<f64>, f64) {
        let n = y.len();
        let c = self.config.c;
        let tol = self.config.tol;
        let mut alphas: Array1<f64> = Array1::zeros(n);
        let mut bias = 0.0;
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let decision = |alphas: &Array1<f64>, bias: f64, i: usize| -> f64 {
            let mut f = bias;
            for j in 0..n {
                if alphas[j] > 0.0 {
                    f += alphas[j] * y[j] * k[[j, i]];
                }
            }
            f
        };

        let mut passes = 0;
        let mut iter = 0;
        while passes < 5 && iter < self.config.max_iter {
            let mut changed = 0;
            for i in 0..n {
                let e_i = decision(&alphas, bias, i) - y[i];
                let violates = (y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0);
                if !violates {
                    continue;
                }

                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = decision(&alphas, bias, j) - y[j];
                let (ai_old, aj_old) = (alphas[i], alphas[j]);

                let (low, high) = if y[i] != y[j] {
                    ((aj_old - ai_old).max(0.0), (c + aj_old - ai_old).min(c))
                } else {
                    ((ai_old + aj_old - c).max(0.0), (ai_old + aj_old).min(c))
                };
                if (high - low).abs() < 1e-10 {
                    continue;
                }

                let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                alphas[j] = (aj_old - y[j] * (e_i - e_j) / eta).clamp(low, high);
                if (alphas[j] - aj_old).abs() < 1e-5 {
                    continue;
                }
                alphas[i] = ai_old + y[i] * y[j] * (aj_old - alphas[j]);

                let b1 = bias - e_i
                    - y[i] * (alphas[i] - ai_old) * k[[i, i]]
                    - y[j] * (alphas[j] - aj_old) * k[[i, j]];
                let b2 = bias - e_j
                    - y[i] * (alphas[i] - ai_old) * k[[i, j]]
                    - y[j] * (alphas[j] - aj_old) * k[[j, j]];
                bias = if alphas[i] > 0.0 && alphas[i] < c {
                    b1
                } else if alphas[j] > 0.0 && alphas[j] < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };
                changed += 1;
            }

            iter += 1;
            passes = if changed == 0 { passes + 1 } else { 0 };
        }
        (alphas, bias)
    }

    /// Signed distance to the separating surface; positive means class 1
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let model = self.model.as_ref().ok_or(TrendlabError::NotFitted)?;
        let xs = model.scaler.transform(x);
        if model.support_vectors.nrows() == 0 {
            return Ok(Array1::from_elem(x.nrows(), model.bias));
        }
        let k = model.kernel.matrix(xs.view(), model.support_vectors.view());
        Ok(k.dot(&model.coefficients) + model.bias)
    }

    /// Logistic squash of the decision value
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(|f| 1.0 / (1.0 + (-f).exp())))
    }
}
