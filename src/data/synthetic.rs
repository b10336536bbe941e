//! Synthetic price series for experiments and tests

use super::table::FeatureTable;
use crate::error::{Result, TrendlabError};
use ndarray::Array1;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Sinusoid parameters; missing fields take their defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinusoidConfig {
    /// Number of samples
    pub length: usize,
    pub amplitude: f64,
    /// Cycles per sample
    pub frequency: f64,
    /// Phase in radians
    pub phi: f64,
    /// Vertical offset
    pub height: f64,
}

impl Default for SinusoidConfig {
    fn default() -> Self {
        Self {
            length: 200,
            amplitude: 1.0,
            frequency: 0.1,
            phi: 0.0,
            height: 0.0,
        }
    }
}

impl SinusoidConfig {
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_height(mut self, height: f64) -> Self {
        self.height = height;
        self
    }

    /// `height + amplitude * sin(2 pi frequency t + phi)` for `t = 0..length`
    pub fn generate(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.length, |t| {
            self.height
                + self.amplitude
                    * (2.0 * std::f64::consts::PI * self.frequency * t as f64 + self.phi).sin()
        })
    }
}

/// Shorthand for `SinusoidConfig { .. }.generate()`
pub fn get_sinusoid(length: usize, amplitude: f64, frequency: f64, phi: f64, height: f64) -> Array1<f64> {
    SinusoidConfig {
        length,
        amplitude,
        frequency,
        phi,
        height,
    }
    .generate()
}

/// Build an OHLCV table around a close series.
///
/// `noise` is a relative amplitude: each price is perturbed by a uniform draw in
/// `[-noise, noise] * |close|`. The table has the columns `open`, `high`, `low`,
/// `close`, `adj_close` and `volume`; `open` is the previous close.
pub fn create_dataframe(close: &Array1<f64>, noise: f64, seed: Option<u64>) -> Result<FeatureTable> {
    if noise < 0.0 || !noise.is_finite() {
        return Err(TrendlabError::invalid_parameter("noise", noise, "must be a finite value >= 0"));
    }
    let mut rng = match seed {
        Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
        None => Xoshiro256PlusPlus::from_entropy(),
    };

    let n = close.len();
    let mut jitter = |scale: f64| -> f64 {
        if noise == 0.0 {
            0.0
        } else {
            rng.gen_range(-noise..=noise) * scale.abs()
        }
    };

    let close: Vec<f64> = close.iter().map(|&c| c + jitter(c)).collect();
    let open: Vec<f64> = (0..n).map(|t| if t == 0 { close[0] } else { close[t - 1] }).collect();
    let high: Vec<f64> = (0..n)
        .map(|t| open[t].max(close[t]) + jitter(close[t]).abs())
        .collect();
    let low: Vec<f64> = (0..n)
        .map(|t| open[t].min(close[t]) - jitter(close[t]).abs())
        .collect();
    let volume: Vec<f64> = (0..n).map(|_| 1_000.0 * (1.0 + jitter(1.0))).collect();

    FeatureTable::from_columns(vec![
        ("open", open),
        ("high", high),
        ("low", low),
        ("close", close.clone()),
        ("adj_close", close),
        ("volume", volume),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sinusoid_shape() {
        let y = get_sinusoid(50, 2.0, 0.1, 0.0, 10.0);
        assert_eq!(y.len(), 50);
        assert!((y[0] - 10.0).abs() < 1e-12);
        assert!(y.iter().all(|v| (8.0..=12.0).contains(v)));
    }

    #[test]
    fn test_create_dataframe_without_noise() {
        let y = get_sinusoid(20, 1.0, 0.1, 0.0, 5.0);
        let table = create_dataframe(&y, 0.0, None).unwrap();
        assert_eq!(table.nrows(), 20);
        assert_eq!(table.column("close").unwrap(), y.view());
        assert_eq!(table.column("open").unwrap()[3], y[2]);
    }

    #[test]
    fn test_create_dataframe_seeded_noise_is_deterministic() {
        let y = SinusoidConfig::default().with_height(10.0).generate();
        let a = create_dataframe(&y, 0.01, Some(7)).unwrap();
        let b = create_dataframe(&y, 0.01, Some(7)).unwrap();
        assert_eq!(a, b);

        let high = a.column("high").unwrap();
        let low = a.column("low").unwrap();
        assert!(high.iter().zip(low.iter()).all(|(h, l)| h >= l));
    }

    #[test]
    fn test_negative_noise_rejected() {
        let y = get_sinusoid(5, 1.0, 0.1, 0.0, 0.0);
        assert!(create_dataframe(&y, -0.1, None).is_err());
    }
}
