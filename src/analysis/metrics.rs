//! Classification and regression metrics

use crate::error::{Result, TrendlabError};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric name to value; immutable once built
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    metrics: BTreeMap<String, f64>,
}

impl AnalysisReport {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            metrics: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Metric value, `FeatureNotFound` when the report does not carry it
    pub fn metric(&self, name: &str) -> Result<f64> {
        self.get(name)
            .ok_or_else(|| TrendlabError::FeatureNotFound(format!("metric '{}'", name)))
    }

    pub fn precision(&self) -> Option<f64> {
        self.get("precision")
    }

    pub fn recall(&self) -> Option<f64> {
        self.get("recall")
    }

    pub fn f1_score(&self) -> Option<f64> {
        self.get("f1_score")
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.get("accuracy")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

fn check_lengths(a: ArrayView1<f64>, b: ArrayView1<f64>, what: &str) -> Result<()> {
    if a.len() != b.len() {
        return Err(TrendlabError::ShapeError {
            expected: format!("{} {}", a.len(), what),
            actual: format!("{} {}", b.len(), what),
        });
    }
    if a.is_empty() {
        return Err(TrendlabError::InsufficientData("no rows to analyse".to_string()));
    }
    Ok(())
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

fn is_positive(v: f64) -> bool {
    v >= 0.5
}

/// Binary precision, recall, F1 and accuracy with class 1 as positive.
/// `roc_auc` is added when probabilities are given and both classes occur.
pub fn classification_analysis(
    y_true: ArrayView1<f64>,
    y_pred: ArrayView1<f64>,
    y_prob: Option<ArrayView1<f64>>,
) -> Result<AnalysisReport> {
    check_lengths(y_true, y_pred, "predictions")?;

    let (mut tp, mut fp, mut fn_, mut tn) = (0.0, 0.0, 0.0, 0.0);
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        match (is_positive(t), is_positive(p)) {
            (true, true) => tp += 1.0,
            (false, true) => fp += 1.0,
            (true, false) => fn_ += 1.0,
            (false, false) => tn += 1.0,
        }
    }

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1_score = ratio(2.0 * precision * recall, precision + recall);
    let accuracy = ratio(tp + tn, y_true.len() as f64);

    let mut metrics = BTreeMap::from([
        ("precision".to_string(), precision),
        ("recall".to_string(), recall),
        ("f1_score".to_string(), f1_score),
        ("accuracy".to_string(), accuracy),
    ]);
    if let Some(prob) = y_prob {
        check_lengths(y_true, prob, "probabilities")?;
        let positives = y_true.iter().filter(|&&t| is_positive(t)).count();
        if positives > 0 && positives < y_true.len() {
            metrics.insert("roc_auc".to_string(), roc_auc(y_true, prob)?);
        }
    }
    Ok(AnalysisReport { metrics })
}

/// Area under the ROC curve via the rank-sum statistic; tied scores share
/// their average rank
pub fn roc_auc(y_true: ArrayView1<f64>, y_prob: ArrayView1<f64>) -> Result<f64> {
    check_lengths(y_true, y_prob, "probabilities")?;

    let mut order: Vec<usize> = (0..y_prob.len()).collect();
    order.sort_by(|&a, &b| y_prob[a].total_cmp(&y_prob[b]));

    let mut ranks = vec![0.0; order.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && y_prob[order[end]] == y_prob[order[start]] {
            end += 1;
        }
        // ranks are 1-based
        let avg = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg;
        }
        start = end;
    }

    let n_pos = y_true.iter().filter(|&&t| is_positive(t)).count() as f64;
    let n_neg = y_true.len() as f64 - n_pos;
    if n_pos == 0.0 || n_neg == 0.0 {
        return Err(TrendlabError::ComputationError(
            "roc_auc needs both classes in y_true".to_string(),
        ));
    }
    let rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|(&t, _)| is_positive(t))
        .map(|(_, &r)| r)
        .sum();
    Ok((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// `mape` (percent, over rows with a non-zero target), `rmse` and `mse`
pub fn regression_analysis(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<AnalysisReport> {
    check_lengths(y_true, y_pred, "predictions")?;

    let n = y_true.len() as f64;
    let mse = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n;

    let relative: Vec<f64> = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, _)| **t != 0.0)
        .map(|(t, p)| ((t - p) / t).abs())
        .collect();
    if relative.is_empty() {
        return Err(TrendlabError::ComputationError(
            "mape is undefined when every target is zero".to_string(),
        ));
    }
    let mape = 100.0 * relative.iter().sum::<f64>() / relative.len() as f64;

    Ok(AnalysisReport::from_pairs([
        ("mape", mape),
        ("rmse", mse.sqrt()),
        ("mse", mse),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classification_counts() {
        let y_true = array![1.0, 1.0, 0.0, 0.0, 1.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 1.0];
        let report = classification_analysis(y_true.view(), y_pred.view(), None).unwrap();
        assert!((report.precision().unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.recall().unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.f1_score().unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.accuracy().unwrap() - 0.6).abs() < 1e-12);
        assert!(report.get("roc_auc").is_none());
    }

    #[test]
    fn test_zero_division_yields_zero() {
        let y_true = array![0.0, 0.0];
        let y_pred = array![0.0, 0.0];
        let report = classification_analysis(y_true.view(), y_pred.view(), Some(y_pred.view())).unwrap();
        assert_eq!(report.precision(), Some(0.0));
        assert_eq!(report.recall(), Some(0.0));
        assert_eq!(report.f1_score(), Some(0.0));
        assert_eq!(report.accuracy(), Some(1.0));
        // a single class carries no ranking information
        assert!(report.get("roc_auc").is_none());
    }

    #[test]
    fn test_roc_auc_with_ties() {
        let y_true = array![0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(y_true.view(), array![0.1, 0.4, 0.35, 0.8].view()).unwrap(), 0.75);
        assert_eq!(roc_auc(y_true.view(), array![0.5, 0.5, 0.5, 0.5].view()).unwrap(), 0.5);
        assert_eq!(roc_auc(y_true.view(), array![0.0, 0.0, 1.0, 1.0].view()).unwrap(), 1.0);
    }

    #[test]
    fn test_regression_analysis() {
        let y_true = array![100.0, 200.0, 0.0];
        let y_pred = array![110.0, 180.0, 1.0];
        let report = regression_analysis(y_true.view(), y_pred.view()).unwrap();
        assert!((report.metric("mape").unwrap() - 10.0).abs() < 1e-9);
        assert!((report.metric("mse").unwrap() - 167.0).abs() < 1e-9);
        assert!((report.metric("rmse").unwrap() - 167f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_length_mismatch() {
        let a = array![1.0, 0.0];
        let b = array![1.0];
        assert!(matches!(
            classification_analysis(a.view(), b.view(), None),
            Err(TrendlabError::ShapeError { .. })
        ));
    }
}
