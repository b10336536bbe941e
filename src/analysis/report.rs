//! Cross-validation aggregation and CSV persistence

use super::metrics::AnalysisReport;
use crate::error::{Result, TrendlabError};
use crate::estimators::TrainingHistory;
use polars::df;
use polars::prelude::{CsvWriter, DataFrame, SerWriter};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

/// Directory used when persisting cross-validation results
pub const DEFAULT_OUTPUT_DIR: &str = "tmp";
/// Per-fold table
pub const ANALYSIS_FILE: &str = "cross_validation_analysis.csv";
/// One-row summary table
pub const RESULTS_FILE: &str = "cross_validation_results.csv";

/// Metrics of one fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldReport {
    pub fold: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub analysis: AnalysisReport,
}

/// Per-fold reports with their accuracy aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    folds: Vec<FoldReport>,
    accuracies: Vec<f64>,
    average_accuracy: f64,
    std_accuracy: f64,
}

impl CrossValidationReport {
    pub fn from_folds(folds: Vec<FoldReport>) -> Result<Self> {
        if folds.is_empty() {
            return Err(TrendlabError::InsufficientData("no folds to aggregate".to_string()));
        }
        let accuracies = folds
            .iter()
            .map(|f| f.analysis.metric("accuracy"))
            .collect::<Result<Vec<f64>>>()?;

        let n = accuracies.len() as f64;
        let average_accuracy = accuracies.iter().sum::<f64>() / n;
        let std_accuracy = (accuracies
            .iter()
            .map(|a| (a - average_accuracy).powi(2))
            .sum::<f64>()
            / n)
            .sqrt();

        Ok(Self {
            folds,
            accuracies,
            average_accuracy,
            std_accuracy,
        })
    }

    pub fn folds(&self) -> &[FoldReport] {
        &self.folds
    }

    pub fn nb_splits(&self) -> usize {
        self.folds.len()
    }

    pub fn accuracies(&self) -> &[f64] {
        &self.accuracies
    }

    pub fn average_accuracy(&self) -> f64 {
        self.average_accuracy
    }

    /// Population standard deviation of the fold accuracies
    pub fn std_accuracy(&self) -> f64 {
        self.std_accuracy
    }

    /// Aggregate as an [`AnalysisReport`]
    pub fn summary(&self) -> AnalysisReport {
        AnalysisReport::from_pairs([
            ("average_accuracy", self.average_accuracy),
            ("std_accuracy", self.std_accuracy),
            ("nb_splits", self.nb_splits() as f64),
        ])
    }

    /// Per-fold table and one-row summary table
    pub fn to_dataframes(&self) -> Result<(DataFrame, DataFrame)> {
        let metric = |name: &str| -> Vec<f64> {
            self.folds
                .iter()
                .map(|f| f.analysis.get(name).unwrap_or(0.0))
                .collect()
        };
        let per_fold = df!(
            "fold" => self.folds.iter().map(|f| f.fold as i64).collect::<Vec<_>>(),
            "accuracy" => metric("accuracy"),
            "precision" => metric("precision"),
            "recall" => metric("recall"),
            "f1_score" => metric("f1_score"),
            "train_size" => self.folds.iter().map(|f| f.train_size as i64).collect::<Vec<_>>(),
            "test_size" => self.folds.iter().map(|f| f.test_size as i64).collect::<Vec<_>>(),
        )?;
        let summary = df!(
            "nb_splits" => [self.nb_splits() as i64],
            "average_accuracy" => [self.average_accuracy],
            "std_accuracy" => [self.std_accuracy],
        )?;
        Ok((per_fold, summary))
    }

    /// Write both tables under `dir`, creating it when missing
    pub fn persist(&self, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let (mut per_fold, mut summary) = self.to_dataframes()?;

        let analysis_path = dir.join(ANALYSIS_FILE);
        let mut file = File::create(&analysis_path)?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut per_fold)?;

        let results_path = dir.join(RESULTS_FILE);
        let mut file = File::create(&results_path)?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut summary)?;

        info!(
            dir = %dir.display(),
            folds = self.nb_splits(),
            average_accuracy = self.average_accuracy,
            "Persisted cross-validation results"
        );
        Ok((analysis_path, results_path))
    }
}

/// Write a training history as `epoch,loss` CSV
pub fn export_history(path: impl AsRef<Path>, history: &TrainingHistory) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut frame = df!(
        "epoch" => (1..=history.len() as i64).collect::<Vec<_>>(),
        "loss" => history.loss().to_vec(),
    )?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut frame)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureTable;

    fn fold(fold: usize, accuracy: f64) -> FoldReport {
        FoldReport {
            fold,
            train_size: 80,
            test_size: 20,
            analysis: AnalysisReport::from_pairs([
                ("accuracy", accuracy),
                ("precision", 0.5),
                ("recall", 1.0),
                ("f1_score", 2.0 / 3.0),
            ]),
        }
    }

    #[test]
    fn test_aggregate_mean_and_std() {
        let report = CrossValidationReport::from_folds(vec![fold(0, 0.5), fold(1, 0.7)]).unwrap();
        assert_eq!(report.accuracies(), &[0.5, 0.7]);
        assert!((report.average_accuracy() - 0.6).abs() < 1e-12);
        assert!((report.std_accuracy() - 0.1).abs() < 1e-12);
        assert_eq!(report.summary().get("nb_splits"), Some(2.0));
    }

    #[test]
    fn test_empty_folds_rejected() {
        assert!(CrossValidationReport::from_folds(Vec::new()).is_err());
    }

    #[test]
    fn test_persist_writes_both_tables() {
        let dir = tempfile::tempdir().unwrap();
        let report = CrossValidationReport::from_folds(vec![fold(0, 0.5), fold(1, 0.75)]).unwrap();
        let (analysis, results) = report.persist(dir.path().join("tmp")).unwrap();

        let per_fold = FeatureTable::read_csv(&analysis).unwrap();
        assert_eq!(
            per_fold.columns(),
            &["fold", "accuracy", "precision", "recall", "f1_score", "train_size", "test_size"]
        );
        assert_eq!(per_fold.nrows(), 2);
        assert_eq!(per_fold.column("accuracy").unwrap()[1], 0.75);

        let summary = FeatureTable::read_csv(&results).unwrap();
        assert_eq!(summary.columns(), &["nb_splits", "average_accuracy", "std_accuracy"]);
        assert_eq!(summary.column("average_accuracy").unwrap()[0], 0.625);
    }

    #[test]
    fn test_export_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = TrainingHistory::default();
        history.push(0.7);
        history.push(0.5);
        let path = dir.path().join("history.csv");
        export_history(&path, &history).unwrap();

        let table = FeatureTable::read_csv(&path).unwrap();
        assert_eq!(table.columns(), &["epoch", "loss"]);
        assert_eq!(table.column("loss").unwrap().to_vec(), vec![0.7, 0.5]);
    }
}
