//! Declarative experiments: load or synthesize a price table, derive
//! indicators and a target, then evaluate one classifier or one recurrent
//! regressor on it

use crate::analysis::{export_history, AnalysisReport, CrossValidationReport};
use crate::classifier::{get_classifier, Params};
use crate::data::indicators::{add_target_pct_change, add_technical_indicators, remove_features};
use crate::data::balance::{smote_balance, SmoteConfig};
use crate::data::synthetic::{create_dataframe, SinusoidConfig};
use crate::data::FeatureTable;
use crate::error::{Result, TrendlabError};
use crate::estimators::TrainingHistory;
use crate::regressor::TrendValueRegressor;
use crate::splitter::{DataSplitter, FoldStrategy, Split, DEFAULT_NB_SPLITS, DEFAULT_SEQ_LEN};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the exported training history
pub const HISTORY_FILE: &str = "training_history.csv";
/// File name of the hold-out analysis
pub const ANALYSIS_JSON_FILE: &str = "analysis.json";
/// File name of the exported regression predictions
pub const PREDICTIONS_FILE: &str = "predictions.csv";

/// What the experiment predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Binary trend through a registry classifier
    #[default]
    Classification,
    /// Continuous value through a recurrent regressor
    Regression,
}

/// Where the price table comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    /// OHLCV CSV file
    Csv { path: PathBuf },
    /// Noisy sinusoid wrapped into an OHLCV table
    Sinusoid {
        #[serde(default)]
        sinusoid: SinusoidConfig,
        #[serde(default)]
        noise: f64,
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl DataSource {
    pub fn load(&self) -> Result<FeatureTable> {
        match self {
            DataSource::Csv { path } => FeatureTable::read_csv(path),
            DataSource::Sinusoid { sinusoid, noise, seed } => create_dataframe(&sinusoid.generate(), *noise, *seed),
        }
    }
}

/// Binary target from the percent change `periods` rows ahead
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PctChangeTarget {
    pub periods: usize,
    #[serde(default)]
    pub threshold_pct: f64,
}

/// Fold layout of a cross-validated experiment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationConfig {
    #[serde(default = "default_nb_splits")]
    pub nb_splits: usize,
    #[serde(default)]
    pub strategy: FoldStrategy,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            nb_splits: DEFAULT_NB_SPLITS,
            strategy: FoldStrategy::default(),
        }
    }
}

/// One experiment, usually read from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub data: DataSource,

    #[serde(default)]
    pub task: Task,

    /// Indicator columns to append, any name accepted by
    /// [`add_technical_indicators`]
    #[serde(default)]
    pub indicators: Vec<String>,

    /// Build `target` from a future percent change instead of an indicator
    #[serde(default)]
    pub target_pct_change: Option<PctChangeTarget>,

    /// Columns dropped before modelling
    #[serde(default)]
    pub remove_features: Vec<String>,

    #[serde(default = "default_target")]
    pub target: String,

    /// Registry name; a recurrent architecture for regression
    #[serde(default = "default_classifier")]
    pub classifier: String,

    #[serde(default)]
    pub params: Params,

    /// Hold-out fraction, ignored when `cross_validation` is set
    #[serde(default = "default_train_fraction")]
    pub train_fraction: f64,

    #[serde(default)]
    pub cross_validation: Option<CrossValidationConfig>,

    #[serde(default = "default_seq_len")]
    pub seq_len: usize,

    /// Oversample minority target classes after preparation
    #[serde(default)]
    pub balance: Option<SmoteConfig>,

    /// Results are only written when set
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_target() -> String {
    "target".to_string()
}

fn default_classifier() -> String {
    "decision tree".to_string()
}

fn default_train_fraction() -> f64 {
    0.7
}

fn default_seq_len() -> usize {
    DEFAULT_SEQ_LEN
}

fn default_nb_splits() -> usize {
    DEFAULT_NB_SPLITS
}

impl ExperimentConfig {
    pub fn new(data: DataSource) -> Self {
        Self {
            data,
            task: Task::default(),
            indicators: Vec::new(),
            target_pct_change: None,
            remove_features: Vec::new(),
            target: default_target(),
            classifier: default_classifier(),
            params: Params::new(),
            train_fraction: default_train_fraction(),
            cross_validation: None,
            seq_len: default_seq_len(),
            balance: None,
            output_dir: None,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| TrendlabError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.task = task;
        self
    }

    pub fn with_indicators<S: Into<String>>(mut self, indicators: impl IntoIterator<Item = S>) -> Self {
        self.indicators = indicators.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_target_pct_change(mut self, periods: usize, threshold_pct: f64) -> Self {
        self.target_pct_change = Some(PctChangeTarget { periods, threshold_pct });
        self
    }

    pub fn with_removed_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.remove_features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_classifier(mut self, name: impl Into<String>, params: Params) -> Self {
        self.classifier = name.into();
        self.params = params;
        self
    }

    pub fn with_train_fraction(mut self, fraction: f64) -> Self {
        self.train_fraction = fraction;
        self
    }

    pub fn with_cross_validation(mut self, cross_validation: Option<CrossValidationConfig>) -> Self {
        self.cross_validation = cross_validation;
        self
    }

    pub fn with_seq_len(mut self, seq_len: usize) -> Self {
        self.seq_len = seq_len;
        self
    }

    pub fn with_balance(mut self, balance: Option<SmoteConfig>) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    /// Load the data and derive every configured column; rows left with a
    /// missing value are dropped. With `balance` set, synthetic minority rows
    /// are appended after the real ones.
    pub fn prepare_table(&self) -> Result<FeatureTable> {
        let mut table = self.data.load()?;
        table.normalize_headings()?;
        if !self.indicators.is_empty() {
            let names: Vec<&str> = self.indicators.iter().map(String::as_str).collect();
            table = add_technical_indicators(table, &names)?;
        }
        if let Some(target) = self.target_pct_change {
            table = add_target_pct_change(table, target.periods, target.threshold_pct)?;
        }
        if !self.remove_features.is_empty() {
            let names: Vec<&str> = self.remove_features.iter().map(String::as_str).collect();
            table = remove_features(table, &names)?;
        }
        let dropped = table.drop_missing();
        if let Some(smote) = &self.balance {
            if self.task == Task::Regression {
                return Err(TrendlabError::ConfigError(
                    "class balancing needs a classification target".to_string(),
                ));
            }
            table = smote_balance(&table, &self.target, smote)?;
        }
        info!(rows = table.nrows(), columns = table.ncols(), dropped, "Prepared feature table");
        Ok(table)
    }

    pub fn splitter(&self) -> Result<DataSplitter> {
        let splitter = DataSplitter::new(self.prepare_table()?, self.target.as_str())?.with_seq_len(self.seq_len)?;
        Ok(match self.cross_validation {
            Some(cv) => splitter.with_strategy(cv.strategy).with_nb_splits(cv.nb_splits),
            None => splitter,
        })
    }
}

/// Result of [`run_experiment`]
#[derive(Debug, Clone)]
pub enum ExperimentOutcome {
    Holdout {
        analysis: AnalysisReport,
        train_rows: usize,
        test_rows: usize,
        history: Option<TrainingHistory>,
    },
    CrossValidation(CrossValidationReport),
}

impl ExperimentOutcome {
    /// Hold-out accuracy, or the mean fold accuracy
    pub fn accuracy(&self) -> Option<f64> {
        match self {
            ExperimentOutcome::Holdout { analysis, .. } => analysis.accuracy(),
            ExperimentOutcome::CrossValidation(report) => Some(report.average_accuracy()),
        }
    }
}

/// Evaluate the configured classifier or regressor. Cross-validation tables,
/// the hold-out analysis, any training history and regression predictions are
/// written under `output_dir` when set.
pub fn run_experiment(config: &ExperimentConfig) -> Result<ExperimentOutcome> {
    if config.task == Task::Regression {
        return run_regression(config);
    }
    let splitter = config.splitter()?;
    let mut classifier = get_classifier(&config.classifier, Some(&config.params), None)?;
    info!(
        classifier = config.classifier.as_str(),
        rows = splitter.len(),
        cross_validation = config.cross_validation.is_some(),
        "Running experiment"
    );

    if config.cross_validation.is_some() {
        let report =
            classifier.evaluate_cross_validation_in(&splitter, &config.target, config.output_dir.as_deref())?;
        return Ok(ExperimentOutcome::CrossValidation(report));
    }

    let split = splitter.split_simple(config.train_fraction)?;
    classifier.fit(&split)?;
    let analysis = classifier.evaluate(&split)?;
    let history = classifier.history().cloned();

    if let Some(dir) = &config.output_dir {
        write_holdout(dir, &analysis, history.as_ref())?;
    }
    Ok(holdout(&split, analysis, history))
}

fn run_regression(config: &ExperimentConfig) -> Result<ExperimentOutcome> {
    if config.cross_validation.is_some() {
        return Err(TrendlabError::ConfigError(
            "cross-validation is only available for classification".to_string(),
        ));
    }
    let mut regressor = TrendValueRegressor::new(&config.classifier, config.params.clone())?;
    let splitter = config.splitter()?;
    info!(
        regressor = regressor.name(),
        target = config.target.as_str(),
        rows = splitter.len(),
        "Running regression experiment"
    );

    let split = splitter.split_simple(config.train_fraction)?;
    regressor.fit(&split)?;
    let analysis = regressor.evaluate(&split)?;
    let history = regressor.history().cloned();

    if let Some(dir) = &config.output_dir {
        write_holdout(dir, &analysis, history.as_ref())?;
        regressor.export_predictions(&split, dir.join(PREDICTIONS_FILE))?;
    }
    Ok(holdout(&split, analysis, history))
}

fn write_holdout(dir: &Path, analysis: &AnalysisReport, history: Option<&TrainingHistory>) -> Result<()> {
    fs::create_dir_all(dir)?;
    serde_json::to_writer_pretty(File::create(dir.join(ANALYSIS_JSON_FILE))?, analysis)?;
    if let Some(history) = history.filter(|h| !h.is_empty()) {
        export_history(dir.join(HISTORY_FILE), history)?;
    }
    info!(dir = %dir.display(), "Wrote experiment results");
    Ok(())
}

fn holdout(split: &Split, analysis: AnalysisReport, history: Option<TrainingHistory>) -> ExperimentOutcome {
    ExperimentOutcome::Holdout {
        analysis,
        train_rows: split.train_indices().len(),
        test_rows: split.test_indices().len(),
        history,
    }
}
