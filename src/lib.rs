//! trendlab - trend classification experiments on financial time series
//!
//! This crate provides the pieces of a price-trend classification study:
//! - Feature tables loaded from CSV through polars, technical indicators and
//!   synthetic sinusoid prices
//! - Chronological train/test splits and cross-validation folds
//! - A registry of classifiers behind one contract (trees, boosting, kernels,
//!   naive Bayes, MLP, LSTM variants, baselines, voting and grid search)
//! - Recurrent regressors of the next close or percent change
//! - Comparable analysis reports and CSV persistence of cross-validation
//!
//! # Modules
//!
//! - [`data`] - Feature tables, indicators and synthetic series
//! - [`splitter`] - Hold-out and cross-validation splits
//! - [`estimators`] - In-house learning algorithms
//! - [`classifier`] - The `Classifier` contract and the name registry
//! - [`regressor`] - Recurrent regression of trend values
//! - [`analysis`] - Metrics and cross-validation reports
//! - [`experiment`] - Declarative experiment files
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use trendlab::prelude::*;
//!
//! # fn main() -> trendlab::error::Result<()> {
//! let close = SinusoidConfig::default().with_length(300).with_height(10.0).generate();
//! let table = create_dataframe(&close, 0.01, Some(42))?;
//! let table = add_technical_indicators(table, &["trend_1d", "target"])?;
//! let mut table = remove_features(table, &["open", "high", "low", "close", "adj_close", "volume"])?;
//! table.drop_missing();
//!
//! let splitter = DataSplitter::new(table, "target")?;
//! let mut model = get_classifier("decision tree", None, None)?;
//! let report = model.evaluate_cross_validation(&splitter, "target", false)?;
//! println!("accuracy {:.3} ± {:.3}", report.average_accuracy(), report.std_accuracy());
//! # Ok(())
//! # }
//! ```

pub mod error;

pub mod analysis;
pub mod classifier;
pub mod data;
pub mod estimators;
pub mod experiment;
pub mod regressor;
pub mod splitter;

pub mod cli;

pub use error::{Result, TrendlabError};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::analysis::{classification_analysis, regression_analysis, AnalysisReport, CrossValidationReport};
    pub use crate::classifier::{get_classifier, list, Classifier, Params, PredictionSet};
    pub use crate::data::indicators::{add_target_pct_change, add_technical_indicators, remove_features};
    pub use crate::data::synthetic::{create_dataframe, get_sinusoid, SinusoidConfig};
    pub use crate::data::balance::{smote_balance, SmoteConfig};
    pub use crate::data::FeatureTable;
    pub use crate::error::{Result, TrendlabError};
    pub use crate::experiment::{run_experiment, ExperimentConfig, Task};
    pub use crate::regressor::TrendValueRegressor;
    pub use crate::splitter::{DataSplitter, FoldStrategy, Split};
}
