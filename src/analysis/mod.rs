//! Standardized analysis reports
//!
//! Pure metric functions over true labels, predicted labels and predicted
//! probabilities, plus cross-validation aggregation and its CSV tables.

mod metrics;
mod report;

pub use metrics::{classification_analysis, regression_analysis, roc_auc, AnalysisReport};
pub use report::{
    export_history, CrossValidationReport, FoldReport, ANALYSIS_FILE, DEFAULT_OUTPUT_DIR,
    RESULTS_FILE,
};
