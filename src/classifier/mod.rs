//! Uniform classifier contract
//!
//! Every family implements [`Classifier`]: `build` allocates a fresh
//! [`ModelHandle`] from the configured [`Params`], `fit` trains it on a
//! [`Split`]'s training subset, `predict`/`evaluate` apply it, and
//! `evaluate_cross_validation` rebuilds and refits it once per fold.
//!
//! # Example
//!
//! ```no_run
//! use trendlab::classifier::{get_classifier, Classifier};
//! use trendlab::data::FeatureTable;
//! use trendlab::splitter::DataSplitter;
//!
//! # fn main() -> trendlab::error::Result<()> {
//! let table = FeatureTable::read_csv("prices.csv")?;
//! let splitter = DataSplitter::new(table, "target")?;
//! let split = splitter.split_simple(0.7)?;
//!
//! let mut model = get_classifier("decision tree", None, None)?;
//! model.fit(&split)?;
//! let report = model.evaluate(&split)?;
//! println!("f1 = {:?}", report.f1_score());
//! # Ok(())
//! # }
//! ```

mod baselines;
mod bayes;
mod factory;
mod grid_search;
mod kernel;
mod meta;
mod neural;
mod params;
mod trees;

pub use baselines::{AlwaysAsPrevious, AlwaysSameClass};
pub use bayes::GaussianNaiveBayesClassifier;
pub use factory::{get_classifier, list, ClassifierKind, REGISTRY};
pub use grid_search::{GridSearchClassifier, Scoring};
pub use kernel::{GaussianProcessClassifier, SupportVectorClassifier};
pub use meta::{prepare_models_for_meta_classifier_voting, MetaClassifierVoting};
pub use neural::{MlpClassifier, RecurrentClassifier};
pub(crate) use neural::recurrent_config;
pub use params::{expand_grid, ParamGrid, Params};
pub use trees::{DecisionTreeClassifier, GradientBoostingClassifier};

use crate::analysis::{
    classification_analysis, AnalysisReport, CrossValidationReport, FoldReport, DEFAULT_OUTPUT_DIR,
};
use crate::error::{Result, TrendlabError};
use crate::estimators::{ModelHandle, TrainingHistory};
use crate::splitter::{DataSplitter, ModelInput, Split};
use ndarray::Array1;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info};

/// Seed used by stochastic families when `random_state` is not given, so that
/// repeated evaluations agree
pub const DEFAULT_RANDOM_STATE: u64 = 42;

/// Hard labels and positive-class probabilities aligned with the input rows
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSet {
    labels: Array1<f64>,
    probabilities: Array1<f64>,
}

impl PredictionSet {
    pub fn new(labels: Array1<f64>, probabilities: Array1<f64>) -> Result<Self> {
        if labels.len() != probabilities.len() {
            return Err(TrendlabError::ShapeError {
                expected: format!("{} probabilities", labels.len()),
                actual: format!("{} probabilities", probabilities.len()),
            });
        }
        Ok(Self {
            labels,
            probabilities,
        })
    }

    pub fn labels(&self) -> &Array1<f64> {
        &self.labels
    }

    pub fn probabilities(&self) -> &Array1<f64> {
        &self.probabilities
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// State shared by every classifier: configuration, the owned handle and the
/// split it was last fitted on
#[derive(Debug, Clone)]
pub struct ClassifierCore {
    name: String,
    params: Params,
    handle: Option<ModelHandle>,
    fitted: bool,
    split: Option<Split>,
}

impl ClassifierCore {
    pub fn new(name: impl Into<String>, params: Params) -> Self {
        Self {
            name: name.into(),
            params,
            handle: None,
            fitted: false,
            split: None,
        }
    }

    /// Bind a split for [`Classifier::fit_bound`] and [`Classifier::get_analysis`]
    pub fn bind(&mut self, split: Option<&Split>) {
        self.split = split.cloned();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn split(&self) -> Option<&Split> {
        self.split.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn fitted_handle(&self) -> Result<&ModelHandle> {
        match (&self.handle, self.fitted) {
            (Some(handle), true) => Ok(handle),
            _ => Err(TrendlabError::NotFitted),
        }
    }
}

pub trait Classifier: Send {
    fn core(&self) -> &ClassifierCore;

    fn core_mut(&mut self) -> &mut ClassifierCore;

    /// Unfitted estimator built from the configured params
    fn new_handle(&self) -> Result<ModelHandle>;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn params(&self) -> &Params {
        self.core().params()
    }

    /// Allocate a fresh handle, replacing any previous one
    fn build(&mut self) -> Result<()> {
        let handle = self.new_handle()?;
        let core = self.core_mut();
        core.handle = Some(handle);
        core.fitted = false;
        Ok(())
    }

    /// Train on the split's training subset, building first when needed
    fn fit(&mut self, split: &Split) -> Result<()> {
        fit_handle(self, split)
    }

    /// Fit on the split bound at construction
    fn fit_bound(&mut self) -> Result<()> {
        let split = self
            .core()
            .split
            .clone()
            .ok_or_else(|| TrendlabError::InvalidInput("no split bound to this classifier".to_string()))?;
        self.fit(&split)
    }

    fn predict(&self, input: ModelInput<'_>) -> Result<PredictionSet> {
        let handle = self.core().fitted_handle()?;
        let probabilities = handle.predict_proba(input)?;
        let labels = handle.predict(input)?;
        PredictionSet::new(labels, probabilities)
    }

    /// Classification metrics on the split's test subset
    fn evaluate(&self, split: &Split) -> Result<AnalysisReport> {
        let prediction = self.predict(split.test_input())?;
        classification_analysis(
            split.y_test().view(),
            prediction.labels().view(),
            Some(prediction.probabilities().view()),
        )
    }

    /// Evaluate on the split last fitted on
    fn get_analysis(&self) -> Result<AnalysisReport> {
        let core = self.core();
        match (&core.split, core.fitted) {
            (Some(split), true) => self.evaluate(split),
            _ => Err(TrendlabError::NotFitted),
        }
    }

    /// Rebuild, fit and evaluate once per fold of `splitter`, predicting
    /// `target`; with `persist` the tables are written under `tmp/`
    fn evaluate_cross_validation(
        &mut self,
        splitter: &DataSplitter,
        target: &str,
        persist: bool,
    ) -> Result<CrossValidationReport> {
        let dir = persist.then(|| Path::new(DEFAULT_OUTPUT_DIR));
        self.evaluate_cross_validation_in(splitter, target, dir)
    }

    /// Cross-validation persisting to `output_dir` when given
    fn evaluate_cross_validation_in(
        &mut self,
        splitter: &DataSplitter,
        target: &str,
        output_dir: Option<&Path>,
    ) -> Result<CrossValidationReport> {
        cross_validate(self, splitter, target, output_dir)
    }

    /// Candidate values per hyperparameter for grid search
    fn get_param_grid(&self) -> Option<ParamGrid> {
        None
    }

    /// Loss per epoch of the last fit, for gradient-trained families
    fn history(&self) -> Option<&TrainingHistory> {
        self.core().handle.as_ref().and_then(ModelHandle::history)
    }

    fn model_handle(&self) -> Option<&ModelHandle> {
        self.core().handle.as_ref()
    }

    /// Write the fitted handle as JSON
    fn save(&self, path: &Path) -> Result<()> {
        let handle = self.core().fitted_handle()?;
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, handle)?;
        info!(classifier = self.name(), path = %path.display(), "Saved model");
        Ok(())
    }

    /// Restore a handle written by [`Classifier::save`]; the classifier must
    /// be of the same family
    fn load(&mut self, path: &Path) -> Result<()> {
        let handle: ModelHandle = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        let expected = self.new_handle()?.kind();
        if handle.kind() != expected {
            return Err(TrendlabError::InvalidInput(format!(
                "{} holds a {} model, expected {}",
                path.display(),
                handle.kind(),
                expected
            )));
        }
        let core = self.core_mut();
        core.handle = Some(handle);
        core.fitted = true;
        Ok(())
    }
}

pub(crate) fn fit_handle<C: Classifier + ?Sized>(classifier: &mut C, split: &Split) -> Result<()> {
    if classifier.core().handle.is_none() {
        classifier.build()?;
    }
    let core = classifier.core_mut();
    let handle = core.handle.as_mut().ok_or(TrendlabError::NotFitted)?;
    info!(
        classifier = core.name.as_str(),
        fold = split.fold(),
        rows = split.train_indices().len(),
        "Fitting classifier"
    );
    handle.fit(split.train_input(), split.y_train().view())?;
    core.fitted = true;
    core.split = Some(split.clone());
    Ok(())
}

pub(crate) fn cross_validate<C: Classifier + ?Sized>(
    classifier: &mut C,
    splitter: &DataSplitter,
    target: &str,
    output_dir: Option<&Path>,
) -> Result<CrossValidationReport> {
    let retargeted;
    let splitter = if splitter.target() == target {
        splitter
    } else {
        retargeted = splitter.clone().with_target(target)?;
        &retargeted
    };

    let mut folds = Vec::new();
    for split in splitter.folds()? {
        classifier.build()?;
        classifier.fit(&split)?;
        let analysis = classifier.evaluate(&split)?;
        debug!(
            classifier = classifier.name(),
            fold = split.fold(),
            accuracy = analysis.accuracy().unwrap_or(0.0),
            "Fold evaluated"
        );
        folds.push(FoldReport {
            fold: split.fold(),
            train_size: split.train_indices().len(),
            test_size: split.test_indices().len(),
            analysis,
        });
    }

    let report = CrossValidationReport::from_folds(folds)?;
    info!(
        classifier = classifier.name(),
        folds = report.nb_splits(),
        average_accuracy = report.average_accuracy(),
        "Cross-validation complete"
    );
    if let Some(dir) = output_dir {
        report.persist(dir)?;
    }
    Ok(report)
}
