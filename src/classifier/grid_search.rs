//! Exhaustive hyperparameter search around one registry family

use super::{expand_grid, fit_handle, get_classifier, Classifier, ClassifierCore, ParamGrid, Params, DEFAULT_RANDOM_STATE};
use crate::analysis::classification_analysis;
use crate::error::{Result, TrendlabError};
use crate::estimators::ModelHandle;
use crate::splitter::{FoldStrategy, OwnedModelInput, Split};
use ndarray::{Array1, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Metric maximized by the search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    Accuracy,
    #[default]
    RocAuc,
}

impl Scoring {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "accuracy" => Ok(Scoring::Accuracy),
            "roc_auc" => Ok(Scoring::RocAuc),
            other => Err(TrendlabError::invalid_parameter("scoring", other, "expected accuracy or roc_auc")),
        }
    }
}

/// One inner fold of the training subset
struct InnerFold {
    train: OwnedModelInput,
    y_train: Array1<f64>,
    test: OwnedModelInput,
    y_test: Array1<f64>,
}

/// Picks the wrapped family's best parameters by blocked cross-validation
/// inside the training subset, then refits them on the whole subset
#[derive(Debug, Clone)]
pub struct GridSearchClassifier {
    core: ClassifierCore,
    model: String,
    model_params: Params,
    grid: ParamGrid,
    scoring: Scoring,
    nb_splits: usize,
    max_candidates: Option<usize>,
    random_state: u64,
    best_params: Option<Params>,
    best_score: Option<f64>,
    cv_results: Vec<(Params, f64)>,
}

impl GridSearchClassifier {
    pub const NAME: &'static str = "grid search";
    const KEYS: &'static [&'static str] = &[
        "model",
        "model_params",
        "scoring",
        "nb_splits",
        "param_grid",
        "max_candidates",
        "random_state",
    ];
    const DEFAULT_MODEL: &'static str = "decision tree";
    const DEFAULT_NB_SPLITS: usize = 3;

    pub fn new(params: Params) -> Result<Self> {
        params.warn_unknown(Self::NAME, Self::KEYS);
        let model = params
            .get_str("model")?
            .unwrap_or(Self::DEFAULT_MODEL)
            .trim()
            .to_lowercase();
        if model == Self::NAME || model == super::MetaClassifierVoting::NAME {
            return Err(TrendlabError::invalid_parameter("model", &model, "cannot search over a meta-classifier"));
        }
        let model_params = match params.get("model_params") {
            Some(value) => Params::from_value(value.clone())?,
            None => Params::new(),
        };
        let scoring = match params.get_str("scoring")? {
            Some(name) => Scoring::parse(name)?,
            None => Scoring::default(),
        };
        let nb_splits = params.get_usize("nb_splits")?.unwrap_or(Self::DEFAULT_NB_SPLITS);
        if nb_splits < 2 {
            return Err(TrendlabError::invalid_parameter("nb_splits", nb_splits, "must be at least 2"));
        }
        let max_candidates = params.get_usize("max_candidates")?;
        if max_candidates == Some(0) {
            return Err(TrendlabError::invalid_parameter("max_candidates", 0, "must be at least 1"));
        }
        let random_state = params.get_u64("random_state")?.unwrap_or(DEFAULT_RANDOM_STATE);

        let wrapped = get_classifier(&model, Some(&model_params), None)?;
        let grid = match params.get("param_grid") {
            Some(value) => parse_grid(value)?,
            None => wrapped.get_param_grid().ok_or_else(|| {
                TrendlabError::invalid_parameter("model", &model, "has no parameter grid; pass param_grid")
            })?,
        };

        Ok(Self {
            core: ClassifierCore::new(Self::NAME, params),
            model,
            model_params,
            grid,
            scoring,
            nb_splits,
            max_candidates,
            random_state,
            best_params: None,
            best_score: None,
            cv_results: Vec::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn scoring(&self) -> Scoring {
        self.scoring
    }

    /// Winning parameters of the last fit
    pub fn best_params(&self) -> Option<&Params> {
        self.best_params.as_ref()
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    /// Mean inner score per candidate, in evaluation order
    pub fn cv_results(&self) -> &[(Params, f64)] {
        &self.cv_results
    }

    /// Candidate parameter sets; a seeded sample when `max_candidates` caps
    /// the grid
    pub fn candidates(&self) -> Vec<Params> {
        let mut candidates = expand_grid(&self.grid);
        if let Some(max) = self.max_candidates.filter(|max| *max < candidates.len()) {
            let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
            candidates.shuffle(&mut rng);
            candidates.truncate(max);
        }
        candidates
    }

    fn inner_folds(&self, split: &Split) -> Result<Vec<InnerFold>> {
        let input = split.train_input();
        if input.len() < 2 * self.nb_splits {
            return Err(TrendlabError::InsufficientData(format!(
                "{} training rows cannot form {} inner folds",
                input.len(),
                self.nb_splits
            )));
        }
        let y = split.y_train();
        let folds = FoldStrategy::Blocked
            .folds(input.len(), self.nb_splits)?
            .into_iter()
            .map(|fold| InnerFold {
                train: input.select(&fold.train),
                y_train: y.select(Axis(0), &fold.train),
                test: input.select(&fold.test),
                y_test: y.select(Axis(0), &fold.test),
            })
            .collect();
        Ok(folds)
    }

    fn score(&self, params: &Params, fold: &InnerFold) -> Result<f64> {
        let mut handle = get_classifier(&self.model, Some(params), None)?.new_handle()?;
        handle.fit(fold.train.view(), fold.y_train.view())?;
        let probabilities = handle.predict_proba(fold.test.view())?;
        let labels = handle.predict(fold.test.view())?;
        let report = classification_analysis(fold.y_test.view(), labels.view(), Some(probabilities.view()))?;
        match self.scoring {
            Scoring::Accuracy => report.metric("accuracy"),
            // a single-class fold ranks nothing
            Scoring::RocAuc => Ok(report.get("roc_auc").unwrap_or(0.5)),
        }
    }
}

fn parse_grid(value: &Value) -> Result<ParamGrid> {
    let Value::Object(map) = value else {
        return Err(TrendlabError::ConfigError(format!("param_grid must be a JSON object, got {}", value)));
    };
    map.iter()
        .map(|(key, values)| {
            let values = match values {
                Value::Array(items) if items.is_empty() => {
                    return Err(TrendlabError::invalid_parameter(key.as_str(), values, "needs at least one candidate"))
                }
                Value::Array(items) => items.clone(),
                single => vec![single.clone()],
            };
            Ok((key.clone(), values))
        })
        .collect()
}

impl Classifier for GridSearchClassifier {
    fn core(&self) -> &ClassifierCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClassifierCore {
        &mut self.core
    }

    /// Wrapped family configured with the best parameters found so far
    fn new_handle(&self) -> Result<ModelHandle> {
        let params = match &self.best_params {
            Some(best) => self.model_params.merged(best),
            None => self.model_params.clone(),
        };
        get_classifier(&self.model, Some(&params), None)?.new_handle()
    }

    fn fit(&mut self, split: &Split) -> Result<()> {
        let folds = self.inner_folds(split)?;
        let candidates = self.candidates();
        info!(
            classifier = Self::NAME,
            model = self.model.as_str(),
            candidates = candidates.len(),
            folds = folds.len(),
            "Starting grid search"
        );

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let params = self.model_params.merged(&candidate);
            let scores = folds
                .iter()
                .map(|fold| self.score(&params, fold))
                .collect::<Result<Vec<f64>>>()?;
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            debug!(model = self.model.as_str(), params = %candidate.to_value(), score = mean, "Candidate scored");
            results.push((candidate, mean));
        }

        // first candidate wins ties
        let (best, score) = results
            .iter()
            .fold(None::<&(Params, f64)>, |best, current| match best {
                Some(b) if b.1 >= current.1 => Some(b),
                _ => Some(current),
            })
            .map(|(p, s)| (p.clone(), *s))
            .ok_or_else(|| TrendlabError::InvalidInput("parameter grid is empty".to_string()))?;
        info!(
            model = self.model.as_str(),
            best_params = %best.to_value(),
            best_score = score,
            "Grid search complete"
        );

        self.best_params = Some(best);
        self.best_score = Some(score);
        self.cv_results = results;
        self.build()?;
        fit_handle(self, split)
    }

    fn get_param_grid(&self) -> Option<ParamGrid> {
        Some(self.grid.clone())
    }

    fn save(&self, _path: &Path) -> Result<()> {
        Err(TrendlabError::NotImplemented("saving a grid search".to_string()))
    }

    fn load(&mut self, _path: &Path) -> Result<()> {
        Err(TrendlabError::NotImplemented("loading a grid search".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureTable;
    use crate::splitter::DataSplitter;
    use serde_json::json;

    fn split() -> Split {
        let x: Vec<f64> = (0..60).map(|i| ((i * 7) % 10) as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| if *v >= 5.0 { 1.0 } else { 0.0 }).collect();
        let table = FeatureTable::from_columns(vec![("x", x), ("target", y)]).unwrap();
        DataSplitter::new(table, "target").unwrap().split_simple(0.7).unwrap()
    }

    #[test]
    fn test_search_over_explicit_grid() {
        let params = Params::new()
            .with("param_grid", json!({"max_depth": [1, 3], "min_samples_leaf": [1, 2]}))
            .with("scoring", "accuracy");
        let mut search = GridSearchClassifier::new(params).unwrap();
        assert_eq!(search.scoring(), Scoring::Accuracy);
        let split = split();
        search.fit(&split).unwrap();

        assert_eq!(search.cv_results().len(), 4);
        // every candidate separates the classes, so the first one wins
        assert_eq!(search.best_params(), Some(&search.cv_results()[0].0));
        assert_eq!(search.best_score(), Some(1.0));
        assert_eq!(search.evaluate(&split).unwrap().accuracy(), Some(1.0));
    }

    #[test]
    fn test_default_grid_comes_from_the_family() {
        let search = GridSearchClassifier::new(Params::new()).unwrap();
        assert_eq!(search.model(), "decision tree");
        assert_eq!(search.scoring(), Scoring::RocAuc);
        let tree = get_classifier("decision tree", None, None).unwrap();
        assert_eq!(search.get_param_grid(), tree.get_param_grid());
        assert_eq!(search.candidates().len(), 24);
    }

    #[test]
    fn test_max_candidates_sample_is_seeded() {
        let params = Params::new().with("max_candidates", 5).with("random_state", 7);
        let a = GridSearchClassifier::new(params.clone()).unwrap().candidates();
        let b = GridSearchClassifier::new(params).unwrap().candidates();
        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_family_without_grid_needs_explicit_grid() {
        assert!(GridSearchClassifier::new(Params::new().with("model", "same class")).is_err());
        let explicit = Params::new()
            .with("model", "same class")
            .with("param_grid", json!({"class": [0, 1]}));
        assert!(GridSearchClassifier::new(explicit).is_ok());
    }

    #[test]
    fn test_meta_models_rejected() {
        assert!(GridSearchClassifier::new(Params::new().with("model", "voting")).is_err());
        assert!(GridSearchClassifier::new(Params::new().with("model", "grid search")).is_err());
        assert!(GridSearchClassifier::new(Params::new().with("nb_splits", 1)).is_err());
    }

    #[test]
    fn test_persistence_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        let mut search = GridSearchClassifier::new(Params::new()).unwrap();
        search.fit(&split()).unwrap();
        assert!(matches!(search.save(&path), Err(TrendlabError::NotImplemented(_))));
        assert!(!path.exists());
        assert!(matches!(search.load(&path), Err(TrendlabError::NotImplemented(_))));
    }
}
