//! Voting meta-classifier over other registry families

use super::{cross_validate, fit_handle, get_classifier, Classifier, ClassifierCore, Params};
use crate::analysis::CrossValidationReport;
use crate::error::{Result, TrendlabError};
use crate::estimators::{ModelHandle, VotingEnsemble, VotingStrategy};
use crate::splitter::{DataSplitter, Split};
use std::path::Path;
use tracing::{info, warn};

const DEFAULT_ESTIMATORS: &[&str] = &["decision tree", "gaussian naive bayes", "xgboost"];

/// Combines member handles by soft or hard voting
#[derive(Debug, Clone)]
pub struct MetaClassifierVoting {
    core: ClassifierCore,
    members: Vec<(String, ModelHandle)>,
    strategy: VotingStrategy,
    weights: Option<Vec<f64>>,
    prefit: bool,
}

impl MetaClassifierVoting {
    pub const NAME: &'static str = "voting";
    const KEYS: &'static [&'static str] = &["voting", "weights", "prefit", "estimators", "estimator_params"];

    /// Vote over the given members. With `prefit = true` the members are
    /// taken as already fitted and `fit` only records the split.
    pub fn new(estimators: Vec<(String, ModelHandle)>, params: Params) -> Result<Self> {
        params.warn_unknown(Self::NAME, Self::KEYS);
        if estimators.is_empty() {
            return Err(TrendlabError::InvalidInput("voting needs at least one estimator".to_string()));
        }
        let strategy = match params.get_str("voting")? {
            Some(name) => VotingStrategy::parse(name)?,
            None => VotingStrategy::default(),
        };
        let weights = params.get_f64_list("weights")?;
        let prefit = params.get_bool("prefit")?.unwrap_or(false);

        let voting = Self {
            core: ClassifierCore::new(Self::NAME, params),
            members: estimators,
            strategy,
            weights,
            prefit,
        };
        // surface bad weights at construction rather than at the first fit
        voting.new_handle()?;
        Ok(voting)
    }

    /// Members named by the `estimators` list, each configured from the
    /// matching entry of the optional `estimator_params` object
    pub fn from_params(params: Params) -> Result<Self> {
        let names = params
            .get_str_list("estimators")?
            .unwrap_or_else(|| DEFAULT_ESTIMATORS.iter().map(|s| s.to_string()).collect());
        let member_params = match params.get("estimator_params") {
            Some(value) => Params::from_value(value.clone())?,
            None => Params::new(),
        };

        let mut members = Vec::with_capacity(names.len());
        for name in names {
            let key = name.trim().to_lowercase();
            if key == Self::NAME || key == super::GridSearchClassifier::NAME {
                return Err(TrendlabError::invalid_parameter("estimators", &name, "cannot nest meta-classifiers"));
            }
            let own = match member_params.get(&key) {
                Some(value) => Params::from_value(value.clone())?,
                None => Params::new(),
            };
            let member = get_classifier(&key, Some(&own), None)?;
            members.push((key, member.new_handle()?));
        }
        Self::new(members, params)
    }

    pub fn strategy(&self) -> VotingStrategy {
        self.strategy
    }

    pub fn is_prefit(&self) -> bool {
        self.prefit
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl Classifier for MetaClassifierVoting {
    fn core(&self) -> &ClassifierCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClassifierCore {
        &mut self.core
    }

    fn new_handle(&self) -> Result<ModelHandle> {
        let ensemble = VotingEnsemble::new(self.members.clone(), self.strategy)?;
        let ensemble = match &self.weights {
            Some(weights) => ensemble.with_weights(weights)?,
            None => ensemble,
        };
        Ok(ModelHandle::Voting(ensemble))
    }

    fn fit(&mut self, split: &Split) -> Result<()> {
        if !self.prefit {
            return fit_handle(self, split);
        }
        if self.core.handle.is_none() {
            self.build()?;
        }
        info!(
            classifier = Self::NAME,
            members = self.members.len(),
            "Reusing prefit members"
        );
        self.core.fitted = true;
        self.core.split = Some(split.clone());
        Ok(())
    }

    fn evaluate_cross_validation_in(
        &mut self,
        splitter: &DataSplitter,
        target: &str,
        output_dir: Option<&Path>,
    ) -> Result<CrossValidationReport> {
        if !self.prefit {
            return cross_validate(self, splitter, target, output_dir);
        }
        // prefit members have seen rows of every fold
        warn!(classifier = Self::NAME, "Refitting prefit members for cross-validation");
        self.prefit = false;
        let report = cross_validate(self, splitter, target, output_dir);
        self.prefit = true;
        report
    }
}

/// Copy the handles of already built (usually fitted) classifiers for use as
/// voting members. A classifier that was never built contributes a fresh
/// unfitted handle.
pub fn prepare_models_for_meta_classifier_voting(
    models: &[(&str, &dyn Classifier)],
) -> Result<Vec<(String, ModelHandle)>> {
    models
        .iter()
        .map(|(name, classifier)| {
            let handle = match classifier.model_handle() {
                Some(handle) => handle.clone(),
                None => classifier.new_handle()?,
            };
            Ok((name.to_string(), handle))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureTable;
    use serde_json::json;

    fn split() -> Split {
        let x: Vec<f64> = (0..60).map(|i| ((i * 7) % 10) as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| if *v >= 5.0 { 1.0 } else { 0.0 }).collect();
        let table = FeatureTable::from_columns(vec![("x", x), ("target", y)]).unwrap();
        DataSplitter::new(table, "target").unwrap().split_simple(0.7).unwrap()
    }

    #[test]
    fn test_default_members_vote() {
        let split = split();
        let mut voting = MetaClassifierVoting::from_params(Params::new()).unwrap();
        assert_eq!(voting.member_names(), DEFAULT_ESTIMATORS.to_vec());
        voting.fit(&split).unwrap();

        let report = voting.evaluate(&split).unwrap();
        assert!(report.accuracy().unwrap() >= 0.9);
    }

    #[test]
    fn test_hard_voting_with_weights() {
        let params = Params::new()
            .with("estimators", json!(["same class", "decision tree"]))
            .with("voting", "hard")
            .with("weights", json!([1.0, 3.0]));
        let split = split();
        let mut voting = MetaClassifierVoting::from_params(params).unwrap();
        assert_eq!(voting.strategy(), VotingStrategy::Hard);
        voting.fit(&split).unwrap();

        // the tree outweighs the constant member
        let report = voting.evaluate(&split).unwrap();
        assert_eq!(report.accuracy(), Some(1.0));
    }

    #[test]
    fn test_bad_weights_rejected() {
        let params = Params::new()
            .with("estimators", json!(["same class", "decision tree"]))
            .with("weights", json!([1.0]));
        assert!(MetaClassifierVoting::from_params(params).is_err());
    }

    #[test]
    fn test_nested_meta_rejected() {
        let params = Params::new().with("estimators", json!(["decision tree", "voting"]));
        assert!(MetaClassifierVoting::from_params(params).is_err());
    }

    #[test]
    fn test_prefit_members_reused() {
        let split = split();
        let mut tree = get_classifier("decision tree", None, None).unwrap();
        tree.fit(&split).unwrap();
        let mut bayes = get_classifier("gaussian naive bayes", None, None).unwrap();
        bayes.fit(&split).unwrap();

        let members = prepare_models_for_meta_classifier_voting(&[("tree", &*tree), ("bayes", &*bayes)]).unwrap();
        let mut voting = MetaClassifierVoting::new(members, Params::new().with("prefit", true)).unwrap();
        assert!(voting.is_prefit());
        voting.fit(&split).unwrap();

        let report = voting.get_analysis().unwrap();
        assert!(report.accuracy().unwrap() >= 0.9);
    }

    #[test]
    fn test_unbuilt_member_contributes_fresh_handle() {
        let tree = get_classifier("decision tree", None, None).unwrap();
        let members = prepare_models_for_meta_classifier_voting(&[("tree", &*tree)]).unwrap();
        assert_eq!(members[0].0, "tree");
        assert_eq!(members[0].1.kind(), "decision tree");
    }
}
