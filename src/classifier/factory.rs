//! Name to classifier lookup over a fixed registry

use super::{
    AlwaysAsPrevious, AlwaysSameClass, Classifier, DecisionTreeClassifier, GaussianNaiveBayesClassifier,
    GaussianProcessClassifier, GradientBoostingClassifier, GridSearchClassifier, MetaClassifierVoting,
    MlpClassifier, Params, RecurrentClassifier, SupportVectorClassifier,
};
use crate::error::{Result, TrendlabError};
use crate::estimators::RecurrentArchitecture;
use crate::splitter::Split;
use tracing::debug;

/// Classifier family behind a registry name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    SameClass,
    AsPrevious,
    DecisionTree,
    Xgboost,
    Svc,
    GaussianNaiveBayes,
    GaussianProcess,
    Mlp,
    Recurrent(RecurrentArchitecture),
    Voting,
    GridSearch,
}

/// Every name accepted by [`get_classifier`]
pub const REGISTRY: &[(&str, ClassifierKind)] = &[
    ("same class", ClassifierKind::SameClass),
    ("as previous", ClassifierKind::AsPrevious),
    ("lstm1", ClassifierKind::Recurrent(RecurrentArchitecture::Lstm1)),
    ("lstm2", ClassifierKind::Recurrent(RecurrentArchitecture::Lstm2)),
    ("lstm3", ClassifierKind::Recurrent(RecurrentArchitecture::Lstm3)),
    ("lstmhao2020", ClassifierKind::Recurrent(RecurrentArchitecture::LstmHao2020)),
    ("bilstm", ClassifierKind::Recurrent(RecurrentArchitecture::BiLstm)),
    ("cnnbilstm", ClassifierKind::Recurrent(RecurrentArchitecture::CnnBiLstm)),
    ("svc", ClassifierKind::Svc),
    ("xgboost", ClassifierKind::Xgboost),
    ("decision tree", ClassifierKind::DecisionTree),
    ("mlp", ClassifierKind::Mlp),
    ("gaussian naive bayes", ClassifierKind::GaussianNaiveBayes),
    ("gaussian process", ClassifierKind::GaussianProcess),
    ("voting", ClassifierKind::Voting),
    ("grid search", ClassifierKind::GridSearch),
];

impl ClassifierKind {
    /// Case-insensitive lookup; surrounding whitespace is ignored
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        REGISTRY.iter().find(|(n, _)| *n == name).map(|(_, kind)| *kind)
    }

    /// Families that consume sequence windows
    pub fn is_recurrent(&self) -> bool {
        matches!(self, ClassifierKind::Recurrent(_))
    }
}

/// Registry names in registration order
pub fn list() -> Vec<&'static str> {
    REGISTRY.iter().map(|(name, _)| *name).collect()
}

/// Construct the classifier registered under `name`. `params` defaults to an
/// empty map; a bound `split` enables `fit_bound` and `get_analysis` without
/// passing the split again.
pub fn get_classifier(name: &str, params: Option<&Params>, split: Option<&Split>) -> Result<Box<dyn Classifier>> {
    let kind = ClassifierKind::from_name(name).ok_or_else(|| TrendlabError::UnknownClassifier(name.to_string()))?;
    let params = params.cloned().unwrap_or_default();
    debug!(classifier = name, params = params.len(), "Creating classifier");

    let mut classifier: Box<dyn Classifier> = match kind {
        ClassifierKind::SameClass => Box::new(AlwaysSameClass::new(params)?),
        ClassifierKind::AsPrevious => Box::new(AlwaysAsPrevious::new(params)?),
        ClassifierKind::DecisionTree => Box::new(DecisionTreeClassifier::new(params)?),
        ClassifierKind::Xgboost => Box::new(GradientBoostingClassifier::new(params)?),
        ClassifierKind::Svc => Box::new(SupportVectorClassifier::new(params)?),
        ClassifierKind::GaussianNaiveBayes => Box::new(GaussianNaiveBayesClassifier::new(params)?),
        ClassifierKind::GaussianProcess => Box::new(GaussianProcessClassifier::new(params)?),
        ClassifierKind::Mlp => Box::new(MlpClassifier::new(params)?),
        ClassifierKind::Recurrent(arch) => Box::new(RecurrentClassifier::new(arch, params)?),
        ClassifierKind::Voting => Box::new(MetaClassifierVoting::from_params(params)?),
        ClassifierKind::GridSearch => Box::new(GridSearchClassifier::new(params)?),
    };
    classifier.core_mut().bind(split);
    Ok(classifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_name() {
        assert!(matches!(
            get_classifier("random forest", None, None),
            Err(TrendlabError::UnknownClassifier(name)) if name == "random forest"
        ));
    }

    #[test]
    fn test_every_registered_name_builds_with_defaults() {
        for name in list() {
            let mut classifier = get_classifier(name, None, None).unwrap();
            assert_eq!(classifier.name(), name);
            classifier.build().unwrap();
            assert!(classifier.model_handle().is_some());
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(ClassifierKind::from_name(" SVC "), Some(ClassifierKind::Svc));
        assert!(ClassifierKind::from_name("lstm2").unwrap().is_recurrent());
        assert_eq!(list().len(), REGISTRY.len());
    }

    #[test]
    fn test_unbound_classifier_cannot_fit_without_split() {
        let mut classifier = get_classifier("decision tree", None, None).unwrap();
        assert!(classifier.fit_bound().is_err());
        assert!(matches!(classifier.get_analysis(), Err(TrendlabError::NotFitted)));
    }
}
