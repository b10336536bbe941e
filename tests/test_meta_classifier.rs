//! Integration test: voting over registry families

mod common;

use serde_json::json;
use trendlab::classifier::{
    get_classifier, prepare_models_for_meta_classifier_voting, Classifier, MetaClassifierVoting, Params,
};
use trendlab::splitter::DataSplitter;

fn splitter() -> DataSplitter {
    DataSplitter::new(common::noisy_table(200), "target").unwrap()
}

#[test]
fn test_voting_from_registry() {
    let params = Params::new()
        .with("estimators", json!(["decision tree", "gaussian naive bayes", "svc"]))
        .with("voting", "soft");
    let split = splitter().split_simple(0.7).unwrap();
    let mut voting = get_classifier("voting", Some(&params), None).unwrap();
    voting.fit(&split).unwrap();

    let report = voting.evaluate(&split).unwrap();
    let accuracy = report.accuracy().unwrap();
    assert!(accuracy > 0.6 && accuracy <= 1.0, "accuracy {}", accuracy);
}

#[test]
fn test_voting_with_prefit_members() {
    let split = splitter().split_simple(0.7).unwrap();
    let mut tree = get_classifier("decision tree", None, None).unwrap();
    tree.fit(&split).unwrap();
    let mut boosted = get_classifier("xgboost", None, None).unwrap();
    boosted.fit(&split).unwrap();
    let mut bayes = get_classifier("gaussian naive bayes", None, None).unwrap();
    bayes.fit(&split).unwrap();

    let members = prepare_models_for_meta_classifier_voting(&[
        ("decision tree", &*tree),
        ("xgboost", &*boosted),
        ("gaussian naive bayes", &*bayes),
    ])
    .unwrap();
    let params = Params::new().with("voting", "hard").with("prefit", true);
    let mut voting = MetaClassifierVoting::new(members, params).unwrap();
    voting.fit(&split).unwrap();

    let accuracy = voting.get_analysis().unwrap().accuracy().unwrap();
    assert!(accuracy > 0.6, "accuracy {}", accuracy);
}

#[test]
fn test_voting_cross_validation_refits_members() {
    let params = Params::new().with("estimators", json!(["decision tree", "gaussian naive bayes"]));
    let mut first = get_classifier("voting", Some(&params), None).unwrap();
    let mut second = get_classifier("voting", Some(&params), None).unwrap();
    let a = first.evaluate_cross_validation(&splitter(), "target", false).unwrap();
    let b = second.evaluate_cross_validation(&splitter(), "target", false).unwrap();

    assert_eq!(a.nb_splits(), 5);
    assert_eq!(a.accuracies(), b.accuracies());
    assert!(a.average_accuracy() > 0.5);
}
