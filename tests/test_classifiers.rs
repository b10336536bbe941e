//! Integration test: classifier registry and the common contract

mod common;

use serde_json::json;
use trendlab::classifier::{get_classifier, list, Params};
use trendlab::error::TrendlabError;
use trendlab::splitter::DataSplitter;

#[test]
fn test_separable_trend_is_classified_perfectly() {
    let table = common::trend_table(&common::zigzag_prices(100));
    assert_eq!(table.columns(), &["trend_1d", "target"]);

    let splitter = DataSplitter::new(table, "target").unwrap();
    let split = splitter.split_simple(0.7).unwrap();
    let mut model = get_classifier("decision tree", None, Some(&split)).unwrap();
    model.fit_bound().unwrap();

    let report = model.get_analysis().unwrap();
    assert_eq!(report.precision(), Some(1.0));
    assert_eq!(report.recall(), Some(1.0));
    assert_eq!(report.f1_score(), Some(1.0));
    assert_eq!(report.accuracy(), Some(1.0));
}

#[test]
fn test_every_family_fits_and_evaluates() {
    let splitter = DataSplitter::new(common::noisy_table(120), "target")
        .unwrap()
        .with_seq_len(4)
        .unwrap();
    let split = splitter.split_simple(0.7).unwrap();
    let fast = Params::new().with("epochs", 3).with("hidden_size", 4);

    for name in list() {
        let params = match name {
            "lstm1" | "lstm2" | "lstm3" | "lstmhao2020" | "bilstm" | "cnnbilstm" => fast.clone(),
            "grid search" => Params::new().with("param_grid", json!({"max_depth": [2, 4]})),
            _ => Params::new(),
        };
        let mut model = get_classifier(name, Some(&params), None).unwrap();
        model.fit(&split).unwrap_or_else(|e| panic!("{} failed to fit: {}", name, e));

        let prediction = model.predict(split.test_input()).unwrap();
        assert_eq!(prediction.len(), split.test_indices().len(), "{}", name);
        assert!(prediction.labels().iter().all(|l| *l == 0.0 || *l == 1.0), "{}", name);
        assert!(prediction.probabilities().iter().all(|p| (0.0..=1.0).contains(p)), "{}", name);

        let report = model.evaluate(&split).unwrap();
        for metric in ["precision", "recall", "f1_score", "accuracy"] {
            let value = report.metric(metric).unwrap();
            assert!((0.0..=1.0).contains(&value), "{} {} = {}", name, metric, value);
        }
    }
}

#[test]
fn test_every_family_on_sinusoid_closes() {
    let table = common::sinusoid_table(1000);
    assert_eq!(table.columns(), &["close", "target"]);
    assert_eq!(table.nrows(), 999);

    let split = DataSplitter::new(table, "target").unwrap().split_simple(0.7).unwrap();
    let fast = Params::new().with("epochs", 2).with("hidden_size", 4);

    for name in list() {
        let params = match name {
            "lstm1" | "lstm2" | "lstm3" | "lstmhao2020" | "bilstm" | "cnnbilstm" => fast.clone(),
            "grid search" => Params::new().with("param_grid", json!({"max_depth": [3, 6]})),
            _ => Params::new(),
        };
        let mut model = get_classifier(name, Some(&params), None).unwrap();
        model.fit(&split).unwrap_or_else(|e| panic!("{} failed to fit: {}", name, e));

        let report = model.evaluate(&split).unwrap();
        assert_eq!(model.predict(split.test_input()).unwrap().len(), 300, "{}", name);
        let accuracy = report.accuracy().unwrap();
        assert!((0.0..=1.0).contains(&accuracy), "{} accuracy = {}", name, accuracy);
    }
}

#[test]
fn test_evaluate_is_repeatable() {
    let split = DataSplitter::new(common::noisy_table(150), "target")
        .unwrap()
        .split_simple(0.7)
        .unwrap();
    let mut model = get_classifier("xgboost", None, None).unwrap();
    model.fit(&split).unwrap();
    assert_eq!(model.evaluate(&split).unwrap(), model.evaluate(&split).unwrap());
}

#[test]
fn test_same_class_baseline_recall_and_precision() {
    let split = DataSplitter::new(common::noisy_table(100), "target")
        .unwrap()
        .split_simple(0.6)
        .unwrap();
    let mut model = get_classifier("same class", None, None).unwrap();
    model.fit(&split).unwrap();
    let report = model.evaluate(&split).unwrap();

    let prevalence = split.y_test().mean().unwrap();
    assert_eq!(report.recall(), Some(1.0));
    assert!((report.precision().unwrap() - prevalence).abs() < 1e-12);
}

#[test]
fn test_factory_errors() {
    assert!(matches!(
        get_classifier("random forest", None, None),
        Err(TrendlabError::UnknownClassifier(_))
    ));
    let bad = Params::new().with("criterion", "mse");
    assert!(matches!(
        get_classifier("decision tree", Some(&bad), None),
        Err(TrendlabError::InvalidParameter { .. })
    ));
}

#[test]
fn test_predict_before_fit_fails() {
    let split = DataSplitter::new(common::noisy_table(30), "target")
        .unwrap()
        .split_simple(0.5)
        .unwrap();
    let model = get_classifier("svc", None, None).unwrap();
    assert!(matches!(model.predict(split.test_input()), Err(TrendlabError::NotFitted)));
}

#[test]
fn test_recurrent_history_tracks_epochs() {
    let split = DataSplitter::new(common::noisy_table(80), "target")
        .unwrap()
        .with_seq_len(3)
        .unwrap()
        .split_simple(0.75)
        .unwrap();
    let params = Params::new().with("epochs", 4).with("hidden_size", 3);
    let mut model = get_classifier("bilstm", Some(&params), None).unwrap();
    model.fit(&split).unwrap();

    let history = model.history().unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.loss().iter().all(|l| l.is_finite()));
}

#[test]
fn test_saved_model_predicts_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    let split = DataSplitter::new(common::noisy_table(120), "target")
        .unwrap()
        .split_simple(0.7)
        .unwrap();

    for name in ["decision tree", "xgboost", "gaussian naive bayes", "voting"] {
        let mut model = get_classifier(name, None, None).unwrap();
        model.fit(&split).unwrap();
        model.save(&path).unwrap();

        let mut restored = get_classifier(name, None, None).unwrap();
        restored.load(&path).unwrap();
        assert_eq!(
            model.predict(split.test_input()).unwrap(),
            restored.predict(split.test_input()).unwrap(),
            "{}",
            name
        );
    }

    let mut svc = get_classifier("svc", None, None).unwrap();
    assert!(matches!(svc.save(&path), Err(TrendlabError::NotFitted)));
    // the file still holds the voting ensemble
    assert!(matches!(svc.load(&path), Err(TrendlabError::InvalidInput(_))));
}
