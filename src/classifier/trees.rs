//! Tree-based families: a single decision tree and boosted trees ("xgboost")

use super::{Classifier, ClassifierCore, ParamGrid, Params, DEFAULT_RANDOM_STATE};
use crate::error::{Result, TrendlabError};
use crate::estimators::{gradient_boosting, Criterion, DecisionTree, DecisionTreeConfig, GradientBoostingConfig, ModelHandle};
use serde_json::{json, Value};

/// CART classifier over the feature rows
#[derive(Debug, Clone)]
pub struct DecisionTreeClassifier {
    core: ClassifierCore,
    config: DecisionTreeConfig,
}

impl DecisionTreeClassifier {
    pub const NAME: &'static str = "decision tree";
    const KEYS: &'static [&'static str] =
        &["max_depth", "min_samples_split", "min_samples_leaf", "criterion", "random_state"];

    pub fn new(params: Params) -> Result<Self> {
        params.warn_unknown(Self::NAME, Self::KEYS);
        let mut config = DecisionTreeConfig::default()
            .with_random_state(Some(params.get_u64("random_state")?.unwrap_or(DEFAULT_RANDOM_STATE)));
        if params.contains("max_depth") {
            config.max_depth = params.get_usize("max_depth")?;
        }
        if let Some(n) = params.get_usize("min_samples_split")? {
            config.min_samples_split = n;
        }
        if let Some(n) = params.get_usize("min_samples_leaf")? {
            config.min_samples_leaf = n;
        }
        if let Some(name) = params.get_str("criterion")? {
            config.criterion = match Criterion::parse(name)? {
                Criterion::Mse => {
                    return Err(TrendlabError::invalid_parameter("criterion", name, "expected gini or entropy"))
                }
                c => c,
            };
        }
        Ok(Self {
            core: ClassifierCore::new(Self::NAME, params),
            config,
        })
    }

    pub fn config(&self) -> &DecisionTreeConfig {
        &self.config
    }
}

impl Classifier for DecisionTreeClassifier {
    fn core(&self) -> &ClassifierCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClassifierCore {
        &mut self.core
    }

    fn new_handle(&self) -> Result<ModelHandle> {
        Ok(ModelHandle::DecisionTree(DecisionTree::new(self.config.clone())))
    }

    fn get_param_grid(&self) -> Option<ParamGrid> {
        Some(ParamGrid::from([
            ("max_depth".to_string(), vec![Value::Null, json!(3), json!(5), json!(10)]),
            ("min_samples_leaf".to_string(), vec![json!(1), json!(5), json!(10)]),
            ("criterion".to_string(), vec![json!("gini"), json!("entropy")]),
        ]))
    }
}

/// Gradient boosted trees on log loss, registered as "xgboost"
#[derive(Debug, Clone)]
pub struct GradientBoostingClassifier {
    core: ClassifierCore,
    config: GradientBoostingConfig,
}

impl GradientBoostingClassifier {
    pub const NAME: &'static str = "xgboost";
    const KEYS: &'static [&'static str] = &[
        "n_estimators",
        "learning_rate",
        "max_depth",
        "subsample",
        "colsample_bytree",
        "random_state",
    ];

    pub fn new(params: Params) -> Result<Self> {
        params.warn_unknown(Self::NAME, Self::KEYS);
        let mut config = GradientBoostingConfig::default()
            .with_random_state(Some(params.get_u64("random_state")?.unwrap_or(DEFAULT_RANDOM_STATE)));
        if let Some(n) = params.get_usize("n_estimators")? {
            config = config.with_n_estimators(n);
        }
        if let Some(lr) = params.get_f64("learning_rate")? {
            config = config.with_learning_rate(lr);
        }
        if let Some(depth) = params.get_usize("max_depth")? {
            config = config.with_max_depth(depth);
        }
        if let Some(ratio) = params.get_f64("subsample")? {
            config = config.with_subsample(ratio);
        }
        if let Some(ratio) = params.get_f64("colsample_bytree")? {
            config = config.with_colsample_bytree(ratio);
        }
        Ok(Self {
            core: ClassifierCore::new(Self::NAME, params),
            config,
        })
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }
}

impl Classifier for GradientBoostingClassifier {
    fn core(&self) -> &ClassifierCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClassifierCore {
        &mut self.core
    }

    fn new_handle(&self) -> Result<ModelHandle> {
        Ok(ModelHandle::GradientBoosting(
            gradient_boosting::GradientBoostingClassifier::new(self.config.clone()),
        ))
    }

    fn get_param_grid(&self) -> Option<ParamGrid> {
        Some(ParamGrid::from([
            ("n_estimators".to_string(), vec![json!(50), json!(100), json!(200)]),
            ("max_depth".to_string(), vec![json!(2), json!(3), json!(5)]),
            ("learning_rate".to_string(), vec![json!(0.05), json!(0.1), json!(0.3)]),
        ]))
    }
}
