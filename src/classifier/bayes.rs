//! Gaussian naive Bayes family

use super::{Classifier, ClassifierCore, ParamGrid, Params};
use crate::error::Result;
use crate::estimators::{GaussianNaiveBayes, ModelHandle};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct GaussianNaiveBayesClassifier {
    core: ClassifierCore,
    var_smoothing: f64,
}

impl GaussianNaiveBayesClassifier {
    pub const NAME: &'static str = "gaussian naive bayes";

    pub fn new(params: Params) -> Result<Self> {
        params.warn_unknown(Self::NAME, &["var_smoothing"]);
        let var_smoothing = params
            .get_f64("var_smoothing")?
            .unwrap_or_else(|| GaussianNaiveBayes::new().var_smoothing());
        Ok(Self {
            core: ClassifierCore::new(Self::NAME, params),
            var_smoothing,
        })
    }
}

impl Classifier for GaussianNaiveBayesClassifier {
    fn core(&self) -> &ClassifierCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClassifierCore {
        &mut self.core
    }

    fn new_handle(&self) -> Result<ModelHandle> {
        Ok(ModelHandle::NaiveBayes(
            GaussianNaiveBayes::new().with_var_smoothing(self.var_smoothing),
        ))
    }

    fn get_param_grid(&self) -> Option<ParamGrid> {
        Some(ParamGrid::from([(
            "var_smoothing".to_string(),
            vec![json!(1e-9), json!(1e-7), json!(1e-5)],
        )]))
    }
}
