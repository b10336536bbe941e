//! Kernel families: support vector classifier and Gaussian process

use super::{Classifier, ClassifierCore, ParamGrid, Params, DEFAULT_RANDOM_STATE};
use crate::error::{Result, TrendlabError};
use crate::estimators::{gaussian_process, GaussianProcessConfig, ModelHandle, SupportVectorMachine, SvmConfig};
use serde_json::json;

/// SVC registered as "svc"
#[derive(Debug, Clone)]
pub struct SupportVectorClassifier {
    core: ClassifierCore,
    config: SvmConfig,
}

impl SupportVectorClassifier {
    pub const NAME: &'static str = "svc";
    const KEYS: &'static [&'static str] = &["kernel", "c", "gamma", "degree", "coef0", "max_iter", "random_state"];

    pub fn new(params: Params) -> Result<Self> {
        params.warn_unknown(Self::NAME, Self::KEYS);
        let mut config = SvmConfig::default()
            .with_random_state(Some(params.get_u64("random_state")?.unwrap_or(DEFAULT_RANDOM_STATE)));
        if let Some(kernel) = params.get_str("kernel")? {
            config = config.with_kernel(kernel);
        }
        if let Some(c) = params.get_f64("c")? {
            if c <= 0.0 {
                return Err(TrendlabError::invalid_parameter("c", c, "must be positive"));
            }
            config = config.with_c(c);
        }
        // "scale"/"auto" keep the 1 / n_features default
        if let Some(gamma) = params.get("gamma").and_then(|v| v.as_f64()) {
            config = config.with_gamma(Some(gamma));
        }
        if let Some(degree) = params.get_u64("degree")? {
            config.degree = degree as u32;
        }
        if let Some(coef0) = params.get_f64("coef0")? {
            config.coef0 = coef0;
        }
        if let Some(max_iter) = params.get_usize("max_iter")? {
            config = config.with_max_iter(max_iter);
        }
        Ok(Self {
            core: ClassifierCore::new(Self::NAME, params),
            config,
        })
    }

    pub fn config(&self) -> &SvmConfig {
        &self.config
    }
}

impl Classifier for SupportVectorClassifier {
    fn core(&self) -> &ClassifierCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClassifierCore {
        &mut self.core
    }

    fn new_handle(&self) -> Result<ModelHandle> {
        Ok(ModelHandle::Svm(SupportVectorMachine::new(self.config.clone())))
    }

    fn get_param_grid(&self) -> Option<ParamGrid> {
        Some(ParamGrid::from([
            ("kernel".to_string(), vec![json!("linear"), json!("rbf")]),
            ("c".to_string(), vec![json!(0.1), json!(1.0), json!(10.0)]),
        ]))
    }
}

/// Gaussian process classifier with an RBF kernel
#[derive(Debug, Clone)]
pub struct GaussianProcessClassifier {
    core: ClassifierCore,
    config: GaussianProcessConfig,
}

impl GaussianProcessClassifier {
    pub const NAME: &'static str = "gaussian process";
    const KEYS: &'static [&'static str] = &["length_scale", "signal_variance", "noise_variance", "max_training_size"];

    pub fn new(params: Params) -> Result<Self> {
        params.warn_unknown(Self::NAME, Self::KEYS);
        let mut config = GaussianProcessConfig::default();
        if let Some(v) = params.get_f64("length_scale")? {
            config = config.with_length_scale(v);
        }
        if let Some(v) = params.get_f64("signal_variance")? {
            config.signal_variance = v;
        }
        if let Some(v) = params.get_f64("noise_variance")? {
            config = config.with_noise_variance(v);
        }
        if let Some(v) = params.get_usize("max_training_size")? {
            config = config.with_max_training_size(v);
        }
        Ok(Self {
            core: ClassifierCore::new(Self::NAME, params),
            config,
        })
    }

    pub fn config(&self) -> &GaussianProcessConfig {
        &self.config
    }
}

impl Classifier for GaussianProcessClassifier {
    fn core(&self) -> &ClassifierCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClassifierCore {
        &mut self.core
    }

    fn new_handle(&self) -> Result<ModelHandle> {
        Ok(ModelHandle::GaussianProcess(
            gaussian_process::GaussianProcessClassifier::new(self.config.clone()),
        ))
    }

    fn get_param_grid(&self) -> Option<ParamGrid> {
        Some(ParamGrid::from([
            ("length_scale".to_string(), vec![json!(0.5), json!(1.0), json!(2.0)]),
            ("noise_variance".to_string(), vec![json!(0.01), json!(0.1)]),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_svc_params() {
        let params = Params::new().with("kernel", "linear").with("c", 0.5).with("gamma", "scale");
        let clf = SupportVectorClassifier::new(params).unwrap();
        assert_eq!(clf.config().kernel, "linear");
        assert_eq!(clf.config().c, 0.5);
        assert_eq!(clf.config().gamma, None);
        assert!(SupportVectorClassifier::new(Params::new().with("c", -1.0)).is_err());
    }

    #[test]
    fn test_gaussian_process_params() {
        let clf = GaussianProcessClassifier::new(Params::new().with("length_scale", 2.0)).unwrap();
        assert_eq!(clf.config().length_scale, 2.0);
        assert!(matches!(clf.new_handle().unwrap(), ModelHandle::GaussianProcess(_)));
    }
}
