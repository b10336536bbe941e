//! Neural families: the feed-forward MLP and the recurrent variants

use super::{Classifier, ClassifierCore, ParamGrid, Params, DEFAULT_RANDOM_STATE};
use crate::error::{Result, TrendlabError};
use crate::estimators::{
    neural_network, Activation, MlpConfig, ModelHandle, RecurrentArchitecture, RecurrentConfig, RecurrentNetwork,
};
use serde_json::json;

/// Multi-layer perceptron over the feature rows
#[derive(Debug, Clone)]
pub struct MlpClassifier {
    core: ClassifierCore,
    config: MlpConfig,
}

impl MlpClassifier {
    pub const NAME: &'static str = "mlp";
    const KEYS: &'static [&'static str] = &[
        "hidden_layer_sizes",
        "activation",
        "learning_rate",
        "epochs",
        "max_iter",
        "batch_size",
        "alpha",
        "random_state",
    ];

    pub fn new(params: Params) -> Result<Self> {
        params.warn_unknown(Self::NAME, Self::KEYS);
        let mut config = MlpConfig::default()
            .with_random_state(Some(params.get_u64("random_state")?.unwrap_or(DEFAULT_RANDOM_STATE)));
        if let Some(sizes) = params.get_usize_list("hidden_layer_sizes")? {
            config = config.with_hidden_layer_sizes(sizes);
        }
        if let Some(name) = params.get_str("activation")? {
            config = config.with_activation(Activation::parse(name)?);
        }
        if let Some(lr) = params.get_f64("learning_rate")? {
            config = config.with_learning_rate(lr);
        }
        if let Some(epochs) = params.get_usize("epochs")?.or(params.get_usize("max_iter")?) {
            config = config.with_max_epochs(epochs);
        }
        if let Some(batch_size) = params.get_usize("batch_size")? {
            config.batch_size = batch_size;
        }
        if let Some(alpha) = params.get_f64("alpha")? {
            config.alpha = alpha;
        }
        Ok(Self {
            core: ClassifierCore::new(Self::NAME, params),
            config,
        })
    }

    pub fn config(&self) -> &MlpConfig {
        &self.config
    }
}

impl Classifier for MlpClassifier {
    fn core(&self) -> &ClassifierCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClassifierCore {
        &mut self.core
    }

    fn new_handle(&self) -> Result<ModelHandle> {
        Ok(ModelHandle::Mlp(neural_network::MlpClassifier::new(self.config.clone())))
    }

    fn get_param_grid(&self) -> Option<ParamGrid> {
        Some(ParamGrid::from([
            ("hidden_layer_sizes".to_string(), vec![json!([16]), json!([64]), json!([32, 16])]),
            ("activation".to_string(), vec![json!("relu"), json!("tanh")]),
            ("alpha".to_string(), vec![json!(1e-4), json!(1e-2)]),
        ]))
    }
}

const RECURRENT_KEYS: &[&str] = &["epochs", "hidden_size", "learning_rate", "batch_size", "seq_len", "random_state"];

/// Network settings shared by the recurrent classifiers and regressors
pub(crate) fn recurrent_config(architecture: RecurrentArchitecture, params: &Params) -> Result<RecurrentConfig> {
    params.warn_unknown(architecture.name(), RECURRENT_KEYS);
    let mut config = RecurrentConfig::new(architecture)
        .with_random_state(Some(params.get_u64("random_state")?.unwrap_or(DEFAULT_RANDOM_STATE)));
    if let Some(epochs) = params.get_usize("epochs")? {
        config = config.with_epochs(epochs);
    }
    if let Some(size) = params.get_usize("hidden_size")? {
        config = config.with_hidden_size(size);
    }
    if let Some(lr) = params.get_f64("learning_rate")? {
        config = config.with_learning_rate(lr);
    }
    if let Some(batch_size) = params.get_usize("batch_size")? {
        config = config.with_batch_size(batch_size);
    }
    if let Some(seq_len) = params.get_usize("seq_len")? {
        if seq_len == 0 {
            return Err(TrendlabError::invalid_parameter("seq_len", seq_len, "must be at least 1"));
        }
        config = config.with_seq_len(Some(seq_len));
    }
    Ok(config)
}

/// LSTM-based classifier over the sequence windows of a split; the registry
/// name selects the architecture
#[derive(Debug, Clone)]
pub struct RecurrentClassifier {
    core: ClassifierCore,
    config: RecurrentConfig,
}

impl RecurrentClassifier {
    pub fn new(architecture: RecurrentArchitecture, params: Params) -> Result<Self> {
        let config = recurrent_config(architecture, &params)?;
        Ok(Self {
            core: ClassifierCore::new(architecture.name(), params),
            config,
        })
    }

    pub fn architecture(&self) -> RecurrentArchitecture {
        self.config.architecture
    }

    pub fn config(&self) -> &RecurrentConfig {
        &self.config
    }
}

impl Classifier for RecurrentClassifier {
    fn core(&self) -> &ClassifierCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClassifierCore {
        &mut self.core
    }

    fn new_handle(&self) -> Result<ModelHandle> {
        Ok(ModelHandle::Recurrent(RecurrentNetwork::new(self.config.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mlp_params() {
        let params = Params::new().with("hidden_layer_sizes", 8).with("max_iter", 50).with("activation", "tanh");
        let clf = MlpClassifier::new(params).unwrap();
        assert_eq!(clf.config().hidden_layer_sizes, vec![8]);
        assert_eq!(clf.config().max_epochs, 50);
        assert_eq!(clf.config().activation, Activation::Tanh);
        assert!(MlpClassifier::new(Params::new().with("activation", "gelu")).is_err());
    }

    #[test]
    fn test_recurrent_params() {
        let clf = RecurrentClassifier::new(RecurrentArchitecture::BiLstm, Params::new().with("epochs", 5)).unwrap();
        assert_eq!(clf.name(), "bilstm");
        assert_eq!(clf.config().epochs, 5);
        assert!(clf.get_param_grid().is_none());
        assert!(RecurrentClassifier::new(RecurrentArchitecture::Lstm1, Params::new().with("seq_len", 0)).is_err());
    }
}
