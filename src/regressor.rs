//! Recurrent regressors of trend values
//!
//! A [`TrendValueRegressor`] trains one of the recurrent architectures with a
//! linear output on a continuous target such as `next_close` or
//! `next_pct_change`, and reports `mape`, `rmse` and `mse` through
//! [`regression_analysis`].

use crate::analysis::{regression_analysis, AnalysisReport};
use crate::classifier::{recurrent_config, Params};
use crate::data::FeatureTable;
use crate::error::{Result, TrendlabError};
use crate::estimators::{RecurrentArchitecture, RecurrentNetwork, RecurrentObjective, TrainingHistory};
use crate::splitter::{ModelInput, Split};
use ndarray::Array1;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// Architecture used when none is named
pub const DEFAULT_REGRESSOR: &str = "lstmhao2020";

/// Recurrent network predicting a continuous value per sequence window
#[derive(Debug, Clone)]
pub struct TrendValueRegressor {
    name: String,
    params: Params,
    network: RecurrentNetwork,
    fitted: bool,
    split: Option<Split>,
}

impl TrendValueRegressor {
    /// `name` is a recurrent registry name (`lstm1`, `lstmhao2020`, ...);
    /// params are those of the recurrent classifiers
    pub fn new(name: &str, params: Params) -> Result<Self> {
        let architecture =
            RecurrentArchitecture::from_name(name).ok_or_else(|| TrendlabError::UnknownClassifier(name.to_string()))?;
        let config = recurrent_config(architecture, &params)?.with_objective(RecurrentObjective::Regression);
        Ok(Self {
            name: architecture.name().to_string(),
            params,
            network: RecurrentNetwork::new(config),
            fitted: false,
            split: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn network(&self) -> &RecurrentNetwork {
        &self.network
    }

    /// Train on the windows and targets of the split's training subset
    pub fn fit(&mut self, split: &Split) -> Result<()> {
        info!(
            regressor = self.name.as_str(),
            target = split.target(),
            rows = split.train_indices().len(),
            "Fitting regressor"
        );
        let mut network = RecurrentNetwork::new(self.network.config().clone());
        network.fit(split.train_input().require_windows()?, split.y_train().view())?;
        self.network = network;
        self.fitted = true;
        self.split = Some(split.clone());
        Ok(())
    }

    pub fn predict(&self, input: ModelInput<'_>) -> Result<Array1<f64>> {
        if !self.fitted {
            return Err(TrendlabError::NotFitted);
        }
        self.network.predict_values(input.require_windows()?)
    }

    /// Regression metrics on the split's test subset
    pub fn evaluate(&self, split: &Split) -> Result<AnalysisReport> {
        let predicted = self.predict(split.test_input())?;
        regression_analysis(split.y_test().view(), predicted.view())
    }

    /// Evaluate on the split last fitted on
    pub fn get_analysis(&self) -> Result<AnalysisReport> {
        match (&self.split, self.fitted) {
            (Some(split), true) => self.evaluate(split),
            _ => Err(TrendlabError::NotFitted),
        }
    }

    pub fn history(&self) -> Option<&TrainingHistory> {
        self.fitted.then(|| self.network.history())
    }

    /// Write `index`, `actual` and `predicted` for every test row as CSV
    pub fn export_predictions(&self, split: &Split, path: impl AsRef<Path>) -> Result<()> {
        let predicted = self.predict(split.test_input())?;
        let index: Vec<f64> = split.test_indices().iter().map(|&i| i as f64).collect();
        let table = FeatureTable::from_columns(vec![
            ("index", index),
            ("actual", split.y_test().to_vec()),
            ("predicted", predicted.to_vec()),
        ])?;
        table.write_csv(path.as_ref())?;
        info!(regressor = self.name.as_str(), path = %path.as_ref().display(), "Exported predictions");
        Ok(())
    }

    /// Write the fitted network as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if !self.fitted {
            return Err(TrendlabError::NotFitted);
        }
        serde_json::to_writer(BufWriter::new(File::create(path)?), &self.network)?;
        info!(regressor = self.name.as_str(), path = %path.display(), "Saved model");
        Ok(())
    }

    /// Restore a network written by [`TrendValueRegressor::save`] for the
    /// same architecture
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let network: RecurrentNetwork = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        if network.objective() != RecurrentObjective::Regression || network.architecture().name() != self.name {
            return Err(TrendlabError::InvalidInput(format!(
                "{} holds a {} {:?} network, expected a {} regressor",
                path.display(),
                network.architecture().name(),
                network.objective(),
                self.name
            )));
        }
        self.network = network;
        self.fitted = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::indicators::{add_technical_indicators, remove_features};
    use crate::data::synthetic::{create_dataframe, get_sinusoid};
    use crate::splitter::DataSplitter;

    fn next_close_split() -> Split {
        let close = get_sinusoid(240, 1.0, 0.05, 0.0, 10.0);
        let table = create_dataframe(&close, 0.0, None).unwrap();
        let table = add_technical_indicators(table, &["next_close"]).unwrap();
        let mut table = remove_features(table, &["open", "high", "low", "adj_close", "volume"]).unwrap();
        table.drop_missing();
        DataSplitter::new(table, "next_close")
            .unwrap()
            .with_seq_len(5)
            .unwrap()
            .split_simple(0.7)
            .unwrap()
    }

    fn quick_params() -> Params {
        Params::new().with("epochs", 25).with("hidden_size", 8)
    }

    #[test]
    fn test_regressor_reports_errors() {
        let split = next_close_split();
        let mut regressor = TrendValueRegressor::new("lstm1", quick_params()).unwrap();
        assert!(matches!(regressor.get_analysis(), Err(TrendlabError::NotFitted)));

        regressor.fit(&split).unwrap();
        let report = regressor.get_analysis().unwrap();
        let rmse = report.get("rmse").unwrap();
        // closes stay within 9..11
        assert!(rmse.is_finite() && rmse < 2.0, "rmse {}", rmse);
        assert!(report.get("mape").is_some());
        assert!(report.accuracy().is_none());
        assert_eq!(regressor.history().unwrap().len(), 25);
    }

    #[test]
    fn test_unknown_architecture() {
        assert!(matches!(
            TrendValueRegressor::new("decision tree", Params::new()),
            Err(TrendlabError::UnknownClassifier(_))
        ));
        assert_eq!(TrendValueRegressor::new(DEFAULT_REGRESSOR, Params::new()).unwrap().name(), "lstmhao2020");
    }

    #[test]
    fn test_export_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let split = next_close_split();
        let mut regressor = TrendValueRegressor::new("lstm1", Params::new().with("epochs", 3).with("hidden_size", 4)).unwrap();
        let model_path = dir.path().join("regressor.json");
        assert!(matches!(regressor.save(&model_path), Err(TrendlabError::NotFitted)));
        regressor.fit(&split).unwrap();

        let csv = dir.path().join("predictions.csv");
        regressor.export_predictions(&split, &csv).unwrap();
        let exported = FeatureTable::read_csv(&csv).unwrap();
        assert_eq!(exported.columns(), &["index", "actual", "predicted"]);
        assert_eq!(exported.nrows(), split.test_indices().len());
        let actual = exported.column("actual").unwrap();
        assert!(actual.iter().zip(split.y_test()).all(|(a, b)| (a - b).abs() < 1e-9));

        regressor.save(&model_path).unwrap();
        let mut restored = TrendValueRegressor::new("lstm1", Params::new()).unwrap();
        restored.load(&model_path).unwrap();
        assert_eq!(
            restored.predict(split.test_input()).unwrap(),
            regressor.predict(split.test_input()).unwrap()
        );

        let mut other = TrendValueRegressor::new("bilstm", Params::new()).unwrap();
        assert!(matches!(other.load(&model_path), Err(TrendlabError::InvalidInput(_))));
    }
}
