//! Error types for trendlab

use thiserror::Error;

/// Result type alias for trendlab operations
pub type Result<T> = std::result::Result<T, TrendlabError>;

/// Main error type for trendlab
#[derive(Error, Debug)]
pub enum TrendlabError {
    #[error("Invalid train fraction {fraction}: must lie strictly between 0 and 1")]
    InvalidFraction { fraction: f64 },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Unknown classifier: {0}")]
    UnknownClassifier(String),

    #[error("Model not fitted")]
    NotFitted,

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl TrendlabError {
    pub(crate) fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        TrendlabError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for TrendlabError {
    fn from(err: polars::error::PolarsError) -> Self {
        TrendlabError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for TrendlabError {
    fn from(err: serde_json::Error) -> Self {
        TrendlabError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for TrendlabError {
    fn from(err: ndarray::ShapeError) -> Self {
        TrendlabError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrendlabError::InvalidFraction { fraction: 1.5 };
        assert_eq!(
            err.to_string(),
            "Invalid train fraction 1.5: must lie strictly between 0 and 1"
        );

        let err = TrendlabError::UnknownClassifier("random forest".to_string());
        assert_eq!(err.to_string(), "Unknown classifier: random forest");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TrendlabError = io_err.into();
        assert!(matches!(err, TrendlabError::IoError(_)));
    }

    #[test]
    fn test_invalid_parameter_helper() {
        let err = TrendlabError::invalid_parameter("nb_splits", 1, "must be at least 2");
        assert_eq!(err.to_string(), "Invalid parameter: nb_splits = 1, must be at least 2");
    }
}
