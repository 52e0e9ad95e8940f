//! Error types for configuration and naming.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building or loading configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid canary weight {0}: must be strictly between 0 and 1")]
    Weight(f64),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid artifact URI: {0}")]
    Artifact(String),

    #[error("no xgboost image registry known for region {0}; set image_uri explicitly")]
    UnknownRegion(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
