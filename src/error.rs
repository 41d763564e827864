//! Error types shared by the whole pipeline

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnomalyError {
    /// Dataset file missing, unreadable or holding a malformed row
    #[error("Failed to load dataset: {0}")]
    DataLoad(String),

    /// An expected column is absent
    #[error("Schema error: column '{0}' is missing")]
    Schema(String),

    #[error("Model not found at {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Model artifact is corrupt: {0}")]
    ModelCorrupt(String),

    /// Single-record input or model schema does not line up with the feature columns
    #[error("Feature mismatch: {0}")]
    FeatureMismatch(String),

    #[error("Degenerate data: {0}")]
    DataDegenerate(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Linfa(#[from] linfa::Error),
}

pub type Result<T> = std::result::Result<T, AnomalyError>;
