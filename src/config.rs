//! Configuration management
//!
//! Built-in defaults, then an optional TOML file, then `TXN_ANOMALY__*`
//! environment variables (e.g. `TXN_ANOMALY__MODEL__CONTAMINATION=0.05`).

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::csv_reader::TRANSACTION_AMOUNT;
use crate::error::Result;
use crate::isolation_forest::{
    DEFAULT_CONTAMINATION, DEFAULT_MAX_SAMPLES, DEFAULT_N_ESTIMATORS, DEFAULT_SEED,
};
use crate::labeler::DEFAULT_STDDEV_THRESHOLD;

pub const DEFAULT_CONFIG_PATH: &str = "config/anomaly.toml";
pub const DEFAULT_DATASET_PATH: &str = "dataset/transaction_anomalies_dataset.csv";
pub const DEFAULT_MODEL_PATH: &str = "models/isolation_forest_model.bin";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub labeling: LabelingConfig,
    pub model: ModelConfig,
    pub evaluation: EvaluationConfig,
    pub logging: LoggingConfig,
}

/// Dataset location and synthetic generation settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub dataset_path: PathBuf,
    pub samples: usize,
    pub anomaly_ratio: f64,
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from(DEFAULT_DATASET_PATH),
            samples: 1000,
            anomaly_ratio: 0.02,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabelingConfig {
    /// Column the standard-deviation rule is applied to
    pub column: String,
    /// Number of standard deviations above the mean
    pub stddev_threshold: f64,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            column: TRANSACTION_AMOUNT.to_string(),
            stddev_threshold: DEFAULT_STDDEV_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub contamination: f64,
    pub seed: u64,
    pub n_estimators: usize,
    pub max_samples: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            contamination: DEFAULT_CONTAMINATION,
            seed: DEFAULT_SEED,
            n_estimators: DEFAULT_N_ESTIMATORS,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Share of rows held out for the report; 0 evaluates on the training rows
    pub test_fraction: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { test_fraction: 0.2 }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, if present
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path. A missing file falls back to defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("TXN_ANOMALY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
