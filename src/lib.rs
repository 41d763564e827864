//! Transaction anomaly detection: synthetic data, a statistical labeler and an
//! isolation-forest outlier model with single-record inference.

pub mod config;
pub mod csv_reader;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod generator;
pub mod isolation_forest;
pub mod labeler;
pub mod persistence;
pub mod predictor;


pub use csv_reader::{AccountType, DayOfWeek, TransactionDataset, TransactionRecord};
pub use error::{AnomalyError, Result};
pub use evaluation::{evaluate, ClassificationReport};
pub use features::{frame, frame_default, FeatureFrame, FeatureVector, FEATURE_COLUMNS};
pub use generator::generate;
pub use isolation_forest::{train, IsolationForest, IsolationForestParams};
pub use labeler::{label_by_stddev, LabelSummary};
pub use predictor::{predict, AnomalyPredictor, DetectionVerdict, TransactionInput};
