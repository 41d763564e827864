//! Single-transaction inference
//!
//! A transaction arrives either as named fields or as an ordered list of the
//! three feature values. Both are resolved to a [`FeatureVector`] before the
//! model sees them, and anything malformed is a `FeatureMismatch` error rather
//! than a "normal" verdict.

use std::collections::HashMap;
use std::path::Path;

use linfa::prelude::Predict;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnomalyError, Result};
use crate::features::{assert_feature_schema, FeatureVector, FEATURE_COLUMNS};
use crate::isolation_forest::{IsolationForest, OUTLIER};
use crate::persistence;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TransactionInput {
    NamedFields(HashMap<String, f64>),
    OrderedFields(Vec<f64>),
}

impl TransactionInput {
    pub fn resolve(&self) -> Result<FeatureVector> {
        let values: [f64; 3] = match self {
            TransactionInput::NamedFields(fields) => {
                if let Some(unknown) = fields.keys().find(|k| !FEATURE_COLUMNS.contains(&k.as_str())) {
                    return Err(AnomalyError::FeatureMismatch(format!(
                        "unexpected field '{}'",
                        unknown
                    )));
                }
                let mut values = [0.0; 3];
                for (slot, column) in values.iter_mut().zip(FEATURE_COLUMNS) {
                    *slot = *fields.get(column).ok_or_else(|| {
                        AnomalyError::FeatureMismatch(format!("missing field '{}'", column))
                    })?;
                }
                values
            }
            TransactionInput::OrderedFields(list) => {
                <[f64; 3]>::try_from(list.as_slice()).map_err(|_| {
                    AnomalyError::FeatureMismatch(format!(
                        "expected {} values in order {:?}, got {}",
                        FEATURE_COLUMNS.len(),
                        FEATURE_COLUMNS,
                        list.len()
                    ))
                })?
            }
        };

        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(AnomalyError::FeatureMismatch(format!(
                "'{}' must be a finite number",
                FEATURE_COLUMNS[pos]
            )));
        }

        Ok(FeatureVector {
            transaction_amount: values[0],
            average_transaction_amount: values[1],
            frequency_of_transactions: values[2],
        })
    }
}

impl From<FeatureVector> for TransactionInput {
    fn from(features: FeatureVector) -> Self {
        TransactionInput::OrderedFields(features.to_array().to_vec())
    }
}

/// Verdict for one transaction together with the inputs that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionVerdict {
    pub is_anomaly: bool,
    pub score: f64,
    pub features: FeatureVector,
}

/// Holds a loaded model for the lifetime of its owner.
#[derive(Debug, Clone)]
pub struct AnomalyPredictor {
    model: IsolationForest,
}

impl AnomalyPredictor {
    pub fn new(model: IsolationForest) -> Result<Self> {
        assert_feature_schema(model.feature_names())?;
        Ok(Self { model })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(persistence::load(path)?)
    }

    pub fn model(&self) -> &IsolationForest {
        &self.model
    }

    pub fn detect(&self, input: &TransactionInput) -> Result<DetectionVerdict> {
        let features = input.resolve()?;
        let row = features.to_row();
        let prediction = self.model.predict(&row);
        let score = self.model.score_row(row.row(0));
        let is_anomaly = prediction[0] == OUTLIER;

        debug!(?features, score, is_anomaly, "Scored transaction");
        Ok(DetectionVerdict {
            is_anomaly,
            score,
            features,
        })
    }

    pub fn predict(&self, input: &TransactionInput) -> Result<bool> {
        Ok(self.detect(input)?.is_anomaly)
    }
}

/// One-shot prediction against a model the caller already holds.
pub fn predict(model: &IsolationForest, transaction: &TransactionInput) -> Result<bool> {
    assert_feature_schema(model.feature_names())?;
    let features = transaction.resolve()?;
    let prediction = model.predict(&features.to_row());
    Ok(prediction[0] == OUTLIER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_reader::{AVERAGE_TRANSACTION_AMOUNT, FREQUENCY_OF_TRANSACTIONS, TRANSACTION_AMOUNT};

    fn named(pairs: &[(&str, f64)]) -> TransactionInput {
        TransactionInput::NamedFields(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[test]
    fn test_named_fields_resolve_in_canonical_order() {
        let input = named(&[
            (FREQUENCY_OF_TRANSACTIONS, 15.0),
            (TRANSACTION_AMOUNT, 450.0),
            (AVERAGE_TRANSACTION_AMOUNT, 100.0),
        ]);
        assert_eq!(input.resolve().unwrap().to_array(), [450.0, 100.0, 15.0]);
    }

    #[test]
    fn test_missing_key_is_mismatch() {
        let input = named(&[(TRANSACTION_AMOUNT, 450.0), (AVERAGE_TRANSACTION_AMOUNT, 100.0)]);
        match input.resolve() {
            Err(AnomalyError::FeatureMismatch(msg)) => assert!(msg.contains(FREQUENCY_OF_TRANSACTIONS)),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_key_is_mismatch() {
        let input = named(&[
            (TRANSACTION_AMOUNT, 450.0),
            (AVERAGE_TRANSACTION_AMOUNT, 100.0),
            (FREQUENCY_OF_TRANSACTIONS, 15.0),
            ("Age", 30.0),
        ]);
        assert!(matches!(input.resolve(), Err(AnomalyError::FeatureMismatch(_))));
    }

    #[test]
    fn test_ordered_fields_length_checked() {
        let ok = TransactionInput::OrderedFields(vec![1.0, 2.0, 3.0]);
        assert_eq!(ok.resolve().unwrap().to_array(), [1.0, 2.0, 3.0]);

        for bad in [vec![], vec![1.0, 2.0], vec![1.0, 2.0, 3.0, 4.0]] {
            let input = TransactionInput::OrderedFields(bad);
            assert!(matches!(input.resolve(), Err(AnomalyError::FeatureMismatch(_))));
        }
    }

    #[test]
    fn test_non_finite_rejected() {
        let input = TransactionInput::OrderedFields(vec![1.0, f64::NAN, 3.0]);
        match input.resolve() {
            Err(AnomalyError::FeatureMismatch(msg)) => assert!(msg.contains(AVERAGE_TRANSACTION_AMOUNT)),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_json_object_or_array() {
        let obj: TransactionInput = serde_json::from_str(
            r#"{"Transaction_Amount": 95, "Average_Transaction_Amount": 100.0, "Frequency_of_Transactions": 6}"#,
        )
        .unwrap();
        assert!(matches!(obj, TransactionInput::NamedFields(_)));
        assert_eq!(obj.resolve().unwrap().to_array(), [95.0, 100.0, 6.0]);

        let arr: TransactionInput = serde_json::from_str("[95, 100, 6]").unwrap();
        assert!(matches!(arr, TransactionInput::OrderedFields(_)));
        assert_eq!(arr.resolve().unwrap(), obj.resolve().unwrap());
    }
}
