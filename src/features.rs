//! Feature framing
//!
//! The model sees exactly three numeric columns, always in the order given by
//! [`FEATURE_COLUMNS`]. Training, persistence and inference all check against
//! this constant, so a reordered or renamed column fails loudly instead of
//! silently scoring the wrong feature.

use linfa::Dataset;
use ndarray::{Array1, Array2, Axis, Ix1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::csv_reader::{
    is_numeric_column, TransactionRecord, AVERAGE_TRANSACTION_AMOUNT, FREQUENCY_OF_TRANSACTIONS,
    IS_ANOMALY, TRANSACTION_AMOUNT,
};
use crate::error::{AnomalyError, Result};

/// Canonical model input columns, in order.
pub const FEATURE_COLUMNS: [&str; 3] = [
    TRANSACTION_AMOUNT,
    AVERAGE_TRANSACTION_AMOUNT,
    FREQUENCY_OF_TRANSACTIONS,
];

/// Bumped whenever `FEATURE_COLUMNS` changes.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Feature matrix plus boolean anomaly labels, with column names attached.
pub type FeatureFrame = Dataset<f64, bool, Ix1>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(rename = "Transaction_Amount")]
    pub transaction_amount: f64,
    #[serde(rename = "Average_Transaction_Amount")]
    pub average_transaction_amount: f64,
    #[serde(rename = "Frequency_of_Transactions")]
    pub frequency_of_transactions: f64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; 3] {
        [
            self.transaction_amount,
            self.average_transaction_amount,
            self.frequency_of_transactions,
        ]
    }

    /// One-row matrix laid out like the training frame.
    pub fn to_row(&self) -> Array2<f64> {
        Array2::from_shape_fn((1, FEATURE_COLUMNS.len()), |(_, j)| self.to_array()[j])
    }
}

/// Checks that `columns` is exactly the canonical feature list.
pub fn assert_feature_schema<S: AsRef<str>>(columns: &[S]) -> Result<()> {
    let matches = columns.len() == FEATURE_COLUMNS.len()
        && columns
            .iter()
            .zip(FEATURE_COLUMNS.iter())
            .all(|(got, want)| got.as_ref() == *want);
    if matches {
        Ok(())
    } else {
        let got: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
        Err(AnomalyError::FeatureMismatch(format!(
            "expected columns {:?} (schema v{}), got {:?}",
            FEATURE_COLUMNS, FEATURE_SCHEMA_VERSION, got
        )))
    }
}

/// Frames the named numeric columns and the `Is_Anomaly` label.
pub fn frame(dataset: &[TransactionRecord], feature_columns: &[&str]) -> Result<FeatureFrame> {
    if let Some(unknown) = feature_columns.iter().find(|c| !is_numeric_column(c)) {
        return Err(AnomalyError::Schema(unknown.to_string()));
    }

    let n_samples = dataset.len();
    let n_features = feature_columns.len();
    let mut records = Array2::zeros((n_samples, n_features));
    let mut labels = Array1::from_elem(n_samples, false);

    for (i, tx) in dataset.iter().enumerate() {
        for (j, column) in feature_columns.iter().enumerate() {
            records[[i, j]] = tx
                .numeric_value(column)
                .ok_or_else(|| AnomalyError::Schema(column.to_string()))?;
        }
        labels[i] = tx
            .is_anomaly
            .ok_or_else(|| AnomalyError::Schema(IS_ANOMALY.to_string()))?;
    }

    Ok(Dataset::new(records, labels).with_feature_names(feature_columns.to_vec()))
}

pub fn frame_default(dataset: &[TransactionRecord]) -> Result<FeatureFrame> {
    frame(dataset, &FEATURE_COLUMNS)
}

/// Seeded shuffle-and-split into (train, test). A zero fraction returns the
/// whole frame as the training part and an empty test part.
pub fn train_test_split(
    frame: &FeatureFrame,
    test_fraction: f64,
    seed: u64,
) -> Result<(FeatureFrame, FeatureFrame)> {
    if !(0.0..1.0).contains(&test_fraction) {
        return Err(AnomalyError::InvalidParameter(format!(
            "test fraction must be in [0, 1), got {}",
            test_fraction
        )));
    }

    let n_samples = frame.records().nrows();
    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = (n_samples as f64 * test_fraction).ceil() as usize;
    let (test_idx, train_idx) = indices.split_at(n_test);

    let names: Vec<String> = frame.feature_names().iter().cloned().collect();
    let subset = |idx: &[usize]| -> FeatureFrame {
        Dataset::new(
            frame.records().select(Axis(0), idx),
            frame.targets().select(Axis(0), idx),
        )
        .with_feature_names(names.clone())
    };

    Ok((subset(train_idx), subset(test_idx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_reader::{AccountType, DayOfWeek, AGE};

    fn record(id: u64, amount: f64, avg: f64, freq: f64, label: Option<bool>) -> TransactionRecord {
        TransactionRecord {
            transaction_id: id,
            customer_id: 1000 + id as u32,
            transaction_amount: amount,
            average_transaction_amount: avg,
            frequency_of_transactions: freq,
            age: 30,
            account_type: AccountType::Savings,
            day_of_week: DayOfWeek::Tuesday,
            is_anomaly: label,
        }
    }

    #[test]
    fn test_frame_keeps_declared_order() {
        let data = vec![
            record(1, 10.0, 20.0, 3.0, Some(false)),
            record(2, 400.0, 90.0, 18.0, Some(true)),
        ];
        let frame = frame_default(&data).unwrap();

        assert_eq!(frame.records().shape(), &[2, 3]);
        assert_eq!(frame.records()[[0, 0]], 10.0);
        assert_eq!(frame.records()[[0, 1]], 20.0);
        assert_eq!(frame.records()[[0, 2]], 3.0);
        assert_eq!(frame.targets().to_vec(), vec![false, true]);
        assert!(assert_feature_schema(&frame.feature_names()).is_ok());
    }

    #[test]
    fn test_frame_custom_columns() {
        let data = vec![record(1, 10.0, 20.0, 3.0, Some(false))];
        let frame = frame(&data, &[AGE, TRANSACTION_AMOUNT]).unwrap();
        assert_eq!(frame.records().row(0).to_vec(), vec![30.0, 10.0]);
        assert!(assert_feature_schema(&frame.feature_names()).is_err());
    }

    #[test]
    fn test_unknown_column_is_schema_error() {
        let data = vec![record(1, 10.0, 20.0, 3.0, Some(false))];
        match frame(&data, &[TRANSACTION_AMOUNT, "Balance"]) {
            Err(AnomalyError::Schema(column)) => assert_eq!(column, "Balance"),
            other => panic!("expected schema error, got {:?}", other.map(|f| f.records().nrows())),
        }
    }

    #[test]
    fn test_unlabeled_record_is_schema_error() {
        let data = vec![
            record(1, 10.0, 20.0, 3.0, Some(false)),
            record(2, 12.0, 20.0, 3.0, None),
        ];
        match frame_default(&data) {
            Err(AnomalyError::Schema(column)) => assert_eq!(column, IS_ANOMALY),
            other => panic!("expected schema error, got {:?}", other.map(|f| f.records().nrows())),
        }
    }

    #[test]
    fn test_schema_assertion_rejects_reordering() {
        let reordered = [FREQUENCY_OF_TRANSACTIONS, TRANSACTION_AMOUNT, AVERAGE_TRANSACTION_AMOUNT];
        assert!(matches!(
            assert_feature_schema(&reordered),
            Err(AnomalyError::FeatureMismatch(_))
        ));
        assert!(assert_feature_schema(&FEATURE_COLUMNS).is_ok());
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let data: Vec<_> = (0..50)
            .map(|i| record(i, i as f64, 100.0, 5.0, Some(i % 10 == 0)))
            .collect();
        let frame = frame_default(&data).unwrap();

        let (train, test) = train_test_split(&frame, 0.2, 7).unwrap();
        assert_eq!(train.records().nrows(), 40);
        assert_eq!(test.records().nrows(), 10);
        assert!(assert_feature_schema(&train.feature_names()).is_ok());

        let (train_again, _) = train_test_split(&frame, 0.2, 7).unwrap();
        assert_eq!(train.records(), train_again.records());
        assert_eq!(train.targets(), train_again.targets());
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        let data = vec![record(1, 10.0, 20.0, 3.0, Some(false))];
        let frame = frame_default(&data).unwrap();
        assert!(train_test_split(&frame, 1.0, 1).is_err());
        assert!(train_test_split(&frame, -0.1, 1).is_err());

        let (train, test) = train_test_split(&frame, 0.0, 1).unwrap();
        assert_eq!(train.records().nrows(), 1);
        assert_eq!(test.records().nrows(), 0);
    }

    #[test]
    fn test_feature_vector_row() {
        let fv = FeatureVector {
            transaction_amount: 450.0,
            average_transaction_amount: 100.0,
            frequency_of_transactions: 15.0,
        };
        assert_eq!(fv.to_row().row(0).to_vec(), vec![450.0, 100.0, 15.0]);
    }
}
