//! Distribution-based anomaly flags, independent of the outlier model

use serde::Serialize;
use tracing::{info, warn};

use crate::csv_reader::{is_numeric_column, TransactionRecord};
use crate::error::{AnomalyError, Result};

pub const DEFAULT_STDDEV_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelSummary {
    pub column: String,
    pub mean: f64,
    pub std_dev: f64,
    pub threshold: f64,
    pub flagged: usize,
    pub total: usize,
}

impl LabelSummary {
    pub fn anomaly_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.flagged as f64 / self.total as f64
        }
    }
}

/// Sample mean and sample standard deviation (n - 1 denominator).
/// A single value has no sample deviation and reports 0.
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

/// Sets `Is_Anomaly` on every record to whether `column` is strictly above
/// `mean + k * std_dev`. Existing labels are overwritten.
pub fn label_by_stddev(dataset: &mut [TransactionRecord], column: &str, k: f64) -> Result<LabelSummary> {
    if !is_numeric_column(column) {
        return Err(AnomalyError::Schema(column.to_string()));
    }
    if dataset.is_empty() {
        return Err(AnomalyError::DataDegenerate(format!(
            "cannot label '{}' on an empty dataset",
            column
        )));
    }

    let values: Vec<f64> = dataset
        .iter()
        .map(|tx| tx.numeric_value(column).unwrap_or(f64::NAN))
        .collect();
    let (mean, std_dev) = mean_and_std(&values);

    if std_dev == 0.0 {
        warn!(column, mean, rows = dataset.len(), "Zero variance column, no rows will be flagged");
    }

    let threshold = mean + k * std_dev;
    let mut flagged = 0;
    for (tx, value) in dataset.iter_mut().zip(&values) {
        let is_anomaly = *value > threshold;
        if is_anomaly {
            flagged += 1;
        }
        tx.is_anomaly = Some(is_anomaly);
    }

    let summary = LabelSummary {
        column: column.to_string(),
        mean,
        std_dev,
        threshold,
        flagged,
        total: dataset.len(),
    };
    info!(
        column,
        threshold,
        flagged,
        "Anomaly ratio: {:.4}",
        summary.anomaly_ratio()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_reader::{AccountType, DayOfWeek, AGE, DAY_OF_WEEK, TRANSACTION_AMOUNT};
    use approx::assert_relative_eq;

    fn dataset_from_amounts(amounts: &[f64]) -> Vec<TransactionRecord> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, &amount)| TransactionRecord {
                transaction_id: i as u64 + 1,
                customer_id: 2000,
                transaction_amount: amount,
                average_transaction_amount: 100.0,
                frequency_of_transactions: 5.0,
                age: 40,
                account_type: AccountType::Credit,
                day_of_week: DayOfWeek::Saturday,
                is_anomaly: None,
            })
            .collect()
    }

    #[test]
    fn test_flags_only_values_above_threshold() {
        let mut amounts = vec![10.0; 9];
        amounts.push(100.0);
        let mut data = dataset_from_amounts(&amounts);
        let summary = label_by_stddev(&mut data, TRANSACTION_AMOUNT, 2.0).unwrap();

        let flagged: Vec<u64> = data
            .iter()
            .filter(|tx| tx.is_anomaly == Some(true))
            .map(|tx| tx.transaction_id)
            .collect();
        assert_eq!(flagged, vec![10]);
        assert_relative_eq!(summary.mean, 19.0);
        assert_relative_eq!(summary.std_dev, 810.0_f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(summary.anomaly_ratio(), 0.1);
    }

    #[test]
    fn test_five_value_column() {
        // Five samples cap the z-score at 4 / sqrt(5), so k = 2 cannot flag anything.
        let mut data = dataset_from_amounts(&[10.0, 10.0, 10.0, 10.0, 100.0]);
        let summary = label_by_stddev(&mut data, TRANSACTION_AMOUNT, 2.0).unwrap();
        assert_relative_eq!(summary.mean, 28.0);
        assert_relative_eq!(summary.std_dev, 1620.0_f64.sqrt(), epsilon = 1e-9);
        assert_eq!(summary.flagged, 0);

        let summary = label_by_stddev(&mut data, TRANSACTION_AMOUNT, 1.0).unwrap();
        assert_eq!(summary.flagged, 1);
        assert_eq!(data[4].is_anomaly, Some(true));
    }

    #[test]
    fn test_constant_column_flags_nothing() {
        let mut data = dataset_from_amounts(&[50.0; 8]);
        let summary = label_by_stddev(&mut data, TRANSACTION_AMOUNT, 2.0).unwrap();

        assert_eq!(summary.std_dev, 0.0);
        assert_eq!(summary.threshold, 50.0);
        assert_eq!(summary.flagged, 0);
        assert!(data.iter().all(|tx| tx.is_anomaly == Some(false)));
    }

    #[test]
    fn test_single_row_is_not_flagged() {
        let mut data = dataset_from_amounts(&[999.0]);
        let summary = label_by_stddev(&mut data, TRANSACTION_AMOUNT, 2.0).unwrap();
        assert_eq!(summary.flagged, 0);
        assert_eq!(data[0].is_anomaly, Some(false));
    }

    #[test]
    fn test_overwrites_existing_labels() {
        let mut data = dataset_from_amounts(&[1.0, 2.0, 3.0]);
        for tx in data.iter_mut() {
            tx.is_anomaly = Some(true);
        }
        label_by_stddev(&mut data, TRANSACTION_AMOUNT, 2.0).unwrap();
        assert!(data.iter().all(|tx| tx.is_anomaly == Some(false)));
    }

    #[test]
    fn test_other_numeric_column() {
        let mut data = dataset_from_amounts(&[1.0, 2.0]);
        let summary = label_by_stddev(&mut data, AGE, 2.0).unwrap();
        assert_eq!(summary.flagged, 0);
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut data = dataset_from_amounts(&[1.0, 2.0]);
        assert!(matches!(
            label_by_stddev(&mut data, DAY_OF_WEEK, 2.0),
            Err(AnomalyError::Schema(_))
        ));

        let mut empty: Vec<TransactionRecord> = Vec::new();
        assert!(matches!(
            label_by_stddev(&mut empty, TRANSACTION_AMOUNT, 2.0),
            Err(AnomalyError::DataDegenerate(_))
        ));
    }
}
