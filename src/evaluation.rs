//! Classification report for a fitted model against labeled data

use std::fmt;

use linfa::prelude::Predict;
use ndarray::Array1;
use serde::Serialize;
use tracing::info;

use crate::error::{AnomalyError, Result};
use crate::features::{assert_feature_schema, FeatureFrame};
use crate::isolation_forest::{IsolationForest, OUTLIER};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    // 0/0 ratios are reported as 0
    fn from_counts(true_pos: usize, false_pos: usize, false_neg: usize) -> Self {
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(true_pos, true_pos + false_pos);
        let recall = ratio(true_pos, true_pos + false_neg);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            precision,
            recall,
            f1,
            support: true_pos + false_neg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub normal: ClassMetrics,
    pub anomaly: ClassMetrics,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    /// Builds the report from ground truth and predicted flags (`true` = anomaly).
    pub fn from_labels(truth: &[bool], predicted: &[bool]) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(AnomalyError::FeatureMismatch(format!(
                "{} labels but {} predictions",
                truth.len(),
                predicted.len()
            )));
        }

        let (mut tp, mut fp, mut tn, mut fn_) = (0, 0, 0, 0);
        for (&t, &p) in truth.iter().zip(predicted) {
            match (t, p) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (false, false) => tn += 1,
                (true, false) => fn_ += 1,
            }
        }

        let anomaly = ClassMetrics::from_counts(tp, fp, fn_);
        let normal = ClassMetrics::from_counts(tn, fn_, fp);
        let total = truth.len();
        let accuracy = if total == 0 { 0.0 } else { (tp + tn) as f64 / total as f64 };

        let macro_avg = ClassMetrics {
            precision: (normal.precision + anomaly.precision) / 2.0,
            recall: (normal.recall + anomaly.recall) / 2.0,
            f1: (normal.f1 + anomaly.f1) / 2.0,
            support: total,
        };
        let weighted = |pick: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                (pick(&normal) * normal.support as f64 + pick(&anomaly) * anomaly.support as f64)
                    / total as f64
            }
        };
        let weighted_avg = ClassMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
            support: total,
        };

        Ok(Self {
            normal,
            anomaly,
            accuracy,
            macro_avg,
            weighted_avg,
        })
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, name: &str, m: &ClassMetrics) -> fmt::Result {
    writeln!(
        f,
        "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
        name, m.precision, m.recall, m.f1, m.support
    )
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        write_row(f, "Normal", &self.normal)?;
        write_row(f, "Anomaly", &self.anomaly)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        write_row(f, "macro avg", &self.macro_avg)?;
        write_row(f, "weighted avg", &self.weighted_avg)
    }
}

/// Maps the model's outlier sentinel to `true`.
pub fn to_anomaly_flags(predictions: &Array1<i32>) -> Vec<bool> {
    predictions.iter().map(|&p| p == OUTLIER).collect()
}

/// Scores `model` on a labeled frame whose columns match the model's.
pub fn evaluate(model: &IsolationForest, frame: &FeatureFrame) -> Result<ClassificationReport> {
    let names = frame.feature_names();
    assert_feature_schema(&names)?;
    if names.as_slice() != model.feature_names() || frame.records().ncols() != model.n_features() {
        return Err(AnomalyError::FeatureMismatch(format!(
            "model was trained on {:?}, frame has {:?}",
            model.feature_names(),
            names
        )));
    }

    let predictions = model.predict(frame.records());
    let predicted = to_anomaly_flags(&predictions);
    let truth = frame.targets().to_vec();

    let report = ClassificationReport::from_labels(&truth, &predicted)?;
    info!(
        rows = truth.len(),
        accuracy = report.accuracy,
        anomaly_recall = report.anomaly.recall,
        anomaly_precision = report.anomaly.precision,
        "Evaluated model"
    );
    Ok(report)
}
