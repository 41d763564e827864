//! Isolation Forest outlier model
//!
//! Points that are few and different get isolated by fewer random
//! axis-aligned splits. Each tree is grown on a subsample; the score of a
//! point is `2^(-E[h(x)] / c(psi))` where `h` is the path length and `c(psi)`
//! the average path length of an unsuccessful BST search over `psi` points.

use linfa::traits::{Fit, PredictInplace};
use linfa::DatasetBase;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix2};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AnomalyError, Result};
use crate::features::{assert_feature_schema, FeatureFrame};

/// Prediction for an outlier.
pub const OUTLIER: i32 = -1;
/// Prediction for an inlier.
pub const INLIER: i32 = 1;

pub const DEFAULT_CONTAMINATION: f64 = 0.02;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_N_ESTIMATORS: usize = 100;
pub const DEFAULT_MAX_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IsolationTree {
    Internal {
        feature: usize,
        threshold: f64,
        /// values < threshold
        left: Box<IsolationTree>,
        /// values >= threshold
        right: Box<IsolationTree>,
    },
    External {
        size: usize,
    },
}

impl IsolationTree {
    fn build(
        x: &Array2<f64>,
        indices: &[usize],
        height: usize,
        max_height: usize,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let n_samples = indices.len();
        if height >= max_height || n_samples <= 1 {
            return IsolationTree::External { size: n_samples };
        }

        let feature = rng.gen_range(0..x.ncols());
        let (min_val, max_val) = indices
            .iter()
            .map(|&i| x[[i, feature]])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });

        // Nothing to split on along this axis
        if max_val <= min_val {
            return IsolationTree::External { size: n_samples };
        }

        let threshold = rng.gen_range(min_val..max_val);
        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature]] < threshold);

        if left_indices.is_empty() || right_indices.is_empty() {
            return IsolationTree::External { size: n_samples };
        }

        IsolationTree::Internal {
            feature,
            threshold,
            left: Box::new(Self::build(x, &left_indices, height + 1, max_height, rng)),
            right: Box::new(Self::build(x, &right_indices, height + 1, max_height, rng)),
        }
    }

    pub fn path_length(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = self;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationTree::External { size } => return depth as f64 + average_path_length(*size),
                IsolationTree::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] < *threshold { &**left } else { &**right };
                    depth += 1;
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            IsolationTree::External { .. } => 0,
            IsolationTree::Internal { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// c(n) = 2 H(n - 1) - 2 (n - 1) / n
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated quantile, `q` in [0, 1].
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Hyperparameters; call [`Fit::fit`] to train.
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForestParams {
    n_estimators: usize,
    max_samples: usize,
    contamination: f64,
    seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: DEFAULT_N_ESTIMATORS,
            max_samples: DEFAULT_MAX_SAMPLES,
            contamination: DEFAULT_CONTAMINATION,
            seed: DEFAULT_SEED,
        }
    }
}

impl IsolationForestParams {
    pub fn n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn max_samples(mut self, n: usize) -> Self {
        self.max_samples = n;
        self
    }

    /// Expected share of outliers in the training data, in (0, 0.5).
    pub fn contamination(mut self, c: f64) -> Self {
        self.contamination = c;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination < 0.5) {
            return Err(AnomalyError::InvalidParameter(format!(
                "contamination must be in (0, 0.5), got {}",
                self.contamination
            )));
        }
        if self.n_estimators == 0 {
            return Err(AnomalyError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.max_samples == 0 {
            return Err(AnomalyError::InvalidParameter(
                "max_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl<T> Fit<Array2<f64>, T, AnomalyError> for IsolationForestParams {
    type Object = IsolationForest;

    fn fit(&self, dataset: &DatasetBase<Array2<f64>, T>) -> Result<IsolationForest> {
        self.validate()?;

        let x = dataset.records();
        let n_samples = x.nrows();
        if n_samples < 2 || x.ncols() == 0 {
            return Err(AnomalyError::DataDegenerate(format!(
                "need at least 2 rows and 1 column to fit, got {}x{}",
                n_samples,
                x.ncols()
            )));
        }
        if let Some(bad) = x.iter().find(|v| !v.is_finite()) {
            return Err(AnomalyError::DataDegenerate(format!(
                "feature matrix contains a non-finite value ({})",
                bad
            )));
        }

        let sample_size = self.max_samples.min(n_samples);
        let max_height = (sample_size as f64).log2().ceil() as usize;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let trees: Vec<IsolationTree> = (0..self.n_estimators)
            .map(|_| {
                let indices = index::sample(&mut rng, n_samples, sample_size).into_vec();
                IsolationTree::build(x, &indices, 0, max_height, &mut rng)
            })
            .collect();
        debug!(
            trees = trees.len(),
            deepest = trees.iter().map(IsolationTree::depth).max().unwrap_or(0),
            max_height,
            "Grew isolation trees"
        );

        let mut model = IsolationForest {
            trees,
            sample_size,
            contamination: self.contamination,
            seed: self.seed,
            threshold: 0.0,
            feature_names: dataset.feature_names().iter().cloned().collect(),
        };

        let scores = model.score_samples(x).to_vec();
        model.threshold = quantile(&scores, 1.0 - self.contamination);

        info!(
            n_samples,
            n_features = x.ncols(),
            contamination = self.contamination,
            threshold = model.threshold,
            "Trained isolation forest"
        );
        Ok(model)
    }
}

/// A fitted isolation forest. Immutable once trained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    contamination: f64,
    seed: u64,
    threshold: f64,
    feature_names: Vec<String>,
}

impl IsolationForest {
    pub fn params() -> IsolationForestParams {
        IsolationForestParams::default()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Scores strictly above this are outliers.
    pub fn decision_threshold(&self) -> f64 {
        self.threshold
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Anomaly score in (0, 1]; higher is more anomalous.
    pub fn score_row(&self, row: ArrayView1<f64>) -> f64 {
        let mean_path = self.trees.iter().map(|t| t.path_length(row)).sum::<f64>()
            / self.trees.len() as f64;
        2.0_f64.powf(-mean_path / average_path_length(self.sample_size).max(1.0))
    }

    pub fn score_samples<D: Data<Elem = f64>>(&self, x: &ArrayBase<D, Ix2>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.score_row(row)).collect()
    }

    pub fn is_outlier(&self, score: f64) -> bool {
        score > self.threshold
    }
}

impl<D: Data<Elem = f64>> PredictInplace<ArrayBase<D, Ix2>, Array1<i32>> for IsolationForest {
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<i32>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );
        for (row, target) in x.rows().into_iter().zip(y.iter_mut()) {
            *target = if self.is_outlier(self.score_row(row)) {
                OUTLIER
            } else {
                INLIER
            };
        }
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<i32> {
        Array1::from_elem(x.nrows(), INLIER)
    }
}

/// Trains on a framed dataset after checking its columns are the canonical features.
pub fn train(frame: &FeatureFrame, contamination: f64, seed: u64) -> Result<IsolationForest> {
    assert_feature_schema(&frame.feature_names())?;
    IsolationForest::params()
        .contamination(contamination)
        .seed(seed)
        .fit(frame)
}
