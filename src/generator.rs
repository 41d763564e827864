//! Synthetic transaction data with injected anomalies

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::info;

use crate::csv_reader::{AccountType, DayOfWeek, TransactionDataset, TransactionRecord};
use crate::error::{AnomalyError, Result};

const CUSTOMER_ID_RANGE: std::ops::Range<u32> = 1000..9999;
const AGE_RANGE: std::ops::Range<u32> = 18..75;

/// Distribution parameters for one group of generated rows.
#[derive(Debug, Clone, Copy)]
struct GroupProfile {
    amount: (f64, f64),
    average_amount: (f64, f64),
    frequency: (f64, f64),
    is_anomaly: bool,
}

const NORMAL_PROFILE: GroupProfile = GroupProfile {
    amount: (100.0, 30.0),
    average_amount: (100.0, 20.0),
    frequency: (5.0, 2.0),
    is_anomaly: false,
};

// Average amount stays put so the amount/average gap carries the signal.
const ANOMALY_PROFILE: GroupProfile = GroupProfile {
    amount: (300.0, 50.0),
    average_amount: (100.0, 20.0),
    frequency: (15.0, 5.0),
    is_anomaly: true,
};

fn gaussian((mean, std_dev): (f64, f64)) -> Result<Normal<f64>> {
    Normal::new(mean, std_dev).map_err(|e| AnomalyError::InvalidParameter(e.to_string()))
}

fn generate_group(
    rng: &mut ChaCha8Rng,
    profile: GroupProfile,
    first_id: u64,
    count: usize,
) -> Result<Vec<TransactionRecord>> {
    let amount = gaussian(profile.amount)?;
    let average_amount = gaussian(profile.average_amount)?;
    let frequency = gaussian(profile.frequency)?;

    let mut records = Vec::with_capacity(count);
    for offset in 0..count as u64 {
        records.push(TransactionRecord {
            transaction_id: first_id + offset,
            customer_id: rng.gen_range(CUSTOMER_ID_RANGE),
            transaction_amount: amount.sample(rng),
            average_transaction_amount: average_amount.sample(rng),
            frequency_of_transactions: frequency.sample(rng),
            age: rng.gen_range(AGE_RANGE),
            account_type: AccountType::ALL[rng.gen_range(0..AccountType::ALL.len())],
            day_of_week: DayOfWeek::ALL[rng.gen_range(0..DayOfWeek::ALL.len())],
            is_anomaly: Some(profile.is_anomaly),
        });
    }
    Ok(records)
}

/// Generates `n_samples` labeled transactions, `floor(n_samples * anomaly_ratio)`
/// of them anomalous, shuffled. Same arguments give the same dataset.
pub fn generate(n_samples: usize, anomaly_ratio: f64, seed: u64) -> Result<TransactionDataset> {
    if n_samples == 0 {
        return Err(AnomalyError::InvalidParameter(
            "n_samples must be at least 1".to_string(),
        ));
    }
    if !(0.0..1.0).contains(&anomaly_ratio) {
        return Err(AnomalyError::InvalidParameter(format!(
            "anomaly ratio must be in [0, 1), got {}",
            anomaly_ratio
        )));
    }

    let n_anomalies = (n_samples as f64 * anomaly_ratio).floor() as usize;
    let n_normal = n_samples - n_anomalies;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut dataset = generate_group(&mut rng, NORMAL_PROFILE, 1, n_normal)?;
    dataset.extend(generate_group(
        &mut rng,
        ANOMALY_PROFILE,
        n_normal as u64 + 1,
        n_anomalies,
    )?);

    let mut shuffle_rng = ChaCha8Rng::seed_from_u64(seed);
    dataset.shuffle(&mut shuffle_rng);

    info!(n_samples, n_normal, n_anomalies, seed, "Generated synthetic transactions");
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_is_deterministic() {
        let a = generate(500, 0.05, 42).unwrap();
        let b = generate(500, 0.05, 42).unwrap();
        assert_eq!(a, b);

        let c = generate(500, 0.05, 43).unwrap();
        assert_ne!(a, c, "Different seeds should give different data");
    }

    #[test]
    fn test_cardinality() {
        let data = generate(1000, 0.02, 42).unwrap();
        assert_eq!(data.len(), 1000);
        assert_eq!(data.iter().filter(|tx| tx.is_anomaly == Some(true)).count(), 20);

        let odd = generate(99, 0.05, 1).unwrap();
        assert_eq!(odd.iter().filter(|tx| tx.is_anomaly == Some(true)).count(), 4);
    }

    #[test]
    fn test_ids_contiguous_and_ranges_respected() {
        let data = generate(300, 0.1, 9).unwrap();
        let ids: HashSet<u64> = data.iter().map(|tx| tx.transaction_id).collect();
        assert_eq!(ids, (1..=300).collect::<HashSet<u64>>());

        for tx in &data {
            assert!((1000..9999).contains(&tx.customer_id));
            assert!((18..75).contains(&tx.age));
            assert!(tx.transaction_amount.is_finite());
        }

        // Anomalous rows carry the last IDs before shuffling.
        assert!(data
            .iter()
            .filter(|tx| tx.is_anomaly == Some(true))
            .all(|tx| tx.transaction_id > 270));
    }

    #[test]
    fn test_rows_are_shuffled() {
        let data = generate(200, 0.1, 5).unwrap();
        let in_order = data
            .iter()
            .enumerate()
            .all(|(i, tx)| tx.transaction_id == i as u64 + 1);
        assert!(!in_order);
    }

    #[test]
    fn test_anomalies_have_larger_amounts() {
        let data = generate(2000, 0.1, 42).unwrap();
        let mean = |flag: bool| {
            let rows: Vec<f64> = data
                .iter()
                .filter(|tx| tx.is_anomaly == Some(flag))
                .map(|tx| tx.transaction_amount)
                .collect();
            rows.iter().sum::<f64>() / rows.len() as f64
        };
        assert!(mean(true) > 250.0);
        assert!(mean(false) < 120.0);
    }

    #[test]
    fn test_zero_ratio_and_invalid_params() {
        let data = generate(10, 0.0, 3).unwrap();
        assert!(data.iter().all(|tx| tx.is_anomaly == Some(false)));

        assert!(generate(0, 0.1, 3).is_err());
        assert!(generate(10, 1.0, 3).is_err());
        assert!(generate(10, -0.5, 3).is_err());
    }
}
