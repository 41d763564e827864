// Command-line entry point: generate data, train and evaluate the outlier model, classify one transaction.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linfa::traits::Fit;
use tracing::info;

use transaction_anomaly::config::AppConfig;
use transaction_anomaly::csv_reader::{load_transactions, write_transactions};
use transaction_anomaly::features::{assert_feature_schema, frame_default, train_test_split};
use transaction_anomaly::predictor::{AnomalyPredictor, TransactionInput};
use transaction_anomaly::{evaluate, generate, label_by_stddev, persistence, FeatureVector, IsolationForest};

#[derive(Parser)]
#[command(name = "transaction-anomaly")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Detect anomalous financial transactions with an isolation forest")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic labeled dataset
    Generate {
        #[arg(long)]
        samples: Option<usize>,
        #[arg(long)]
        anomaly_ratio: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Label, train, report and save the model
    Train {
        #[arg(short, long)]
        data: Option<PathBuf>,
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
    /// Report a saved model against a labeled dataset
    Evaluate {
        #[arg(short, long)]
        data: Option<PathBuf>,
        #[arg(short, long)]
        model: Option<PathBuf>,
        /// Recompute labels with the standard-deviation rule first
        #[arg(long)]
        relabel: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify a single transaction
    Detect {
        #[arg(short, long)]
        model: Option<PathBuf>,
        #[arg(long, requires_all = ["average", "frequency"], conflicts_with = "json")]
        amount: Option<f64>,
        #[arg(long)]
        average: Option<f64>,
        #[arg(long)]
        frequency: Option<f64>,
        /// Transaction as a JSON object of feature names or an ordered array
        #[arg(long)]
        json: Option<String>,
    },
}

fn cmd_generate(
    config: &AppConfig,
    samples: Option<usize>,
    anomaly_ratio: Option<f64>,
    seed: Option<u64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let samples = samples.unwrap_or(config.data.samples);
    let anomaly_ratio = anomaly_ratio.unwrap_or(config.data.anomaly_ratio);
    let seed = seed.unwrap_or(config.data.seed);
    let output = output.unwrap_or_else(|| config.data.dataset_path.clone());

    let dataset = generate(samples, anomaly_ratio, seed)?;
    write_transactions(&output, &dataset)?;

    let anomalies = dataset.iter().filter(|tx| tx.is_anomaly == Some(true)).count();
    println!(
        "Generated {} transactions ({} anomalies) and saved to {}",
        dataset.len(),
        anomalies,
        output.display()
    );
    Ok(())
}

fn cmd_train(config: &AppConfig, data: Option<PathBuf>, model_path: Option<PathBuf>) -> Result<()> {
    let data = data.unwrap_or_else(|| config.data.dataset_path.clone());
    let model_path = model_path.unwrap_or_else(|| config.model.model_path.clone());

    let (mut dataset, missing) = load_transactions(&data)
        .with_context(|| format!("loading {}", data.display()))?;
    println!("Missing values in each column:");
    for (column, count) in &missing.per_column {
        println!("  {:<28} {}", column, count);
    }

    let summary = label_by_stddev(
        &mut dataset,
        &config.labeling.column,
        config.labeling.stddev_threshold,
    )?;
    println!("Anomaly ratio: {:.4}", summary.anomaly_ratio());

    let frame = frame_default(&dataset)?;
    assert_feature_schema(&frame.feature_names())?;
    let (train_frame, test_frame) =
        train_test_split(&frame, config.evaluation.test_fraction, config.model.seed)?;

    let model = IsolationForest::params()
        .contamination(config.model.contamination)
        .seed(config.model.seed)
        .n_estimators(config.model.n_estimators)
        .max_samples(config.model.max_samples)
        .fit(&train_frame)?;
    println!(
        "Trained {} trees (seed {}), decision threshold {:.4}",
        model.n_trees(),
        model.seed(),
        model.decision_threshold()
    );

    let report_frame = if test_frame.records().nrows() > 0 { &test_frame } else { &train_frame };
    let report = evaluate(&model, report_frame)?;
    println!("\n{}", report);

    persistence::save(&model, &model_path)?;
    println!("Model saved to {}", model_path.display());
    Ok(())
}

fn cmd_evaluate(
    config: &AppConfig,
    data: Option<PathBuf>,
    model_path: Option<PathBuf>,
    relabel: bool,
    json: bool,
) -> Result<()> {
    let data = data.unwrap_or_else(|| config.data.dataset_path.clone());
    let model_path = model_path.unwrap_or_else(|| config.model.model_path.clone());

    let predictor = AnomalyPredictor::from_path(&model_path)?;
    let (mut dataset, _) = load_transactions(&data)
        .with_context(|| format!("loading {}", data.display()))?;
    if relabel {
        label_by_stddev(
            &mut dataset,
            &config.labeling.column,
            config.labeling.stddev_threshold,
        )?;
    }

    let report = evaluate(predictor.model(), &frame_default(&dataset)?)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn cmd_detect(
    config: &AppConfig,
    model_path: Option<PathBuf>,
    features: Option<FeatureVector>,
    json: Option<String>,
) -> Result<()> {
    let model_path = model_path.unwrap_or_else(|| config.model.model_path.clone());
    let input: TransactionInput = match (features, json) {
        (Some(features), _) => features.into(),
        (None, Some(raw)) => serde_json::from_str(&raw).context("parsing --json transaction")?,
        (None, None) => anyhow::bail!("pass --amount/--average/--frequency or --json"),
    };

    let predictor = AnomalyPredictor::from_path(&model_path)?;
    let verdict = predictor.detect(&input)?;
    info!(score = verdict.score, "Detection finished");

    if verdict.is_anomaly {
        println!("ANOMALY DETECTED: This transaction is flagged as suspicious.");
    } else {
        println!("No anomaly detected: This transaction appears to be normal.");
    }
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .init();

    match cli.command {
        Commands::Generate { samples, anomaly_ratio, seed, output } => {
            cmd_generate(&config, samples, anomaly_ratio, seed, output)?;
        }
        Commands::Train { data, model } => {
            cmd_train(&config, data, model)?;
        }
        Commands::Evaluate { data, model, relabel, json } => {
            cmd_evaluate(&config, data, model, relabel, json)?;
        }
        Commands::Detect { model, amount, average, frequency, json } => {
            let features = match (amount, average, frequency) {
                (Some(a), Some(avg), Some(freq)) => Some(FeatureVector {
                    transaction_amount: a,
                    average_transaction_amount: avg,
                    frequency_of_transactions: freq,
                }),
                _ => None,
            };
            cmd_detect(&config, model, features, json)?;
        }
    }

    Ok(())
}
