use std::fs::{self, File};
use std::path::Path;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AnomalyError, Result};

pub const TRANSACTION_ID: &str = "Transaction_ID";
pub const CUSTOMER_ID: &str = "Customer_ID";
pub const TRANSACTION_AMOUNT: &str = "Transaction_Amount";
pub const AVERAGE_TRANSACTION_AMOUNT: &str = "Average_Transaction_Amount";
pub const FREQUENCY_OF_TRANSACTIONS: &str = "Frequency_of_Transactions";
pub const AGE: &str = "Age";
pub const ACCOUNT_TYPE: &str = "Account_Type";
pub const DAY_OF_WEEK: &str = "Day_of_Week";
pub const IS_ANOMALY: &str = "Is_Anomaly";

/// Columns every dataset file must carry. `Is_Anomaly` is optional until labeling.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    TRANSACTION_ID,
    CUSTOMER_ID,
    TRANSACTION_AMOUNT,
    AVERAGE_TRANSACTION_AMOUNT,
    FREQUENCY_OF_TRANSACTIONS,
    AGE,
    ACCOUNT_TYPE,
    DAY_OF_WEEK,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Savings,
    Checking,
    Credit,
}

impl AccountType {
    pub const ALL: [AccountType; 3] = [AccountType::Savings, AccountType::Checking, AccountType::Credit];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];
}

/// A complete transaction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(rename = "Transaction_ID")]
    pub transaction_id: u64,
    #[serde(rename = "Customer_ID")]
    pub customer_id: u32,
    #[serde(rename = "Transaction_Amount")]
    pub transaction_amount: f64,
    #[serde(rename = "Average_Transaction_Amount")]
    pub average_transaction_amount: f64,
    #[serde(rename = "Frequency_of_Transactions")]
    pub frequency_of_transactions: f64,
    #[serde(rename = "Age")]
    pub age: u32,
    #[serde(rename = "Account_Type")]
    pub account_type: AccountType,
    #[serde(rename = "Day_of_Week")]
    pub day_of_week: DayOfWeek,
    #[serde(rename = "Is_Anomaly", default, deserialize_with = "deserialize_flag")]
    pub is_anomaly: Option<bool>,
}

pub type TransactionDataset = Vec<TransactionRecord>;

impl TransactionRecord {
    /// Looks up a numeric column by its header name.
    pub fn numeric_value(&self, column: &str) -> Option<f64> {
        match column {
            TRANSACTION_AMOUNT => Some(self.transaction_amount),
            AVERAGE_TRANSACTION_AMOUNT => Some(self.average_transaction_amount),
            FREQUENCY_OF_TRANSACTIONS => Some(self.frequency_of_transactions),
            AGE => Some(self.age as f64),
            _ => None,
        }
    }
}

pub fn is_numeric_column(column: &str) -> bool {
    matches!(
        column,
        TRANSACTION_AMOUNT | AVERAGE_TRANSACTION_AMOUNT | FREQUENCY_OF_TRANSACTIONS | AGE
    )
}

/// A row as it appears on disk, before missing values are dealt with.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    #[serde(rename = "Transaction_ID")]
    pub transaction_id: Option<u64>,
    #[serde(rename = "Customer_ID")]
    pub customer_id: Option<u32>,
    #[serde(rename = "Transaction_Amount")]
    pub transaction_amount: Option<f64>,
    #[serde(rename = "Average_Transaction_Amount")]
    pub average_transaction_amount: Option<f64>,
    #[serde(rename = "Frequency_of_Transactions")]
    pub frequency_of_transactions: Option<f64>,
    #[serde(rename = "Age")]
    pub age: Option<u32>,
    #[serde(rename = "Account_Type")]
    pub account_type: Option<AccountType>,
    #[serde(rename = "Day_of_Week")]
    pub day_of_week: Option<DayOfWeek>,
    #[serde(rename = "Is_Anomaly", default, deserialize_with = "deserialize_flag")]
    pub is_anomaly: Option<bool>,
}

impl RawTransaction {
    fn into_record(self) -> Option<TransactionRecord> {
        Some(TransactionRecord {
            transaction_id: self.transaction_id?,
            customer_id: self.customer_id?,
            transaction_amount: self.transaction_amount.filter(|v| v.is_finite())?,
            average_transaction_amount: self.average_transaction_amount.filter(|v| v.is_finite())?,
            frequency_of_transactions: self.frequency_of_transactions.filter(|v| v.is_finite())?,
            age: self.age?,
            account_type: self.account_type?,
            day_of_week: self.day_of_week?,
            is_anomaly: self.is_anomaly,
        })
    }

    fn missing_columns(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.transaction_id.is_none() {
            missing.push(TRANSACTION_ID);
        }
        if self.customer_id.is_none() {
            missing.push(CUSTOMER_ID);
        }
        if !self.transaction_amount.map_or(false, f64::is_finite) {
            missing.push(TRANSACTION_AMOUNT);
        }
        if !self.average_transaction_amount.map_or(false, f64::is_finite) {
            missing.push(AVERAGE_TRANSACTION_AMOUNT);
        }
        if !self.frequency_of_transactions.map_or(false, f64::is_finite) {
            missing.push(FREQUENCY_OF_TRANSACTIONS);
        }
        if self.age.is_none() {
            missing.push(AGE);
        }
        if self.account_type.is_none() {
            missing.push(ACCOUNT_TYPE);
        }
        if self.day_of_week.is_none() {
            missing.push(DAY_OF_WEEK);
        }
        missing
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some("true") | Some("True") | Some("TRUE") | Some("1") => Ok(Some(true)),
        Some("false") | Some("False") | Some("FALSE") | Some("0") => Ok(Some(false)),
        Some(other) => Err(de::Error::custom(format!(
            "invalid {} value '{}'",
            IS_ANOMALY, other
        ))),
    }
}

/// Missing-value counts per required column, plus how many rows were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingValueReport {
    pub per_column: Vec<(&'static str, usize)>,
    pub dropped_rows: usize,
}

impl MissingValueReport {
    pub fn total_missing(&self) -> usize {
        self.per_column.iter().map(|(_, count)| count).sum()
    }
}

pub fn read_transactions<P: AsRef<Path>>(file_path: P) -> Result<Vec<RawTransaction>> {
    let path = file_path.as_ref();
    let file = File::open(path)
        .map_err(|e| AnomalyError::DataLoad(format!("{}: {}", path.display(), e)))?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(file);

    let headers = rdr
        .headers()
        .map_err(|e| AnomalyError::DataLoad(format!("{}: {}", path.display(), e)))?
        .clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(AnomalyError::Schema(column.to_string()));
        }
    }

    let transactions: Vec<RawTransaction> = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<RawTransaction>, csv::Error>>()
        .map_err(|e| AnomalyError::DataLoad(format!("{}: {}", path.display(), e)))?;

    info!(path = %path.display(), rows = transactions.len(), "Loaded transactions");
    Ok(transactions)
}

/// Counts missing values per column and keeps only complete rows.
pub fn clean_transactions(raw: Vec<RawTransaction>) -> (TransactionDataset, MissingValueReport) {
    let mut counts = [0usize; REQUIRED_COLUMNS.len()];
    let mut dropped_rows = 0;
    let mut records = Vec::with_capacity(raw.len());

    for row in raw {
        let missing = row.missing_columns();
        for column in &missing {
            if let Some(idx) = REQUIRED_COLUMNS.iter().position(|c| c == column) {
                counts[idx] += 1;
            }
        }
        match row.into_record() {
            Some(record) => records.push(record),
            None => dropped_rows += 1,
        }
    }

    let report = MissingValueReport {
        per_column: REQUIRED_COLUMNS.iter().copied().zip(counts).collect(),
        dropped_rows,
    };
    for (column, count) in &report.per_column {
        if *count > 0 {
            warn!(column, count, "Missing values");
        }
    }
    if dropped_rows > 0 {
        warn!(dropped_rows, kept = records.len(), "Dropped incomplete rows");
    }

    (records, report)
}

/// Reads and cleans a dataset file in one go.
pub fn load_transactions<P: AsRef<Path>>(file_path: P) -> Result<(TransactionDataset, MissingValueReport)> {
    let raw = read_transactions(file_path)?;
    Ok(clean_transactions(raw))
}

pub fn write_transactions<P: AsRef<Path>>(file_path: P, transactions: &[TransactionRecord]) -> Result<()> {
    let path = file_path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut wtr = csv::Writer::from_path(path)?;
    for tx in transactions {
        wtr.serialize(tx)?;
    }
    wtr.flush()?;

    info!(path = %path.display(), rows = transactions.len(), "Wrote transactions");
    Ok(())
}
