//! # Data Loading and Validation Module
//!
//! Entry point for customer data. Per-customer aggregates arrive as
//! [`CustomerMetrics`] records, either from an upstream repository layer or
//! from a tab-separated file, and are turned into validated
//! [`TrainingSample`]s in the canonical predictor order.
//!
//! - Strict Schema: Column names are not configurable. A metrics file must
//!   carry `subject_id`, `recency`, `frequency`, `monetary`, `age`,
//!   `session_count`, `avg_session_duration`, `churned` and `tenure_days`.
//! - User-Centric Errors: Failures are assumed to be user-input errors and
//!   `DataError` names the offending row and column.

use crate::error::SurvivalError;
use crate::predictor::FeatureVector;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Opaque customer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Per-customer aggregates supplied by the metrics layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerMetrics {
    pub subject_id: SubjectId,
    /// Days since the last purchase.
    pub recency: i64,
    /// Number of purchases in the observation window.
    pub frequency: i64,
    pub monetary: f64,
    pub age: i64,
    pub session_count: f64,
    pub avg_session_duration: f64,
    #[serde(deserialize_with = "deserialize_flag")]
    pub churned: bool,
    /// Observed tenure in days: time to churn, or time to censoring.
    #[serde(rename = "tenure_days")]
    pub approximate_tenure_days: f64,
}

impl CustomerMetrics {
    /// Predictor values in canonical order.
    pub fn features(&self) -> FeatureVector {
        FeatureVector::new([
            self.recency as f64,
            self.frequency as f64,
            self.monetary,
            self.age as f64,
            self.session_count,
            self.avg_session_duration,
        ])
    }

    /// Builds the training sample for this customer.
    pub fn to_training_sample(&self) -> Result<TrainingSample, SurvivalError> {
        TrainingSample::new(
            self.features(),
            self.approximate_tenure_days,
            self.churned,
        )
    }
}

/// One customer's contribution to a fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSample {
    features: FeatureVector,
    time_to_event: f64,
    event_occurred: bool,
}

impl TrainingSample {
    pub fn new(
        features: FeatureVector,
        time_to_event: f64,
        event_occurred: bool,
    ) -> Result<Self, SurvivalError> {
        if !features.is_finite() {
            return Err(SurvivalError::NonFiniteInput { field: "features" });
        }
        if !time_to_event.is_finite() {
            return Err(SurvivalError::NonFiniteInput {
                field: "time_to_event",
            });
        }
        if time_to_event < 0.0 {
            return Err(SurvivalError::insufficient(format!(
                "time to event must be non-negative, got {time_to_event}"
            )));
        }
        Ok(Self {
            features,
            time_to_event,
            event_occurred,
        })
    }

    #[inline]
    pub fn features(&self) -> &FeatureVector {
        &self.features
    }

    #[inline]
    pub fn time_to_event(&self) -> f64 {
        self.time_to_event
    }

    #[inline]
    pub fn event_occurred(&self) -> bool {
        self.event_occurred
    }
}

/// Converts a batch of metrics records into training samples.
pub fn build_training_samples(
    records: &[CustomerMetrics],
) -> Result<Vec<TrainingSample>, SurvivalError> {
    records.iter().map(|r| r.to_training_sample()).collect()
}

/// A comprehensive error type for metrics file loading.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse metrics row {row}: {source}")]
    ParseError {
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to read the metrics header: {0}")]
    HeaderError(#[source] csv::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error("Row {row} is invalid: {source}")]
    InvalidRow {
        row: usize,
        #[source]
        source: SurvivalError,
    },
    #[error("The input file contains no data rows.")]
    Empty,
}

pub const REQUIRED_COLUMNS: [&str; 9] = [
    "subject_id",
    "recency",
    "frequency",
    "monetary",
    "age",
    "session_count",
    "avg_session_duration",
    "churned",
    "tenure_days",
];

/// Loads and validates a tab-separated metrics file.
pub fn load_metrics(path: impl AsRef<Path>) -> Result<Vec<CustomerMetrics>, DataError> {
    let file = File::open(path.as_ref())?;
    read_metrics(file)
}

/// Reads tab-separated metrics from any reader.
pub fn read_metrics<R: Read>(reader: R) -> Result<Vec<CustomerMetrics>, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers().map_err(DataError::HeaderError)?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(DataError::ColumnNotFound(column.to_string()));
        }
    }

    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<CustomerMetrics>().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let record = row.map_err(|source| DataError::ParseError { row: line, source })?;
        record
            .to_training_sample()
            .map_err(|source| DataError::InvalidRow { row: line, source })?;
        records.push(record);
    }

    if records.is_empty() {
        return Err(DataError::Empty);
    }
    log::info!("Loaded {} customer metrics records", records.len());
    Ok(records)
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected a churn flag (0/1/true/false), got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::Predictor;
    use approx::assert_abs_diff_eq;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    const HEADER: &str = "subject_id\trecency\tfrequency\tmonetary\tage\tsession_count\tavg_session_duration\tchurned\ttenure_days";

    fn create_test_tsv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn test_load_metrics_success() {
        let content = format!(
            "{HEADER}\ncust-1\t12\t4\t250.5\t34\t18\t3.5\t1\t40\ncust-2\t2\t9\t900\t51\t40\t6.25\tfalse\t365"
        );
        let file = create_test_tsv(&content).unwrap();
        let records = load_metrics(file.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].subject_id.as_str(), "cust-1");
        assert!(records[0].churned);
        assert!(!records[1].churned);
        assert_abs_diff_eq!(records[1].approximate_tenure_days, 365.0, epsilon = 1e-12);

        let features = records[0].features();
        assert_abs_diff_eq!(features.get(Predictor::Recency), 12.0, epsilon = 1e-12);
        assert_abs_diff_eq!(features.get(Predictor::Monetary), 250.5, epsilon = 1e-12);
        assert_abs_diff_eq!(
            features.get(Predictor::AvgSessionDuration),
            3.5,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_missing_column_is_reported() {
        let header = HEADER.replace("\ttenure_days", "");
        let content = format!("{header}\ncust-1\t12\t4\t250.5\t34\t18\t3.5\t1");
        let file = create_test_tsv(&content).unwrap();
        match load_metrics(file.path()).unwrap_err() {
            DataError::ColumnNotFound(col) => assert_eq!(col, "tenure_days"),
            other => panic!("Expected ColumnNotFound(tenure_days), got {:?}", other),
        }
    }

    #[test]
    fn test_bad_churn_flag_names_the_row() {
        let content = format!("{HEADER}\ncust-1\t12\t4\t250.5\t34\t18\t3.5\tmaybe\t40");
        let file = create_test_tsv(&content).unwrap();
        match load_metrics(file.path()).unwrap_err() {
            DataError::ParseError { row, .. } => assert_eq!(row, 2),
            other => panic!("Expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_tenure_is_rejected() {
        let content = format!("{HEADER}\ncust-1\t12\t4\t250.5\t34\t18\t3.5\t1\t-3");
        let file = create_test_tsv(&content).unwrap();
        match load_metrics(file.path()).unwrap_err() {
            DataError::InvalidRow { row, source } => {
                assert_eq!(row, 2);
                assert!(matches!(source, SurvivalError::InsufficientData { .. }));
            }
            other => panic!("Expected InvalidRow, got {:?}", other),
        }
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let file = create_test_tsv(HEADER).unwrap();
        assert!(matches!(
            load_metrics(file.path()).unwrap_err(),
            DataError::Empty
        ));
    }

    #[test]
    fn test_non_finite_features_rejected() {
        let features = FeatureVector::new([1.0, f64::NAN, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(
            TrainingSample::new(features, 10.0, true).unwrap_err(),
            SurvivalError::NonFiniteInput { field: "features" }
        );
    }
}
