use crate::config::Environment;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Value written for dimensions that do not apply to an event
pub const NOT_APPLICABLE: &str = "N/A";

const MEASURE_NAME: &str = "timestamp";

/// Errors from writing the pipeline event ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger event for {file_key} needs a source or destination bucket")]
    Validation { file_key: String },

    #[error("failed to connect to metrics store: {0}")]
    Connect(String),

    #[error("failed to write {file_key} to {database}.{table}: {message}")]
    Write {
        database: String,
        table: String,
        file_key: String,
        message: String,
    },
}

/// Kind of pipeline action being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineAction {
    Upload,
    Copy,
    Move,
    Download,
}

impl PipelineAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineAction::Upload => "UPLOAD",
            PipelineAction::Copy => "COPY",
            PipelineAction::Move => "MOVE",
            PipelineAction::Download => "DOWNLOAD",
        }
    }
}

impl fmt::Display for PipelineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pipeline action, written once to the ledger
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub action: PipelineAction,
    pub file_key: String,
    pub new_file_key: Option<String>,
    pub source_bucket: Option<String>,
    pub destination_bucket: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(action: PipelineAction, file_key: impl Into<String>) -> Self {
        Self {
            action,
            file_key: file_key.into(),
            new_file_key: None,
            source_bucket: None,
            destination_bucket: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_new_file_key(mut self, key: impl Into<String>) -> Self {
        self.new_file_key = Some(key.into());
        self
    }

    pub fn with_source_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.source_bucket = Some(bucket.into());
        self
    }

    pub fn with_destination_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.destination_bucket = Some(bucket.into());
        self
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if present(&self.source_bucket).is_none() && present(&self.destination_bucket).is_none() {
            return Err(LedgerError::Validation {
                file_key: self.file_key.clone(),
            });
        }
        Ok(())
    }

    /// Fixed-width dimension set; absent values become [`NOT_APPLICABLE`]
    fn dimensions(&self) -> Vec<(String, String)> {
        let or_na = |value: &Option<String>| present(value).unwrap_or(NOT_APPLICABLE).to_string();

        vec![
            ("action_type".to_string(), self.action.as_str().to_string()),
            ("source_bucket".to_string(), or_na(&self.source_bucket)),
            (
                "destination_bucket".to_string(),
                or_na(&self.destination_bucket),
            ),
            ("file_key".to_string(), self.file_key.clone()),
            ("new_file_key".to_string(), or_na(&self.new_file_key)),
        ]
    }
}

/// Empty strings count as absent
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// A record as handed to the metrics store
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    /// Record time, wall clock milliseconds since the epoch
    pub time_ms: i64,
    pub dimensions: Vec<(String, String)>,
    pub measure_name: String,
    /// Event time in fractional seconds since the epoch
    pub measure_value: f64,
}

/// Metrics store capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn write_record(
        &self,
        database: &str,
        table: &str,
        record: LedgerRecord,
    ) -> Result<(), LedgerError>;
}

/// Database and table the ledger writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTarget {
    pub database: String,
    pub table: String,
}

impl LedgerTarget {
    /// Derive names from the mission. The `hermes` mission and an
    /// unset mission use the unqualified names.
    pub fn for_mission(mission: Option<&str>, environment: Environment) -> Self {
        let (database, table) = match mission {
            None | Some("") | Some("hermes") => (
                "sdc_aws_logs".to_string(),
                "sdc_aws_s3_bucket_log_table".to_string(),
            ),
            Some(mission) => (
                format!("{mission}_sdc_aws_logs"),
                format!("{mission}_sdc_aws_s3_bucket_log_table"),
            ),
        };

        Self {
            database: environment.prefixed(&database),
            table: environment.prefixed(&table),
        }
    }
}

/// Append-only audit trail of pipeline actions
pub struct EventLedger {
    sink: Arc<dyn MetricsSink>,
    target: LedgerTarget,
}

impl EventLedger {
    pub fn new(sink: Arc<dyn MetricsSink>, target: LedgerTarget) -> Self {
        Self { sink, target }
    }

    /// Write one record for `event`. Failures are returned to the caller.
    #[instrument(skip(self, event), fields(action = %event.action, file_key = %event.file_key))]
    pub async fn record(&self, event: &PipelineEvent) -> Result<(), LedgerError> {
        event.validate()?;

        let record = LedgerRecord {
            time_ms: Utc::now().timestamp_millis(),
            dimensions: event.dimensions(),
            measure_name: MEASURE_NAME.to_string(),
            measure_value: event.timestamp.timestamp_micros() as f64 / 1_000_000.0,
        };

        self.sink
            .write_record(&self.target.database, &self.target.table, record)
            .await?;

        metrics::counter!("sdc.ledger.records").increment(1);
        debug!(database = %self.target.database, "Pipeline event logged");
        Ok(())
    }
}
