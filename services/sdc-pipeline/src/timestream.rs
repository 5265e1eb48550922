use crate::ledger::{LedgerError, LedgerRecord, MetricsSink};
use async_trait::async_trait;
use aws_sdk_timestreamwrite::error::DisplayErrorContext;
use aws_sdk_timestreamwrite::types::{Dimension, MeasureValueType, Record};
use aws_sdk_timestreamwrite::Client as TimestreamClient;
use aws_types::SdkConfig;
use tracing::{info, instrument};

/// [`MetricsSink`] writing to Amazon Timestream
pub struct TimestreamSink {
    client: TimestreamClient,
}

impl TimestreamSink {
    /// Create a sink with endpoint discovery enabled, as Timestream requires.
    /// The endpoint refresh task runs on the current tokio runtime.
    pub async fn new(sdk_config: &SdkConfig) -> Result<Self, LedgerError> {
        let (client, reload) = TimestreamClient::new(sdk_config)
            .with_endpoint_discovery_enabled()
            .await
            .map_err(|e| LedgerError::Connect(e.to_string()))?;
        tokio::spawn(reload.reload_task());

        info!("Timestream sink initialized");
        Ok(Self { client })
    }
}

#[async_trait]
impl MetricsSink for TimestreamSink {
    #[instrument(skip(self, record))]
    async fn write_record(
        &self,
        database: &str,
        table: &str,
        record: LedgerRecord,
    ) -> Result<(), LedgerError> {
        let file_key = record
            .dimensions
            .iter()
            .find(|(name, _)| name == "file_key")
            .map(|(_, value)| value.clone())
            .unwrap_or_default();
        let write_error = |message: String| LedgerError::Write {
            database: database.to_string(),
            table: table.to_string(),
            file_key: file_key.clone(),
            message,
        };

        let dimensions = record
            .dimensions
            .into_iter()
            .map(|(name, value)| Dimension::builder().name(name).value(value).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| write_error(e.to_string()))?;

        let record = Record::builder()
            .time(record.time_ms.to_string())
            .set_dimensions(Some(dimensions))
            .measure_name(record.measure_name)
            .measure_value(record.measure_value.to_string())
            .measure_value_type(MeasureValueType::Double)
            .build();

        self.client
            .write_records()
            .database_name(database)
            .table_name(table)
            .records(record)
            .send()
            .await
            .map_err(|e| write_error(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }
}
