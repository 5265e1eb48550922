//! Reprocessing requests for files already in an instrument bucket.
//!
//! The processing function is normally triggered by S3 notifications
//! delivered over SNS; a reprocessing request replays that shape for one
//! object.

use crate::config::Environment;
use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client as LambdaClient;
use aws_types::SdkConfig;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

const PROCESSING_FUNCTION: &str = "aws_sdc_processing_lambda_function";

#[derive(Error, Debug)]
pub enum ReprocessError {
    #[error("failed to encode reprocessing payload for s3://{bucket}/{key}: {source}")]
    Payload {
        bucket: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to invoke {function}: {message}")]
    Invoke { function: String, message: String },
}

/// Name of the processing function in `environment`
pub fn processing_function_name(environment: Environment) -> String {
    environment.prefixed(PROCESSING_FUNCTION)
}

/// SNS-wrapped S3 event for a single object
pub fn reprocess_payload(bucket: &str, key: &str) -> Result<Vec<u8>, ReprocessError> {
    let encode_error = |source| ReprocessError::Payload {
        bucket: bucket.to_string(),
        key: key.to_string(),
        source,
    };

    let s3_event = json!({
        "Records": [{
            "s3": {
                "bucket": {"name": bucket},
                "object": {"key": key}
            }
        }]
    });
    let message = serde_json::to_string(&s3_event).map_err(encode_error)?;

    serde_json::to_vec(&json!({
        "Records": [{
            "Sns": {"Message": message}
        }]
    }))
    .map_err(encode_error)
}

/// Asynchronous function invocation capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    /// Queue one invocation without waiting for its result
    async fn invoke_event(&self, function: &str, payload: Vec<u8>) -> Result<(), ReprocessError>;
}

/// [`FunctionInvoker`] backed by AWS Lambda
pub struct LambdaInvoker {
    client: LambdaClient,
}

impl LambdaInvoker {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: LambdaClient::new(sdk_config),
        }
    }
}

#[async_trait]
impl FunctionInvoker for LambdaInvoker {
    #[instrument(skip(self, payload), fields(size_bytes = payload.len()))]
    async fn invoke_event(&self, function: &str, payload: Vec<u8>) -> Result<(), ReprocessError> {
        self.client
            .invoke()
            .function_name(function)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| ReprocessError::Invoke {
                function: function.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }
}

/// Sends reprocessing requests to the environment's processing function
pub struct Reprocessor {
    invoker: Arc<dyn FunctionInvoker>,
    function: String,
}

impl Reprocessor {
    pub fn new(invoker: Arc<dyn FunctionInvoker>, environment: Environment) -> Self {
        Self {
            invoker,
            function: processing_function_name(environment),
        }
    }

    #[instrument(skip(self), fields(function = %self.function))]
    pub async fn request(&self, bucket: &str, key: &str) -> Result<(), ReprocessError> {
        let payload = reprocess_payload(bucket, key)?;
        self.invoker.invoke_event(&self.function, payload).await?;

        metrics::counter!("sdc.reprocess.requests").increment(1);
        info!(bucket, key, "Reprocessing requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_function_name_per_environment() {
        assert_eq!(
            processing_function_name(Environment::Development),
            "dev-aws_sdc_processing_lambda_function"
        );
        assert_eq!(
            processing_function_name(Environment::Production),
            "aws_sdc_processing_lambda_function"
        );
    }

    #[test]
    fn test_payload_wraps_s3_event_in_sns_message() {
        let payload = reprocess_payload("swx-soc-eea", "l1/2023/02/f.cdf").unwrap();
        let outer: Value = serde_json::from_slice(&payload).unwrap();

        let message = outer["Records"][0]["Sns"]["Message"].as_str().unwrap();
        let inner: Value = serde_json::from_str(message).unwrap();

        assert_eq!(inner["Records"][0]["s3"]["bucket"]["name"], "swx-soc-eea");
        assert_eq!(inner["Records"][0]["s3"]["object"]["key"], "l1/2023/02/f.cdf");
    }

    #[tokio::test]
    async fn test_request_invokes_environment_function() {
        let mut invoker = MockFunctionInvoker::new();
        invoker
            .expect_invoke_event()
            .withf(|function, payload| {
                function == "dev-aws_sdc_processing_lambda_function" && !payload.is_empty()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        Reprocessor::new(Arc::new(invoker), Environment::Development)
            .request("b", "k")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invoke_failure_is_surfaced() {
        let mut invoker = MockFunctionInvoker::new();
        invoker.expect_invoke_event().returning(|function, _| {
            Err(ReprocessError::Invoke {
                function: function.to_string(),
                message: "AccessDenied".to_string(),
            })
        });

        let err = Reprocessor::new(Arc::new(invoker), Environment::Production)
            .request("b", "k")
            .await
            .unwrap_err();

        assert!(matches!(err, ReprocessError::Invoke { .. }));
    }
}
