use crate::config::S3Config;
use crate::object_store::{ListPage, ObjectStore, StoreError};
use async_trait::async_trait;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_types::SdkConfig;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{debug, info, instrument};

/// [`ObjectStore`] backed by Amazon S3 (or any S3 compatible endpoint)
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a store from shared AWS configuration
    pub fn new(sdk_config: &SdkConfig, config: &S3Config) -> Self {
        let mut s3_config_builder = S3ConfigBuilder::from(sdk_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            endpoint = config.endpoint_url.as_deref().unwrap_or("default"),
            "S3 object store initialized"
        );

        Self { client }
    }

}

/// Characters left as-is in a `CopySource` key; everything else is escaped
const COPY_SOURCE_KEY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn copy_source(bucket: &str, key: &str) -> String {
    format!("{bucket}/{}", utf8_percent_encode(key, COPY_SOURCE_KEY))
}

fn transport<E>(operation: &'static str, bucket: &str, key: &str, err: E) -> StoreError
where
    E: std::error::Error,
{
    StoreError::Transport {
        operation,
        bucket: bucket.to_string(),
        key: key.to_string(),
        message: DisplayErrorContext(&err).to_string(),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn head(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Err(StoreError::not_found(bucket, key))
                } else {
                    Err(transport("head_object", bucket, key, e))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(e) => {
                return if e.as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    Err(StoreError::not_found(bucket, key))
                } else {
                    Err(transport("get_object", bucket, key, e))
                };
            }
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| transport("get_object", bucket, key, e))?;

        Ok(body.into_bytes().to_vec())
    }

    #[instrument(skip(self, body), fields(size_bytes = body.len()))]
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| transport("put_object", bucket, key, e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StoreError> {
        let result = self
            .client
            .copy_object()
            .copy_source(copy_source(source_bucket, source_key))
            .bucket(dest_bucket)
            .key(dest_key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.as_service_error().and_then(|e| e.code()) == Some("NoSuchKey") {
                    Err(StoreError::not_found(source_bucket, source_key))
                } else {
                    Err(transport("copy_object", dest_bucket, dest_key, e))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| transport("delete_object", bucket, key, e))?;

        debug!(bucket, key, "Object deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, StoreError> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| transport("list_objects_v2", bucket, "", e))?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(String::from))
            .collect();

        Ok(ListPage {
            keys,
            next_token: response.next_continuation_token().map(String::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_source_plain_key() {
        assert_eq!(
            copy_source("swx-soc-incoming", "l1/2023/02/swx_soc_eea_l1_20230205T000006_v1.0.0.cdf"),
            "swx-soc-incoming/l1/2023/02/swx_soc_eea_l1_20230205T000006_v1.0.0.cdf"
        );
    }

    #[test]
    fn test_copy_source_escapes_reserved_characters() {
        assert_eq!(
            copy_source("incoming", "raw/a b+c\u{e9}.bin"),
            "incoming/raw/a%20b%2Bc%C3%A9.bin"
        );
    }
}
