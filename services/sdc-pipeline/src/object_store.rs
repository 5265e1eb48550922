use crate::keys::file_name_of;
use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors surfaced by object store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object {key} not found in bucket {bucket}")]
    NotFound { bucket: String, key: String },

    #[error("local file {} does not exist", .path.display())]
    LocalFileMissing { path: PathBuf },

    #[error("{operation} failed for s3://{bucket}/{key}: {message}")]
    Transport {
        operation: &'static str,
        bucket: String,
        key: String,
        message: String,
    },

    #[error("local I/O on {} failed: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

/// One page of a bucket listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Token for the next page, absent on the last page
    pub next_token: Option<String>,
}

/// Raw object store capability, keyed by bucket and key.
///
/// `head`, `get` and `copy` report a missing object as
/// [`StoreError::NotFound`]; everything else is a transport failure.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError>;

    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StoreError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, StoreError>;
}

/// Bucket scoped file operations on top of an [`ObjectStore`].
///
/// Local files live in a staging directory and are addressed by name only,
/// so the same name always maps to the same local path.
pub struct ObjectGateway {
    store: Arc<dyn ObjectStore>,
    staging_dir: PathBuf,
}

impl ObjectGateway {
    pub fn new(store: Arc<dyn ObjectStore>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            staging_dir: staging_dir.into(),
        }
    }

    /// Local path used for `local_name`
    pub fn staging_path(&self, local_name: &str) -> PathBuf {
        self.staging_dir.join(file_name_of(local_name))
    }

    /// Check if an object exists. A missing object is `Ok(false)`.
    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        match self.store.head(bucket, key).await {
            Ok(()) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lazily enumerate every key in `bucket`, following pagination until
    /// the store reports no further pages. Order is whatever the store returns.
    pub fn list_keys<'a>(
        &'a self,
        bucket: &'a str,
    ) -> impl Stream<Item = Result<String, StoreError>> + 'a {
        // Outer None: done. Inner None: first page.
        let pages = stream::try_unfold(Some(None), move |cursor: Option<Option<String>>| async move {
            let Some(token) = cursor else {
                return Ok::<_, StoreError>(None);
            };
            let page = self.store.list_page(bucket, token).await?;
            debug!(bucket, keys = page.keys.len(), "Listed page");
            Ok(Some((page.keys, page.next_token.map(Some))))
        });

        pages
            .map_ok(|keys| stream::iter(keys.into_iter().map(Ok::<_, StoreError>)))
            .try_flatten()
    }

    /// Fetch `remote_key` into the staging directory as `local_name`
    #[instrument(skip(self))]
    pub async fn download(
        &self,
        bucket: &str,
        remote_key: &str,
        local_name: &str,
    ) -> Result<PathBuf, StoreError> {
        info!(bucket, key = remote_key, "Downloading file");

        let body = self.store.get(bucket, remote_key).await?;
        let path = self.staging_path(local_name);
        tokio::fs::write(&path, &body)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        metrics::counter!("sdc.files.downloaded").increment(1);
        debug!(path = %path.display(), size_bytes = body.len(), "File downloaded");
        Ok(path)
    }

    /// Upload the staged file `local_name` to `bucket` under `remote_key`
    #[instrument(skip(self))]
    pub async fn upload(
        &self,
        local_name: &str,
        bucket: &str,
        remote_key: &str,
    ) -> Result<PathBuf, StoreError> {
        info!(bucket, key = remote_key, "Uploading file");

        let path = self.staging_path(local_name);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::LocalFileMissing { path });
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let size_bytes = body.len();

        self.store.put(bucket, remote_key, body).await?;

        metrics::counter!("sdc.files.uploaded").increment(1);
        metrics::counter!("sdc.bytes.uploaded").increment(size_bytes as u64);
        debug!(key = remote_key, size_bytes, "File uploaded");
        Ok(path)
    }

    /// Server side copy, optionally removing the source afterwards.
    ///
    /// The source is deleted only once the copy has succeeded.
    #[instrument(skip(self))]
    pub async fn copy(
        &self,
        source_bucket: &str,
        dest_bucket: &str,
        key: &str,
        new_key: &str,
        delete_source: bool,
    ) -> Result<(), StoreError> {
        self.store
            .copy(source_bucket, key, dest_bucket, new_key)
            .await?;

        if delete_source {
            self.store.delete(source_bucket, key).await?;
            metrics::counter!("sdc.files.moved").increment(1);
        } else {
            metrics::counter!("sdc.files.copied").increment(1);
        }

        info!(
            source = %format!("{source_bucket}/{key}"),
            destination = %format!("{dest_bucket}/{new_key}"),
            delete_source,
            "Object copied"
        );
        Ok(())
    }

    /// True on the first bucket, in the given order, that holds `key`
    pub async fn check_existence_across<S: AsRef<str>>(
        &self,
        buckets: &[S],
        key: &str,
    ) -> Result<bool, StoreError> {
        for bucket in buckets {
            let bucket = bucket.as_ref();
            if self.exists(bucket, key).await? {
                info!(bucket, key, "File exists in target bucket");
                return Ok(true);
            }
            debug!(bucket, key, "File does not exist in target bucket");
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryStore, StoreCall};
    use futures::TryStreamExt;

    fn gateway(store: &Arc<InMemoryStore>, dir: &tempfile::TempDir) -> ObjectGateway {
        ObjectGateway::new(store.clone(), dir.path())
    }

    #[tokio::test]
    async fn test_exists_maps_not_found_to_false() {
        let store = Arc::new(InMemoryStore::new().with_object("b", "k", b"data"));
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway(&store, &dir);

        assert!(gateway.exists("b", "k").await.unwrap());
        assert!(!gateway.exists("b", "missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_propagates_transport_errors() {
        let store = Arc::new(InMemoryStore::new().failing_bucket("broken"));
        let dir = tempfile::tempdir().unwrap();

        let err = gateway(&store, &dir).exists("broken", "k").await.unwrap_err();
        assert!(matches!(err, StoreError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_list_keys_exhausts_all_pages() {
        let mut store = InMemoryStore::new().with_page_size(2);
        for i in 0..5 {
            store = store.with_object("b", &format!("key-{i}"), b"x");
        }
        let store = Arc::new(store);
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway(&store, &dir);

        let mut keys: Vec<String> = gateway.list_keys("b").try_collect().await.unwrap();
        keys.sort();

        assert_eq!(keys, ["key-0", "key-1", "key-2", "key-3", "key-4"]);
        let pages = store
            .calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::ListPage { .. }))
            .count();
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn test_download_writes_to_staging_path() {
        let store = Arc::new(InMemoryStore::new().with_object("b", "l0/2023/02/f.bin", b"payload"));
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway(&store, &dir);

        let path = gateway.download("b", "l0/2023/02/f.bin", "f.bin").await.unwrap();

        assert_eq!(path, dir.path().join("f.bin"));
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_download_missing_key_creates_no_file() {
        let store = Arc::new(InMemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway(&store, &dir);

        let err = gateway.download("b", "missing", "f.bin").await.unwrap_err();

        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!dir.path().join("f.bin").exists());
    }

    #[tokio::test]
    async fn test_upload_reads_staged_file() {
        let store = Arc::new(InMemoryStore::new().with_bucket("dest"));
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.bin"), b"staged").unwrap();
        let gateway = gateway(&store, &dir);

        let path = gateway.upload("f.bin", "dest", "l0/2023/02/f.bin").await.unwrap();

        assert_eq!(path, dir.path().join("f.bin"));
        assert_eq!(store.object("dest", "l0/2023/02/f.bin").unwrap(), b"staged");
    }

    #[tokio::test]
    async fn test_upload_missing_local_file() {
        let store = Arc::new(InMemoryStore::new().with_bucket("dest"));
        let dir = tempfile::tempdir().unwrap();

        let err = gateway(&store, &dir)
            .upload("absent.bin", "dest", "k")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::LocalFileMissing { .. }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upload_to_unknown_bucket_is_a_store_error() {
        let store = Arc::new(InMemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.bin"), b"staged").unwrap();

        let err = gateway(&store, &dir)
            .upload("f.bin", "bad-bucket", "k")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_copy_with_delete_moves_object() {
        let store = Arc::new(
            InMemoryStore::new()
                .with_object("src", "test_file.txt", b"test data")
                .with_bucket("dest"),
        );
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway(&store, &dir);

        gateway
            .copy("src", "dest", "test_file.txt", "new_test_file.txt", true)
            .await
            .unwrap();

        assert_eq!(store.object("dest", "new_test_file.txt").unwrap(), b"test data");
        assert!(store.object("src", "test_file.txt").is_none());
    }

    #[tokio::test]
    async fn test_copy_without_delete_keeps_source() {
        let store = Arc::new(
            InMemoryStore::new()
                .with_object("src", "test_file.txt", b"test data")
                .with_bucket("dest"),
        );
        let dir = tempfile::tempdir().unwrap();

        gateway(&store, &dir)
            .copy("src", "dest", "test_file.txt", "another.txt", false)
            .await
            .unwrap();

        assert!(store.object("dest", "another.txt").is_some());
        assert!(store.object("src", "test_file.txt").is_some());
    }

    #[tokio::test]
    async fn test_failed_copy_never_deletes_source() {
        let store = Arc::new(
            InMemoryStore::new()
                .with_object("src", "k", b"precious")
                .failing_bucket("dest"),
        );
        let dir = tempfile::tempdir().unwrap();

        let result = gateway(&store, &dir).copy("src", "dest", "k", "k2", true).await;

        assert!(result.is_err());
        assert_eq!(store.object("src", "k").unwrap(), b"precious");
        assert!(!store
            .calls()
            .iter()
            .any(|c| matches!(c, StoreCall::Delete { .. })));
    }

    #[tokio::test]
    async fn test_copy_missing_source_is_not_found() {
        let store = Arc::new(InMemoryStore::new().with_bucket("src").with_bucket("dest"));
        let dir = tempfile::tempdir().unwrap();

        let err = gateway(&store, &dir)
            .copy("src", "dest", "non_existent_key", "new", true)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_check_existence_across_buckets_in_order() {
        let store = Arc::new(
            InMemoryStore::new()
                .with_bucket("b1")
                .with_object("b2", "k", b"x")
                .with_object("b3", "k", b"x"),
        );
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway(&store, &dir);

        assert!(gateway
            .check_existence_across(&["b1", "b2", "b3"], "k")
            .await
            .unwrap());
        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Head {
                    bucket: "b1".into(),
                    key: "k".into()
                },
                StoreCall::Head {
                    bucket: "b2".into(),
                    key: "k".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_check_existence_across_no_match() {
        let store = Arc::new(InMemoryStore::new().with_bucket("b1"));
        let dir = tempfile::tempdir().unwrap();

        let found = gateway(&store, &dir)
            .check_existence_across(&["b1".to_string()], "k")
            .await
            .unwrap();
        assert!(!found);
    }
}
