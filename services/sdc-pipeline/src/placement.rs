use crate::keys::{derive_key, KeyError, KeyLayout, StorageKey};
use crate::metadata::FilenameParser;
use crate::object_store::{ObjectGateway, StoreError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

/// Errors from fetching or placing a science file
#[derive(Error, Debug)]
pub enum PlacementError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Deployment switches deciding whether bytes move at all
#[derive(Debug, Clone, Default)]
pub struct TransferContext {
    /// Test data is supplied locally; the store is never touched
    pub use_fixture_data: bool,
    /// Data is already mounted at this path; the store is never touched
    pub local_file_path: Option<PathBuf>,
}

/// Decides whether a transfer happens and performs it through the gateway.
///
/// Key computation never depends on the mode, so a dry run reports exactly
/// where a file would have gone.
pub struct Placement {
    gateway: Arc<ObjectGateway>,
    context: TransferContext,
    layout: KeyLayout,
}

impl Placement {
    pub fn new(gateway: Arc<ObjectGateway>, context: TransferContext, layout: KeyLayout) -> Self {
        Self {
            gateway,
            context,
            layout,
        }
    }

    /// Whether a non dry-run call would actually move bytes
    pub fn transfers(&self, dry_run: bool) -> bool {
        !dry_run && !self.context.use_fixture_data && self.context.local_file_path.is_none()
    }

    /// Fetch `remote_key` for local processing.
    ///
    /// Returns `None` when nothing was fetched (dry run or fixture data) and
    /// the override path when one is configured.
    #[instrument(skip(self))]
    pub async fn acquire(
        &self,
        bucket: &str,
        remote_key: &str,
        local_name: &str,
        dry_run: bool,
    ) -> Result<Option<PathBuf>, PlacementError> {
        if dry_run {
            info!("Dry Run - File will not be downloaded");
            return Ok(None);
        }

        if self.context.use_fixture_data {
            info!("Using fixture data - File will not be downloaded");
            return Ok(None);
        }

        if let Some(ref path) = self.context.local_file_path {
            info!(path = %path.display(), "Using configured local file path");
            return Ok(Some(path.clone()));
        }

        if !self.gateway.exists(bucket, remote_key).await? {
            return Err(StoreError::not_found(bucket, remote_key).into());
        }

        let path = self.gateway.download(bucket, remote_key, local_name).await?;
        Ok(Some(path))
    }

    /// Compute the destination key for `local_filename` and upload it there
    /// unless the mode says the bytes must stay put.
    #[instrument(skip(self, parser))]
    pub async fn place(
        &self,
        parser: &dyn FilenameParser,
        dest_bucket: &str,
        local_filename: &str,
        dry_run: bool,
    ) -> Result<StorageKey, PlacementError> {
        let key = derive_key(parser, local_filename, self.layout)?;

        if dry_run {
            info!(key = %key, "Dry Run - File will not be uploaded");
            return Ok(key);
        }

        if self.context.use_fixture_data {
            info!(key = %key, "Using fixture data - File will not be uploaded");
            return Ok(key);
        }

        if self.context.local_file_path.is_some() {
            info!(
                key = %key,
                file = local_filename,
                "File processed locally - File will not be uploaded, available in mounted volume"
            );
            return Ok(key);
        }

        self.gateway
            .upload(local_filename, dest_bucket, &key.as_path())
            .await?;

        Ok(key)
    }

    /// Move an incoming object to its derived key in `dest_bucket`, or copy
    /// it when `keep_source` is set. Skipped under the same modes as
    /// [`Placement::place`].
    #[instrument(skip(self, parser))]
    pub async fn sort(
        &self,
        parser: &dyn FilenameParser,
        source_bucket: &str,
        dest_bucket: &str,
        remote_key: &str,
        keep_source: bool,
        dry_run: bool,
    ) -> Result<StorageKey, PlacementError> {
        let key = derive_key(parser, remote_key, self.layout)?;

        if !self.transfers(dry_run) {
            info!(key = %key, "File will not be sorted");
            return Ok(key);
        }

        self.gateway
            .copy(source_bucket, dest_bucket, remote_key, &key.as_path(), !keep_source)
            .await?;

        Ok(key)
    }
}
