//! Threaded pipeline notifications.
//!
//! Every science file gets one root "Science File" message in the channel;
//! each pipeline event for that file is posted as a reply in its thread.

use crate::alert::{self, AlertType, FileMessage};
use crate::chat::{ChatClient, ChatError};
use crate::correlator;
use crate::delivery::{self, Exhausted, RetryPolicy};
use crate::keys::KeyError;
use crate::metadata::FilenameParser;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("chat request to channel {channel} failed: {source}")]
    Chat {
        channel: String,
        #[source]
        source: ChatError,
    },

    #[error("failed to post to channel {channel} after {attempts} attempts: {source}")]
    Delivery {
        channel: String,
        attempts: u32,
        #[source]
        source: ChatError,
    },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("failed to read manifest {path}: {source}")]
    Manifest {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct Notifier {
    chat: Arc<dyn ChatClient>,
    parser: Arc<dyn FilenameParser>,
    channel: String,
    retry: RetryPolicy,
}

impl Notifier {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        parser: Arc<dyn FilenameParser>,
        channel: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            chat,
            parser,
            channel: channel.into(),
            retry,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Root message id of the thread for `filename`, if one exists
    pub async fn find_thread(&self, filename: &str) -> Result<Option<String>, NotifyError> {
        correlator::find_thread(
            self.chat.as_ref(),
            self.parser.as_ref(),
            &self.channel,
            filename,
        )
        .await
    }

    /// Post one message with the configured retry policy
    pub async fn deliver(
        &self,
        message: &FileMessage,
        alert: Option<AlertType>,
        thread_ts: Option<&str>,
    ) -> Result<(), NotifyError> {
        delivery::deliver(
            self.chat.as_ref(),
            &self.channel,
            message,
            alert,
            thread_ts,
            self.retry,
        )
        .await
        .map_err(|Exhausted { attempts, last_error }| NotifyError::Delivery {
            channel: self.channel.clone(),
            attempts,
            source: last_error,
        })
    }

    /// Report a pipeline event for the file at `path`.
    ///
    /// Opens the file's thread with a root message when none exists yet,
    /// then posts the event into it. Manifests and delete events post
    /// nothing here.
    #[instrument(skip(self), fields(channel = %self.channel))]
    pub async fn notify_pipeline_event(
        &self,
        path: &str,
        alert: Option<AlertType>,
    ) -> Result<(), NotifyError> {
        if alert == Some(AlertType::Delete) {
            debug!("Delete events are not announced");
            return Ok(());
        }
        if alert::is_file_manifest(path) {
            debug!("Manifests are posted standalone, skipping thread");
            return Ok(());
        }

        let mut thread = self.find_thread(path).await?;

        if thread.is_none() {
            let root = FileMessage::Text(alert::science_file_message(path));
            self.deliver(&root, None, None).await?;
            info!("Opened notification thread");

            thread = self.find_thread(path).await?;
            if thread.is_none() {
                warn!("Root message not visible in channel history, posting unthreaded");
            }
        }

        let Some(message) = alert::build_message(path, alert).await? else {
            return Ok(());
        };

        self.deliver(&message, alert, thread.as_deref()).await
    }

    /// Post a manifest file's contents as a standalone message
    #[instrument(skip(self), fields(channel = %self.channel))]
    pub async fn post_manifest(&self, path: &str) -> Result<(), NotifyError> {
        match alert::build_message(path, None).await? {
            Some(message) => self.deliver(&message, None, None).await,
            None => Ok(()),
        }
    }
}
