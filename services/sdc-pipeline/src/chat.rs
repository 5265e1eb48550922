//! Chat capability and message shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by a chat backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Transport(String),

    #[error("chat API returned error: {0}")]
    Api(String),
}

/// Text object inside a section block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockText {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

/// Layout block; only markdown sections are used
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: BlockText,
}

impl Block {
    pub fn markdown_section(text: impl Into<String>) -> Self {
        Self {
            kind: "section",
            text: BlockText {
                kind: "mrkdwn",
                text: text.into(),
            },
        }
    }
}

/// Colour-coded attachment rendered below a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub color: String,
    pub blocks: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

/// A message ready to be posted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostMessage {
    pub channel: String,
    pub text: String,
    pub pretext: String,
    pub attachments: Vec<Attachment>,
    /// Parent message timestamp when posting into a thread
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

/// A message read back from channel history
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryMessage {
    #[serde(default)]
    pub text: Option<String>,
    pub ts: String,
}

/// Chat capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn post_message(&self, message: &PostMessage) -> Result<(), ChatError>;

    async fn channel_history(&self, channel: &str) -> Result<Vec<HistoryMessage>, ChatError>;
}
