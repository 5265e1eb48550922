use crate::chat::{ChatClient, ChatError, HistoryMessage, PostMessage};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Envelope every Slack Web API response shares
#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

impl SlackResponse {
    fn into_result(self) -> Result<Self, ChatError> {
        if self.ok {
            Ok(self)
        } else {
            Err(ChatError::Api(
                self.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

/// [`ChatClient`] over the Slack Web API
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    api_url: String,
}

impl SlackClient {
    pub fn new(token: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn read(response: reqwest::Response) -> Result<SlackResponse, ChatError> {
        let response = response
            .error_for_status()
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        response
            .json::<SlackResponse>()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?
            .into_result()
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    #[instrument(skip(self, message), fields(channel = %message.channel))]
    async fn post_message(&self, message: &PostMessage) -> Result<(), ChatError> {
        let response = self
            .http
            .post(format!("{}/chat.postMessage", self.api_url))
            .bearer_auth(&self.token)
            .json(message)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        Self::read(response).await?;
        debug!("Slack message posted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn channel_history(&self, channel: &str) -> Result<Vec<HistoryMessage>, ChatError> {
        let response = self
            .http
            .get(format!("{}/conversations.history", self.api_url))
            .bearer_auth(&self.token)
            .query(&[("channel", channel)])
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        Ok(Self::read(response).await?.messages)
    }
}
