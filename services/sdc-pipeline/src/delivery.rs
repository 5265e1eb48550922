use crate::alert::{AlertType, FileMessage, MANIFEST_COLOR};
use crate::chat::{Attachment, Block, ChatClient, ChatError, PostMessage};
use backoff::backoff::{Backoff, Constant};
use chrono::{DateTime, Local};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Fixed-delay retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5))
    }
}

/// Last error of an operation that used up its retry budget
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `operation` until it succeeds or the policy's attempts are used up,
/// sleeping the fixed delay between attempts. The closure receives the
/// 1-based attempt number.
pub async fn retry_with_fixed_delay<T, E, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = Constant::new(policy.delay);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => {
                return Err(Exhausted {
                    attempts: attempt,
                    last_error: e,
                });
            }
            Err(e) => {
                let delay = backoff.next_backoff().unwrap_or(policy.delay);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                metrics::counter!("sdc.notifications.retries").increment(1);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Render a file message into the chat payload.
///
/// Plain messages go out as text. With an alert the wording moves into a
/// colour-coded attachment and the text becomes the send time.
pub fn render(
    channel: &str,
    message: &FileMessage,
    alert: Option<AlertType>,
    thread_ts: Option<&str>,
    now: DateTime<Local>,
) -> PostMessage {
    let (text, pretext, attachments) = match message {
        FileMessage::Manifest { header, body } => (
            header.clone(),
            header.clone(),
            vec![Attachment {
                color: MANIFEST_COLOR.to_string(),
                blocks: vec![Block::markdown_section(body.clone())],
                fallback: Some(body.clone()),
            }],
        ),
        FileMessage::Text(text) => match alert {
            Some(alert) => (
                format!("`{}` -", now.format("%y-%m-%d %H:%M:%S")),
                text.clone(),
                vec![Attachment {
                    color: alert.color().to_string(),
                    blocks: vec![Block::markdown_section(text.clone())],
                    fallback: None,
                }],
            ),
            None => (text.clone(), text.clone(), Vec::new()),
        },
    };

    PostMessage {
        channel: channel.to_string(),
        text,
        pretext,
        attachments,
        thread_ts: thread_ts.map(String::from),
    }
}

/// Post `message`, retrying transport and API failures with a fixed delay.
///
/// A failed attempt posts nothing, so retries never duplicate a message.
pub async fn deliver(
    chat: &dyn ChatClient,
    channel: &str,
    message: &FileMessage,
    alert: Option<AlertType>,
    thread_ts: Option<&str>,
    policy: RetryPolicy,
) -> Result<(), Exhausted<ChatError>> {
    debug!(channel, "Sending Slack notification");
    let post = render(channel, message, alert, thread_ts, Local::now());

    let result = retry_with_fixed_delay(policy, |_| chat.post_message(&post)).await;

    match &result {
        Ok(()) => {
            metrics::counter!("sdc.notifications.sent").increment(1);
            debug!(channel, "Slack notification sent");
        }
        Err(exhausted) => {
            metrics::counter!("sdc.notifications.failed").increment(1);
            error!(
                channel,
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                "Giving up on Slack notification"
            );
        }
    }

    result
}
