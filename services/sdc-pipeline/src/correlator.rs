//! Matches pipeline events to the chat thread already opened for a file.

use crate::chat::ChatClient;
use crate::keys::file_name_of;
use crate::metadata::{FilenameParser, Fingerprint};
use crate::notifier::NotifyError;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, instrument, trace};

static SCIENCE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Science File - \( _?(.+?)_? \)").unwrap());

/// Path embedded in a root "Science File" message, if the text is one
pub fn extract_science_path(text: &str) -> Option<&str> {
    SCIENCE_FILE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Find the root message of the thread for `filename`.
///
/// Scans channel history in the order the backend returns it and answers
/// with the first message whose file shares the target's time, mode and
/// test flag. Messages that do not parse as science files are skipped.
#[instrument(skip(chat, parser))]
pub async fn find_thread(
    chat: &dyn ChatClient,
    parser: &dyn FilenameParser,
    channel: &str,
    filename: &str,
) -> Result<Option<String>, NotifyError> {
    let target = Fingerprint::from(&parser.parse(file_name_of(filename))?);

    let history = chat
        .channel_history(channel)
        .await
        .map_err(|source| NotifyError::Chat {
            channel: channel.to_string(),
            source,
        })?;

    for message in history {
        let Some(path) = message.text.as_deref().and_then(extract_science_path) else {
            continue;
        };

        let parsed = match parser.parse(file_name_of(path)) {
            Ok(parsed) => parsed,
            Err(e) => {
                trace!(path, error = %e, "Skipping message for unparseable file");
                continue;
            }
        };

        if Fingerprint::from(&parsed) == target {
            debug!(ts = %message.ts, "Found existing thread");
            return Ok(Some(message.ts));
        }
    }

    Ok(None)
}
