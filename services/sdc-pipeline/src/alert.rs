use crate::keys::file_name_of;
use crate::notifier::NotifyError;
use std::fmt;
use std::str::FromStr;

const MANIFEST_PREFIX: &str = "file_manifest";

/// Colour used for manifest attachments
pub const MANIFEST_COLOR: &str = "#9b59b6";

/// Pipeline stage a notification reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertType {
    Upload,
    Sorted,
    SortedError,
    Processed,
    ProcessedError,
    Download,
    DownloadError,
    Error,
    /// Produces no message at all
    Delete,
    Success,
    Info,
    Warning,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Upload => "upload",
            AlertType::Sorted => "sorted",
            AlertType::SortedError => "sorted_error",
            AlertType::Processed => "processed",
            AlertType::ProcessedError => "processed_error",
            AlertType::Download => "download",
            AlertType::DownloadError => "download_error",
            AlertType::Error => "error",
            AlertType::Delete => "delete",
            AlertType::Success => "success",
            AlertType::Info => "info",
            AlertType::Warning => "warning",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            AlertType::Upload | AlertType::Info => "#3498db",
            AlertType::Sorted => "#f39c12",
            AlertType::Processed | AlertType::Success => "#2ecc71",
            AlertType::ProcessedError | AlertType::Warning => "#f1c40f",
            AlertType::Download => "#ffffff",
            AlertType::SortedError
            | AlertType::DownloadError
            | AlertType::Error
            | AlertType::Delete => "#ff0000",
        }
    }

    /// Message prefix for this stage; stages without their own wording use
    /// the generic science file message.
    fn headline(&self) -> &'static str {
        match self {
            AlertType::Upload => "File Uploaded to S3",
            AlertType::Sorted => "File Sorted",
            AlertType::SortedError => "File Not Sorted",
            AlertType::Processed => "File Processed",
            AlertType::ProcessedError => "File Not Processed",
            AlertType::Download => "File Downloaded",
            AlertType::DownloadError => "File Not Downloaded",
            AlertType::Error => "File Upload Failed",
            AlertType::Delete | AlertType::Success | AlertType::Info | AlertType::Warning => {
                "Science File"
            }
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let alert = match s {
            "upload" => AlertType::Upload,
            "sorted" => AlertType::Sorted,
            "sorted_error" => AlertType::SortedError,
            "processed" => AlertType::Processed,
            "processed_error" => AlertType::ProcessedError,
            "download" => AlertType::Download,
            "download_error" => AlertType::DownloadError,
            "error" => AlertType::Error,
            "delete" => AlertType::Delete,
            "success" => AlertType::Success,
            "info" => AlertType::Info,
            "warning" => AlertType::Warning,
            other => return Err(format!("unknown alert type: {other}")),
        };
        Ok(alert)
    }
}

/// Content of a file notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMessage {
    Text(String),
    /// Manifest header with the manifest contents as body
    Manifest { header: String, body: String },
}

/// True if the base name starts with the manifest prefix
pub fn is_file_manifest(path: &str) -> bool {
    file_name_of(path).starts_with(MANIFEST_PREFIX)
}

/// The root message every file thread starts with
pub fn science_file_message(path: &str) -> String {
    format!("Science File - ( _{}_ )", file_name_of(path))
}

/// Build the notification for `path`.
///
/// Returns `None` for [`AlertType::Delete`]. Manifests are read from `path`
/// and returned whole.
pub async fn build_message(
    path: &str,
    alert: Option<AlertType>,
) -> Result<Option<FileMessage>, NotifyError> {
    if alert == Some(AlertType::Delete) {
        return Ok(None);
    }

    let name = file_name_of(path);

    if is_file_manifest(name) {
        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| NotifyError::Manifest {
                path: path.to_string(),
                source,
            })?;
        return Ok(Some(FileMessage::Manifest {
            header: format!("Manifest File - ( _{name}_ )"),
            body,
        }));
    }

    let headline = alert.map(|a| a.headline()).unwrap_or("Science File");
    Ok(Some(FileMessage::Text(format!("{headline} - ( _{name}_ )"))))
}
