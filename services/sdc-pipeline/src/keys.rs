use crate::metadata::{FilenameParser, ScienceFileMetadata};
use chrono::Datelike;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Errors raised while turning a science filename into a storage key
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("cannot parse science filename {filename}: {reason}")]
    Parse { filename: String, reason: String },

    #[error("metadata for {filename} is missing required field `{field}`")]
    Metadata {
        filename: String,
        field: &'static str,
    },
}

/// Directory layout used below the level prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyLayout {
    /// `<level>/<year>/<MM>/<filename>`
    #[default]
    Monthly,
    /// `<level>/<year>/<MM>/<DD>/<filename>`
    Daily,
}

/// Canonical location of a science file inside a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    prefix_segments: Vec<String>,
    filename: String,
}

impl StorageKey {
    /// Build the key for `filename` from already normalized metadata.
    ///
    /// Levels may themselves contain `/` (e.g. `ql/eventlist`); each part
    /// becomes its own prefix segment.
    pub fn new(metadata: &ScienceFileMetadata, filename: &str, layout: KeyLayout) -> Self {
        let mut prefix_segments: Vec<String> = metadata
            .level
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(String::from)
            .collect();

        prefix_segments.push(metadata.time.year().to_string());
        prefix_segments.push(format!("{:02}", metadata.time.month()));
        if layout == KeyLayout::Daily {
            prefix_segments.push(format!("{:02}", metadata.time.day()));
        }

        Self {
            prefix_segments,
            filename: file_name_of(filename).to_string(),
        }
    }

    pub fn prefix_segments(&self) -> &[String] {
        &self.prefix_segments
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The key as the object store addresses it
    pub fn as_path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.prefix_segments {
            write!(f, "{segment}/")?;
        }
        f.write_str(&self.filename)
    }
}

/// Derive the storage key for `filename` using `parser` for its metadata.
pub fn derive_key(
    parser: &dyn FilenameParser,
    filename: &str,
    layout: KeyLayout,
) -> Result<StorageKey, KeyError> {
    let metadata = ScienceFileMetadata::read(parser, file_name_of(filename))?;
    Ok(StorageKey::new(&metadata, filename, layout))
}

/// Last segment of a slash separated key or path
pub fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
