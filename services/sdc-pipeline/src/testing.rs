//! In-memory fakes shared by unit tests.

use crate::keys::KeyError;
use crate::metadata::{FilenameParser, ParsedFilename};
use crate::object_store::{ListPage, ObjectStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Head { bucket: String, key: String },
    Get { bucket: String, key: String },
    Put { bucket: String, key: String },
    Copy { from: String, to: String },
    Delete { bucket: String, key: String },
    ListPage { bucket: String },
}

/// Object store backed by maps, recording every call
#[derive(Default)]
pub struct InMemoryStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    failing: HashSet<String>,
    page_size: Option<usize>,
    calls: Mutex<Vec<StoreCall>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default();
        self
    }

    pub fn with_object(self, bucket: &str, key: &str, body: &[u8]) -> Self {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body.to_vec());
        self
    }

    /// Every operation touching `bucket` fails with a transport error
    pub fn failing_bucket(mut self, bucket: &str) -> Self {
        self.failing.insert(bucket.to_string());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_bucket(&self, operation: &'static str, bucket: &str, key: &str) -> Result<(), StoreError> {
        if self.failing.contains(bucket) {
            return Err(StoreError::Transport {
                operation,
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn require_bucket(&self, operation: &'static str, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.check_bucket(operation, bucket, key)?;
        if !self.buckets.lock().unwrap().contains_key(bucket) {
            return Err(StoreError::Transport {
                operation,
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "NoSuchBucket".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn head(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.record(StoreCall::Head {
            bucket: bucket.into(),
            key: key.into(),
        });
        self.check_bucket("head_object", bucket, key)?;
        self.object(bucket, key)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.record(StoreCall::Get {
            bucket: bucket.into(),
            key: key.into(),
        });
        self.check_bucket("get_object", bucket, key)?;
        self.object(bucket, key)
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.record(StoreCall::Put {
            bucket: bucket.into(),
            key: key.into(),
        });
        self.require_bucket("put_object", bucket, key)?;
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body);
        Ok(())
    }

    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StoreError> {
        self.record(StoreCall::Copy {
            from: format!("{source_bucket}/{source_key}"),
            to: format!("{dest_bucket}/{dest_key}"),
        });
        self.check_bucket("copy_object", source_bucket, source_key)?;
        let body = self
            .object(source_bucket, source_key)
            .ok_or_else(|| StoreError::not_found(source_bucket, source_key))?;
        self.require_bucket("copy_object", dest_bucket, dest_key)?;
        self.buckets
            .lock()
            .unwrap()
            .entry(dest_bucket.to_string())
            .or_default()
            .insert(dest_key.to_string(), body);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.record(StoreCall::Delete {
            bucket: bucket.into(),
            key: key.into(),
        });
        self.check_bucket("delete_object", bucket, key)?;
        if let Some(objects) = self.buckets.lock().unwrap().get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, StoreError> {
        self.record(StoreCall::ListPage {
            bucket: bucket.into(),
        });
        self.require_bucket("list_objects_v2", bucket, "")?;

        let keys: Vec<String> = self.buckets.lock().unwrap()[bucket].keys().cloned().collect();
        let start: usize = continuation_token
            .map(|t| t.parse().expect("token is an offset"))
            .unwrap_or(0);
        let size = self.page_size.unwrap_or(keys.len().max(1));
        let end = (start + size).min(keys.len());

        Ok(ListPage {
            keys: keys[start..end].to_vec(),
            next_token: (end < keys.len()).then(|| end.to_string()),
        })
    }
}

/// Parser answering from a fixed table; unknown names fail to parse
#[derive(Default)]
pub struct StubParser {
    entries: HashMap<String, ParsedFilename>,
}

impl StubParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parsed(mut self, name: &str, parsed: ParsedFilename) -> Self {
        self.entries.insert(name.to_string(), parsed);
        self
    }

    pub fn with(self, name: &str, level: &str, time: DateTime<Utc>) -> Self {
        self.with_parsed(
            name,
            ParsedFilename {
                level: Some(level.to_string()),
                time: Some(time),
                test: Some(false),
                ..Default::default()
            },
        )
    }

    pub fn without_level(self, name: &str, time: DateTime<Utc>) -> Self {
        self.with_parsed(
            name,
            ParsedFilename {
                time: Some(time),
                ..Default::default()
            },
        )
    }
}

impl FilenameParser for StubParser {
    fn parse(&self, filename: &str) -> Result<ParsedFilename, KeyError> {
        self.entries
            .get(filename)
            .cloned()
            .ok_or_else(|| KeyError::Parse {
                filename: filename.to_string(),
                reason: "unknown to stub".to_string(),
            })
    }
}
