//! Local JSON document store.
//!
//! One pretty-printed file per record under `{root}/{bucket}/{id}.json`.
//! Writes reuse the atomic temp-then-rename helper, so re-inserting an id
//! simply replaces the previous document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{Record, field_as_key};
use crate::storage::{RecordKind, RecordSink};
use crate::utils::fs;

/// Concurrent file writes per insert.
const WRITE_CONCURRENCY: usize = 16;

/// Filesystem-backed document sink.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root_dir: PathBuf,
}

impl DocumentStore {
    /// Create a store rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Path of the document for `id` in `kind`'s bucket.
    pub fn document_path(&self, kind: RecordKind, id: &str) -> PathBuf {
        self.root_dir
            .join(kind.bucket())
            .join(format!("{}.json", sanitize_key(id)))
    }

    /// Read one document back, if present.
    pub async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Record>> {
        fs::read_json(&self.document_path(kind, id)).await
    }
}

/// Keep ids usable as file names.
fn sanitize_key(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl RecordSink for DocumentStore {
    fn name(&self) -> &str {
        "documents"
    }

    async fn insert(&self, kind: RecordKind, records: &[Record]) -> Result<usize> {
        let id_field = kind.id_field();
        let mut keyed = Vec::with_capacity(records.len());
        for record in records {
            match field_as_key(record, id_field) {
                Some(id) => keyed.push((self.document_path(kind, &id), record.clone())),
                None => log::warn!("Skipping {} record without {}", kind, id_field),
            }
        }

        let results: Vec<Result<()>> = stream::iter(keyed)
            .map(|(path, record)| async move {
                fs::write_json(&path, &record).await
            })
            .buffer_unordered(WRITE_CONCURRENCY)
            .collect()
            .await;

        let mut written = 0;
        for result in results {
            result?;
            written += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_writes_one_document_per_id() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path());

        let tweets = vec![
            record(json!({"tweet_id": "1", "tweet_text": "a"})),
            record(json!({"tweet_id": "2", "tweet_text": "b"})),
        ];
        let written = store.insert(RecordKind::Tweets, &tweets).await.unwrap();
        assert_eq!(written, 2);

        assert!(tmp.path().join("tweets/1.json").exists());
        let doc = store.get(RecordKind::Tweets, "2").await.unwrap().unwrap();
        assert_eq!(doc["tweet_text"], "b");
    }

    #[tokio::test]
    async fn reinserting_an_id_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path());

        store
            .insert(RecordKind::Users, &[record(json!({"id": "9", "username": "old"}))])
            .await
            .unwrap();
        store
            .insert(RecordKind::Users, &[record(json!({"id": "9", "username": "new"}))])
            .await
            .unwrap();

        let doc = store.get(RecordKind::Users, "9").await.unwrap().unwrap();
        assert_eq!(doc["username"], "new");
        let entries = std::fs::read_dir(tmp.path().join("twitter_users")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn records_without_id_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path());

        let users = vec![
            record(json!({"username": "anon"})),
            record(json!({"id": 42, "username": "numeric"})),
        ];
        assert_eq!(store.insert(RecordKind::Users, &users).await.unwrap(), 1);
        assert!(store.get(RecordKind::Users, "42").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn insert_future_can_be_spawned() {
        let tmp = TempDir::new().unwrap();
        let sink: Box<dyn RecordSink> = Box::new(DocumentStore::new(tmp.path()));
        let tweets: Vec<Record> = (0..40)
            .map(|n| record(json!({"tweet_id": n.to_string(), "tweet_text": "x"})))
            .collect();

        let written = tokio::spawn(async move { sink.insert(RecordKind::Tweets, &tweets).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(written, 40);
        let files = std::fs::read_dir(tmp.path().join("tweets")).unwrap().count();
        assert_eq!(files, 40);
    }

    #[test]
    fn keys_are_sanitized() {
        assert_eq!(sanitize_key("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_key("123_abc-9"), "123_abc-9");
    }
}
