//! Persistent query set.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::QuerySet;
use crate::utils::fs;

/// File-backed [`QuerySet`], re-read on every operation so edits made by
/// the maintenance tool between cycles are picked up.
#[derive(Debug, Clone)]
pub struct QueryStore {
    path: PathBuf,
}

impl QueryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the whole set. A missing file is an empty set.
    pub async fn load(&self) -> Result<QuerySet> {
        match fs::read_json::<QuerySet>(&self.path).await? {
            Some(set) => {
                set.validate()?;
                Ok(set)
            }
            None => {
                log::warn!("No query file found at {}", self.path.display());
                Ok(QuerySet::default())
            }
        }
    }

    /// Write the whole set back atomically.
    pub async fn save(&self, set: &QuerySet) -> Result<()> {
        fs::write_json(&self.path, set).await
    }

    /// Overwrite one query's cursor and persist the set.
    pub async fn advance_cursor(&self, text: &str, cursor: &str) -> Result<()> {
        let mut set = self.load().await?;
        set.advance_cursor(text, cursor)?;
        self.save(&set).await
    }

    /// Remove a query that no longer has matching content and persist the set.
    pub async fn remove(&self, text: &str) -> Result<bool> {
        let mut set = self.load().await?;
        let removed = set.remove(text);
        if removed {
            self.save(&set).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Query;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_is_empty_set() {
        let tmp = TempDir::new().unwrap();
        let store = QueryStore::new(tmp.path().join("queries.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn advance_cursor_round_trips_through_disk() {
        let tmp = TempDir::new().unwrap();
        let store = QueryStore::new(tmp.path().join("queries.json"));
        store
            .save(&QuerySet::new(vec![Query::new("#one"), Query::new("#two")]))
            .await
            .unwrap();

        store.advance_cursor("#two", "900").await.unwrap();

        let set = store.load().await.unwrap();
        assert_eq!(set.queries()[1].cursor.as_deref(), Some("900"));
        assert_eq!(set.queries()[0].cursor, None);
    }

    #[tokio::test]
    async fn remove_persists() {
        let tmp = TempDir::new().unwrap();
        let store = QueryStore::new(tmp.path().join("queries.json"));
        store
            .save(&QuerySet::new(vec![Query::new("#one"), Query::new("#two")]))
            .await
            .unwrap();

        assert!(store.remove("#one").await.unwrap());
        assert!(!store.remove("#missing").await.unwrap());

        let set = store.load().await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.queries()[0].text, "#two");
    }

    #[tokio::test]
    async fn load_rejects_blank_query_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("queries.json");
        tokio::fs::write(&path, r#"[{"text": "", "active": true}]"#)
            .await
            .unwrap();
        assert!(QueryStore::new(path).load().await.is_err());
    }
}
