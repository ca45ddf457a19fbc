// src/utils/fs.rs

//! Atomic file persistence.
//!
//! Every durable write goes through [`write_bytes`]: the payload lands in a
//! sibling `.tmp` file, is flushed and synced, then renamed over the target,
//! so readers only ever observe the old or the new content.

use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

/// Ensure the parent directory of `path` exists.
async fn ensure_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write bytes atomically (write to temp, then rename).
pub async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let write = async {
        ensure_dir(path).await?;

        let tmp = tmp_path(path);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok::<(), AppError>(())
    };
    write.await.map_err(|e| AppError::persistence(path, e))
}

/// Serialize `value` as pretty JSON and write it atomically.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes(path, &bytes).await
}

/// Read bytes, returning None if the file doesn't exist.
pub async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Read JSON data, returning None if the file doesn't exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_bytes(path).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/test.txt");

        write_bytes(&path, b"hello").await.unwrap();
        let data = read_bytes(&path).await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let data = read_bytes(&tmp.path().join("nope.txt")).await.unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("quota.json");

        write_json(&path, &serde_json::json!({"used": 1})).await.unwrap();
        write_json(&path, &serde_json::json!({"used": 2})).await.unwrap();

        let value: serde_json::Value = read_json(&path).await.unwrap().unwrap();
        assert_eq!(value["used"], 2);
        assert!(!tmp.path().join("quota.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_failure_is_persistence_error() {
        let tmp = TempDir::new().unwrap();
        // A regular file cannot act as a parent directory
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let err = write_bytes(&blocker.join("child.json"), b"{}")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence { .. }));
    }
}
