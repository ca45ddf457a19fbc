//! Advisory "cycle in progress" marker.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::utils::fs;

/// Marker file present while a crawl cycle runs.
///
/// A leftover marker means the last cycle failed or the process died
/// mid-cycle. It is diagnostic only and never used for mutual exclusion.
#[derive(Debug, Clone)]
pub struct CycleLock {
    path: PathBuf,
}

impl CycleLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mark a cycle as started.
    pub async fn acquire(&self) -> Result<()> {
        fs::write_bytes(&self.path, b"").await
    }

    /// Mark the cycle as finished.
    pub async fn release(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::persistence(&self.path, e)),
        }
    }

    pub fn is_present(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn acquire_then_release() {
        let tmp = TempDir::new().unwrap();
        let lock = CycleLock::new(tmp.path().join("crawler.lock"));

        assert!(!lock.is_present());
        lock.acquire().await.unwrap();
        assert!(lock.is_present());
        lock.release().await.unwrap();
        assert!(!lock.is_present());
    }

    #[tokio::test]
    async fn release_without_acquire_is_ok() {
        let tmp = TempDir::new().unwrap();
        let lock = CycleLock::new(tmp.path().join("crawler.lock"));
        assert!(lock.release().await.is_ok());
    }
}
