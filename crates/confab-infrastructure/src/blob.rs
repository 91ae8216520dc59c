//! Filesystem-backed content-addressed blob store.
//!
//! Blobs land under a single directory, named by their content hash:
//!
//! ```text
//! base_dir/
//! ├── 3f2a...c9.blob
//! └── 91d0...7e.blob
//! ```
//!
//! Content addressing makes concurrent writes of identical bytes collide
//! harmlessly: both writers produce the same file.

use async_trait::async_trait;
use confab_core::claim_check::{BlobStore, content_hash};
use confab_core::error::{Result, SupervisorError};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Blob store writing one file per content hash under a base directory.
pub struct FsBlobStore {
    base_dir: PathBuf,
}

impl FsBlobStore {
    /// Creates a store at the default platform location
    /// (`<data dir>/confab/blobs`).
    pub async fn default_location() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| SupervisorError::internal("could not determine data directory"))?;
        Self::new(base.join("confab").join("blobs")).await
    }

    /// Creates a store rooted at `base_dir`, creating the directory if
    /// needed.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).await?;
        Ok(Self { base_dir })
    }

    fn blob_path(&self, locator: &str) -> PathBuf {
        self.base_dir.join(format!("{}.blob", locator))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<String> {
        let locator = content_hash(bytes);
        let path = self.blob_path(&locator);

        // A file named by this hash already holds these exact bytes.
        if fs::try_exists(&path).await? {
            return Ok(locator);
        }

        // Write-then-rename so a concurrent reader never sees a partial
        // blob.
        let tmp = self
            .base_dir
            .join(format!("{}.{}.tmp", locator, uuid::Uuid::new_v4()));
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        tracing::debug!(%locator, size = bytes.len(), "stored blob");
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        match fs::read(self.blob_path(locator)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(SupervisorError::BlobMissing {
                    locator: locator.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(tmp.path()).await.unwrap();

        let locator = store.put(b"durable bytes").await.unwrap();
        assert_eq!(store.get(&locator).await.unwrap(), b"durable bytes");
    }

    #[tokio::test]
    async fn test_duplicate_put_returns_same_locator() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(tmp.path()).await.unwrap();

        let a = store.put(b"same content").await.unwrap();
        let b = store.put(b"same content").await.unwrap();
        assert_eq!(a, b);

        // Exactly one .blob file on disk.
        let count = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "blob"))
            .count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_unknown_locator_is_blob_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(tmp.path()).await.unwrap();

        let err = store.get("0000").await.unwrap_err();
        assert!(matches!(err, SupervisorError::BlobMissing { .. }));
    }

    #[tokio::test]
    async fn test_store_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = {
            let store = FsBlobStore::new(tmp.path()).await.unwrap();
            store.put(b"persistent").await.unwrap()
        };

        let reopened = FsBlobStore::new(tmp.path()).await.unwrap();
        assert_eq!(reopened.get(&locator).await.unwrap(), b"persistent");
    }
}
