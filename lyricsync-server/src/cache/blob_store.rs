//! Blob storage tier
//!
//! Opaque byte storage addressed by `{track_id}/{format}.gz` keys. The
//! relational tier only records keys; a key whose blob is missing is read as
//! a cache miss.

use async_trait::async_trait;
use lyricsync_common::{Error, Result};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;

/// Blob key for one stored format of one track
pub fn blob_key(track_id: &str, format: &str) -> String {
    format!("{}/{}.gz", track_id, format)
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// `Ok(None)` when no blob exists under `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deleting a missing key succeeds
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Filesystem-backed blob store rooted at a directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return Err(Error::InvalidInput(format!("Invalid blob key: {:?}", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Readers never observe a half-written blob
        let tmp_path = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process blob store for tests and ephemeral deployments
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.blobs.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blob_key_scheme() {
        assert_eq!(blob_key("abc-123", "richsync"), "abc-123/richsync.gz");
    }

    #[tokio::test]
    async fn test_fs_store_put_get_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp_dir.path());

        store.put("track/synced.gz", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("track/synced.gz").await.unwrap(), Some(vec![1, 2, 3]));

        store.delete("track/synced.gz").await.unwrap();
        assert_eq!(store.get("track/synced.gz").await.unwrap(), None);

        // Deleting again is not an error
        store.delete("track/synced.gz").await.unwrap();
    }

    #[tokio::test]
    async fn test_fs_store_overwrites_atomically() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp_dir.path());

        store.put("t/plain.gz", b"old".to_vec()).await.unwrap();
        store.put("t/plain.gz", b"new".to_vec()).await.unwrap();

        assert_eq!(store.get("t/plain.gz").await.unwrap(), Some(b"new".to_vec()));
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path().join("t")).unwrap().collect();
        assert_eq!(entries.len(), 1, "temp files must not be left behind");
    }

    #[tokio::test]
    async fn test_fs_store_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp_dir.path());

        assert!(store.put("../escape.gz", vec![0]).await.is_err());
        assert!(store.get("/etc/passwd").await.is_err());
        assert!(store.get("").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryBlobStore::new();
        store.put("k", vec![9]).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("k").await.unwrap(), Some(vec![9]));
        store.delete("k").await.unwrap();
        assert!(store.is_empty().await);
    }
}
