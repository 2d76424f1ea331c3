//! Async key-value storage backends for persisted session state

use crate::error::StorageError;
use async_trait::async_trait;
use papaya::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Durable string key-value storage
///
/// Each `set_item`/`remove_item` must be atomic per key: a concurrent reader
/// observes either the old or the new value, never a partial one.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Thread-safe in-memory storage using Papaya HashMap
///
/// Nothing survives a restart. Useful in tests and for hosts without a
/// writable filesystem.
#[derive(Clone)]
pub struct MemoryStorage {
    items: Arc<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            items: Arc::new(HashMap::new()),
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.items.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.pin().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items.pin().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.pin().remove(key);
        Ok(())
    }
}

/// Storage backed by a directory holding one file per key
///
/// Every read goes to disk so changes made by another process are picked up.
/// Each write lands in a uniquely named temporary sibling and is renamed over
/// the key file, so handles in different processes never clobber each
/// other's keys and a damaged key file is simply replaced by the next write.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(urlencoding::encode(key).as_ref())
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let seq = NEXT.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}.{seq}.tmp",
            urlencoding::encode(key),
            std::process::id()
        ))
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read(self.key_path(key)).await {
            Ok(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| {
                StorageError::Unavailable(format!("key {key} holds non-UTF-8 data: {e}"))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = self.temp_path(key);
        if let Err(e) = tokio::fs::write(&tmp, value).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, self.key_path(key)).await {
            warn!(key, error = %e, "Failed to move key file into place");
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty());

        storage.set_item("k", "v1").await.unwrap();
        storage.set_item("k", "v2").await.unwrap();
        assert_eq!(storage.get_item("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(storage.len(), 1);

        storage.remove_item("k").await.unwrap();
        assert_eq!(storage.get_item("k").await.unwrap(), None);

        // Removing a missing key is not an error
        storage.remove_item("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_storage_clones_share_state() {
        let storage = MemoryStorage::new();
        let other = storage.clone();

        storage.set_item("token", "abc").await.unwrap();
        assert_eq!(other.get_item("token").await.unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session");

        let storage = FileStorage::new(&path);
        assert_eq!(storage.get_item("token").await.unwrap(), None);

        storage.set_item("token", "abc").await.unwrap();
        storage.set_item("user", r#"{"id":"u1"}"#).await.unwrap();

        let reopened = FileStorage::new(&path);
        assert_eq!(reopened.get_item("token").await.unwrap().as_deref(), Some("abc"));
        assert_eq!(
            reopened.get_item("user").await.unwrap().as_deref(),
            Some(r#"{"id":"u1"}"#)
        );

        reopened.remove_item("token").await.unwrap();
        assert_eq!(storage.get_item("token").await.unwrap(), None);
        assert!(storage.get_item("user").await.unwrap().is_some());

        // Removing a missing key is not an error
        storage.remove_item("token").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_storage_handles_on_one_dir_keep_each_others_keys() {
        let dir = tempfile::tempdir().unwrap();
        let first = Arc::new(FileStorage::new(dir.path()));
        let second = Arc::new(FileStorage::new(dir.path()));

        for round in 0..50 {
            let a = first.clone();
            let b = second.clone();
            let v1 = format!("one-{round}");
            let v2 = format!("two-{round}");
            let (r1, r2) = tokio::join!(
                tokio::spawn(async move { a.set_item("k1", &v1).await }),
                tokio::spawn(async move { b.set_item("k2", &v2).await }),
            );
            r1.unwrap().unwrap();
            r2.unwrap().unwrap();

            assert_eq!(
                first.get_item("k1").await.unwrap(),
                Some(format!("one-{round}"))
            );
            assert_eq!(
                first.get_item("k2").await.unwrap(),
                Some(format!("two-{round}"))
            );
        }

        // No temporary files left behind
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        assert_eq!(names, vec!["k1".to_string(), "k2".to_string()]);
    }

    #[tokio::test]
    async fn test_file_storage_recovers_from_damaged_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        tokio::fs::write(dir.path().join("token"), [0xff, 0xfe, 0x00])
            .await
            .unwrap();

        assert!(matches!(
            storage.get_item("token").await,
            Err(StorageError::Unavailable(_))
        ));

        storage.set_item("token", "fresh").await.unwrap();
        assert_eq!(storage.get_item("token").await.unwrap().as_deref(), Some("fresh"));

        tokio::fs::write(dir.path().join("token"), [0xff]).await.unwrap();
        storage.remove_item("token").await.unwrap();
        assert_eq!(storage.get_item("token").await.unwrap(), None);
    }

    #[test]
    fn test_file_storage_key_names_are_path_safe() {
        let storage = FileStorage::new("/tmp/athlehub");
        assert_eq!(
            storage.key_path("../escape"),
            PathBuf::from("/tmp/athlehub/..%2Fescape")
        );
        assert_ne!(storage.temp_path("k"), storage.temp_path("k"));
    }
}
