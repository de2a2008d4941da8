//! Local filesystem key-value store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::provider::KeyValueStore;
use switchvault_common::{Error, Result, StoreError};

/// Local filesystem key-value store.
///
/// Each key is stored as `<root>/<key>.json`. Writes go to a temporary file
/// first and are renamed into place, so a failed write never leaves a
/// truncated value behind.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a new local store with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root).map_err(StoreError::from)?;
        }

        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(Error::InvalidInput(format!("Invalid store key: {:?}", key)));
        }
        Ok(self.root.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;

        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e).into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let path = self.key_path(key)?;
        let tmp = path.with_extension("json.tmp");

        let written = match fs::write(&tmp, value.as_bytes()).await {
            Ok(()) => fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::from(e).into());
        }

        debug!(key, bytes = value.len(), "Value written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_failed_write_removes_temp_file() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::new(temp.path()).unwrap();
        std::fs::create_dir(temp.path().join("accounts.json")).unwrap();

        assert!(store.set("accounts", "[]".to_string()).await.is_err());
        assert!(!temp.path().join("accounts.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_local_set_get() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::new(temp.path()).unwrap();

        assert!(store.get("accounts").await.unwrap().is_none());

        store.set("accounts", "[]".to_string()).await.unwrap();
        assert_eq!(store.get("accounts").await.unwrap().as_deref(), Some("[]"));
        assert!(temp.path().join("accounts.json").exists());
        assert!(!temp.path().join("accounts.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_local_overwrite() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::new(temp.path()).unwrap();

        store.set("accounts", "first".to_string()).await.unwrap();
        store.set("accounts", "second".to_string()).await.unwrap();

        assert_eq!(
            store.get("accounts").await.unwrap().as_deref(),
            Some("second")
        );
    }

    #[tokio::test]
    async fn test_local_creates_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nested").join("store");
        let store = LocalStore::new(&root).unwrap();

        store.set("k", "v".to_string()).await.unwrap();
        assert!(root.join("k.json").exists());
    }

    #[tokio::test]
    async fn test_local_rejects_path_keys() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::new(temp.path()).unwrap();

        assert!(store.get("../escape").await.is_err());
        assert!(store.set("", "v".to_string()).await.is_err());
        assert!(store.set("a/b", "v".to_string()).await.is_err());
    }
}
