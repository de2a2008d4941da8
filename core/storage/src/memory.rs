//! In-memory key-value store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::provider::KeyValueStore;
use switchvault_common::{Result, StoreError};

/// In-memory key-value store.
///
/// Useful for testing and embedding. All data is stored in memory and lost
/// on drop. An optional quota caps the total size of keys plus values in
/// bytes, mirroring the limits of browser extension storage.
#[derive(Clone, Default)]
pub struct MemoryStore {
    storage: Arc<RwLock<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    /// Create a new empty store without a quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty store that rejects writes beyond `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            storage: Arc::default(),
            quota: Some(quota),
        }
    }

    /// Total bytes currently used by keys and values.
    pub fn used_bytes(&self) -> usize {
        self.storage
            .read()
            .map(|s| s.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0)
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("memory store lock poisoned".to_string())
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let storage = self.storage.read().map_err(|_| poisoned())?;
        Ok(storage.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut storage = self.storage.write().map_err(|_| poisoned())?;

        if let Some(limit) = self.quota {
            let others: usize = storage
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > limit {
                return Err(StoreError::QuotaExceeded { needed, limit }.into());
            }
        }

        storage.insert(key.to_string(), value);
        Ok(())
    }
}
