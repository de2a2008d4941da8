//! Key-value store trait definition.

use async_trait::async_trait;

use switchvault_common::Result;

/// Persistent key-value store consumed by the vault core.
///
/// Writes replace the whole value. There is no versioning: two writers doing
/// overlapping read-modify-write cycles resolve as last-write-wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the store name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Read the value stored under `key`.
    ///
    /// # Returns
    /// - `Ok(None)` if nothing has been stored under the key yet
    ///
    /// # Errors
    /// - `Error::Store` if the backend cannot be read
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Postconditions
    /// - On success a subsequent `get` returns `value`
    /// - On failure the previous value is left in place
    ///
    /// # Errors
    /// - `Error::Store` with `StoreError::QuotaExceeded` when the store is full
    /// - `Error::Store` for any other backend failure
    async fn set(&self, key: &str, value: String) -> Result<()>;
}
