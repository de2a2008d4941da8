//! Common error types for SwitchVault.

use thiserror::Error;

/// Failure reported by a key-value store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write would exceed the store's capacity.
    #[error("Storage quota exceeded: {needed} bytes needed, limit is {limit} bytes")]
    QuotaExceeded { needed: usize, limit: usize },

    /// Filesystem or device I/O failed.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend-specific failure.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Top-level error type for SwitchVault operations.
///
/// None of the variants carry passphrases, keys, cookie values or
/// local-storage values.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or incompatible envelope or vault document.
    #[error("Format error: {0}")]
    Format(String),

    /// Authentication tag did not verify.
    ///
    /// A wrong passphrase and a corrupted ciphertext are indistinguishable.
    #[error("Incorrect password or corrupted data")]
    Decrypt,

    /// A referenced site or account does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The underlying key-value store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A cryptographic primitive was misused (e.g. wrong key length).
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// The snapshot provider could not capture or apply a snapshot.
    #[error("Snapshot provider error: {0}")]
    Snapshot(String),
}

impl Error {
    /// True when the store rejected a write because it is full.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Error::Store(StoreError::QuotaExceeded { .. }))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Format(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_detection() {
        let err = Error::from(StoreError::QuotaExceeded {
            needed: 20,
            limit: 10,
        });
        assert!(err.is_quota_exceeded());

        let err = Error::from(StoreError::Backend("offline".to_string()));
        assert!(!err.is_quota_exceeded());
    }

    #[test]
    fn test_json_errors_are_format_errors() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_decrypt_message_is_generic() {
        assert_eq!(
            Error::Decrypt.to_string(),
            "Incorrect password or corrupted data"
        );
    }
}
