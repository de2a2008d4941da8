//! Key derivation using PBKDF2-HMAC-SHA256.
//!
//! The iteration count is not stored alongside the salt, so every file this
//! crate produces assumes [`PBKDF2_ITERATIONS`] unless the caller overrides it
//! on both ends.

use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::keys::{Salt, SymmetricKey, KEY_LENGTH};
use switchvault_common::{Error, Result};

/// Iteration count used for backup and share files.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Parameters for PBKDF2 key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of HMAC-SHA256 iterations.
    pub iterations: u32,
}

impl KdfParams {
    /// Parameters compatible with every exported file.
    pub fn standard() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Custom iteration count.
    ///
    /// Files produced with anything other than [`KdfParams::standard`] can
    /// only be opened with the same parameters.
    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::standard()
    }
}

/// A derived key together with the salt that produced it.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub key: SymmetricKey,
    pub salt: Salt,
}

impl DerivedKey {
    /// Base64 form of the salt, as written into envelopes.
    pub fn salt_base64(&self) -> String {
        self.salt.to_base64()
    }
}

/// Derive an AES-256 key from a passphrase and salt.
///
/// # Preconditions
/// - `passphrase` must not be empty
/// - `params.iterations` must be non-zero
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
///
/// # Security
/// - Passphrase is not stored or logged
pub fn derive_key(passphrase: &[u8], salt: &Salt, params: &KdfParams) -> Result<SymmetricKey> {
    if passphrase.is_empty() {
        return Err(Error::InvalidInput("Passphrase cannot be empty".to_string()));
    }
    if params.iterations == 0 {
        return Err(Error::InvalidInput(
            "KDF iteration count must be positive".to_string(),
        ));
    }

    let mut key_bytes = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(passphrase, salt.as_bytes(), params.iterations, &mut key_bytes);

    Ok(SymmetricKey::from_bytes(key_bytes))
}

/// Derive a key, generating a fresh random salt when none is given.
///
/// Restores pass the salt read from the envelope; new exports pass `None`.
pub fn derive(passphrase: &str, salt: Option<&Salt>, params: &KdfParams) -> Result<DerivedKey> {
    let salt = salt.cloned().unwrap_or_else(Salt::generate);
    let key = derive_key(passphrase.as_bytes(), &salt, params)?;
    Ok(DerivedKey { key, salt })
}
