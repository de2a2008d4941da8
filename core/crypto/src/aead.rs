//! Authenticated encryption using AES-256-GCM.
//!
//! Ciphertexts travel as a [`CipherResult`]: base64 ciphertext (with the
//! 16-byte tag appended) and base64 IV, kept in separate fields.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::keys::SymmetricKey;
use switchvault_common::{Error, Result};

/// IV size for AES-GCM (12 bytes).
pub const IV_SIZE: usize = 12;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Encrypted payload as stored in backup and share files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherResult {
    /// Base64 of ciphertext || tag.
    pub cipher_text: String,
    /// Base64 of the 12-byte IV.
    pub iv: String,
}

/// Encrypt plaintext using AES-256-GCM.
///
/// # Postconditions
/// - A fresh random IV is generated for every call
/// - The decoded ciphertext length is plaintext length + TAG_SIZE
///
/// # Errors
/// - Returns `Error::Crypto` if the cipher rejects the input
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<CipherResult> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Crypto(format!("Invalid key: {}", e)))?;

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(CipherResult {
        cipher_text: STANDARD.encode(ciphertext),
        iv: STANDARD.encode(iv),
    })
}

/// Decrypt a [`CipherResult`] using AES-256-GCM.
///
/// # Errors
/// - Returns `Error::Decrypt` if the tag does not verify, or if either field
///   is not valid base64 or has an impossible length. A wrong key and a
///   corrupted payload are reported identically.
pub fn decrypt(key: &SymmetricKey, sealed: &CipherResult) -> Result<Vec<u8>> {
    let iv = STANDARD.decode(sealed.iv.trim()).map_err(|_| Error::Decrypt)?;
    if iv.len() != IV_SIZE {
        return Err(Error::Decrypt);
    }

    let ciphertext = STANDARD
        .decode(sealed.cipher_text.trim())
        .map_err(|_| Error::Decrypt)?;
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::Decrypt);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Crypto(format!("Invalid key: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|_| Error::Decrypt)
}

/// Decrypt and interpret the plaintext as UTF-8 text.
pub fn decrypt_to_string(key: &SymmetricKey, sealed: &CipherResult) -> Result<String> {
    let plaintext = decrypt(key, sealed)?;
    String::from_utf8(plaintext)
        .map_err(|_| Error::Format("Decrypted payload is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{derive, KdfParams};
    use crate::keys::{Salt, KEY_LENGTH, SALT_LENGTH};

    fn key(byte: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([byte; KEY_LENGTH])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = key(42);
        let sealed = encrypt(&key, b"Hello, World!").unwrap();
        let decrypted = decrypt(&key, &sealed).unwrap();

        assert_eq!(decrypted, b"Hello, World!");
    }

    #[test]
    fn test_ciphertext_size() {
        let key = key(42);
        let plaintext = b"Test message";

        let sealed = encrypt(&key, plaintext).unwrap();

        assert_eq!(STANDARD.decode(&sealed.iv).unwrap().len(), IV_SIZE);
        assert_eq!(
            STANDARD.decode(&sealed.cipher_text).unwrap().len(),
            plaintext.len() + TAG_SIZE
        );
    }

    #[test]
    fn test_different_iv_each_time() {
        let key = key(42);

        let ct1 = encrypt(&key, b"Same plaintext").unwrap();
        let ct2 = encrypt(&key, b"Same plaintext").unwrap();

        assert_ne!(ct1.iv, ct2.iv);
        assert_ne!(ct1.cipher_text, ct2.cipher_text);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(&key(1), b"Secret data").unwrap();
        assert!(matches!(decrypt(&key(2), &sealed), Err(Error::Decrypt)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = key(42);
        let mut sealed = encrypt(&key, b"Important data").unwrap();

        let mut raw = STANDARD.decode(&sealed.cipher_text).unwrap();
        raw[3] ^= 0xFF;
        sealed.cipher_text = STANDARD.encode(raw);

        assert!(matches!(decrypt(&key, &sealed), Err(Error::Decrypt)));
    }

    #[test]
    fn test_malformed_fields_are_decrypt_errors() {
        let key = key(42);
        let mut sealed = encrypt(&key, b"data").unwrap();
        sealed.iv = "not base64!".to_string();
        assert!(matches!(decrypt(&key, &sealed), Err(Error::Decrypt)));

        let short = CipherResult {
            cipher_text: STANDARD.encode([0u8; 4]),
            iv: STANDARD.encode([0u8; IV_SIZE]),
        };
        assert!(matches!(decrypt(&key, &short), Err(Error::Decrypt)));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = key(42);
        let sealed = encrypt(&key, b"").unwrap();
        assert!(decrypt(&key, &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_serialized_field_names() {
        let sealed = encrypt(&key(5), b"x").unwrap();
        let json = serde_json::to_value(&sealed).unwrap();
        assert!(json.get("cipherText").is_some());
        assert!(json.get("iv").is_some());
    }

    #[test]
    fn test_hello_with_passphrase_and_embedded_salt() {
        let params = KdfParams::standard();
        let salt = Salt::from_bytes([11u8; SALT_LENGTH]);

        let derived = derive("correct", Some(&salt), &params).unwrap();
        let sealed = encrypt(&derived.key, b"hello").unwrap();
        let embedded = derived.salt_base64();

        let salt = Salt::from_base64(&embedded).unwrap();
        let right = derive("correct", Some(&salt), &params).unwrap();
        assert_eq!(decrypt_to_string(&right.key, &sealed).unwrap(), "hello");

        let wrong = derive("wrong", Some(&salt), &params).unwrap();
        assert!(matches!(
            decrypt_to_string(&wrong.key, &sealed),
            Err(Error::Decrypt)
        ));
    }
}
