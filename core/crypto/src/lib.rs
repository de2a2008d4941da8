//! Cryptographic primitives for SwitchVault.
//!
//! This module provides:
//! - Key derivation using PBKDF2-HMAC-SHA256
//! - Authenticated encryption using AES-256-GCM
//! - Key types with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Every encryption uses a fresh random IV

pub mod aead;
pub mod kdf;
pub mod keys;

pub use aead::{decrypt, decrypt_to_string, encrypt, CipherResult};
pub use kdf::{derive, derive_key, DerivedKey, KdfParams, PBKDF2_ITERATIONS};
pub use keys::{Salt, SymmetricKey, KEY_LENGTH, SALT_LENGTH};
