//! Whole-vault encrypted backups.
//!
//! A backup file is a JSON envelope:
//!
//! ```json
//! {
//!   "version": 1,
//!   "encryption": { "salt": "<b64>", "test": { "cipherText": "...", "iv": "..." }, "createdAt": "..." },
//!   "encryptedAccounts": { "cipherText": "...", "iv": "..." },
//!   "exportedAt": "..."
//! }
//! ```
//!
//! `encryptedAccounts` holds the versioned vault document. Restoring replaces
//! the whole vault.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::codec::{decode_vault_document, encode_vault_document};
use crate::model::Vault;
use switchvault_common::{Error, Result};
use switchvault_crypto::{
    decrypt, decrypt_to_string, derive, derive_key, encrypt, CipherResult, KdfParams, Salt,
    SymmetricKey,
};

/// Version of the backup envelope format.
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Plaintext of the verification block written into new backups.
const VERIFICATION_PLAINTEXT: &[u8] = b"switchvault-backup-v1";

fn default_version() -> u32 {
    BACKUP_FORMAT_VERSION
}

/// Key derivation metadata of a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEncryption {
    /// Base64 of the 16-byte PBKDF2 salt.
    pub salt: String,
    /// Block encrypted under the same key, used to check a passphrase
    /// without decrypting the vault. Older files repeat `encryptedAccounts`
    /// here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<CipherResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEnvelope {
    /// Files written before versioning carry no version and are read as 1.
    #[serde(default = "default_version")]
    pub version: u32,
    pub encryption: BackupEncryption,
    pub encrypted_accounts: CipherResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
}

impl BackupEnvelope {
    /// Parse a backup file.
    ///
    /// # Errors
    /// - `Error::Format` if the JSON is malformed, a required field is
    ///   missing, or the version is not supported
    pub fn from_json(text: &str) -> Result<Self> {
        let envelope: Self = serde_json::from_str(text)
            .map_err(|e| Error::Format(format!("Invalid backup file: {}", e)))?;
        if envelope.version != BACKUP_FORMAT_VERSION {
            return Err(Error::Format(format!(
                "Unsupported backup version: {}",
                envelope.version
            )));
        }
        Ok(envelope)
    }

    /// Serialize as the indented JSON written to disk.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Error::from)
    }

    /// Check a passphrase against the envelope without restoring.
    ///
    /// Returns `Ok(false)` for a wrong passphrase.
    pub fn verify_passphrase(&self, passphrase: &str, kdf: &KdfParams) -> Result<bool> {
        let key = self.key_for(passphrase, kdf)?;
        let block = self
            .encryption
            .test
            .as_ref()
            .unwrap_or(&self.encrypted_accounts);
        match decrypt(&key, block) {
            Ok(_) => Ok(true),
            Err(Error::Decrypt) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn key_for(&self, passphrase: &str, kdf: &KdfParams) -> Result<SymmetricKey> {
        let salt = Salt::from_base64(&self.encryption.salt)?;
        derive_key(passphrase.as_bytes(), &salt, kdf)
    }
}

/// Produces and restores whole-vault backups.
#[derive(Debug, Clone, Default)]
pub struct BackupService {
    kdf: KdfParams,
}

impl BackupService {
    /// Service deriving keys with `kdf`.
    pub fn new(kdf: KdfParams) -> Self {
        Self { kdf }
    }

    /// Encrypt the whole vault under `passphrase` with a fresh salt.
    ///
    /// # Errors
    /// - `Error::InvalidInput` if the passphrase is empty
    pub fn backup(&self, vault: &Vault, passphrase: &str) -> Result<BackupEnvelope> {
        let derived = derive(passphrase, None, &self.kdf)?;
        let document = Zeroizing::new(encode_vault_document(vault)?);

        let encrypted_accounts = encrypt(&derived.key, document.as_bytes())?;
        let test = encrypt(&derived.key, VERIFICATION_PLAINTEXT)?;
        let now = Utc::now();

        info!(
            sites = vault.len(),
            accounts = vault.account_count(),
            "Backup created"
        );

        Ok(BackupEnvelope {
            version: BACKUP_FORMAT_VERSION,
            encryption: BackupEncryption {
                salt: derived.salt_base64(),
                test: Some(test),
                created_at: Some(now),
            },
            encrypted_accounts,
            exported_at: Some(now),
        })
    }

    /// Decrypt and decode the vault held by a backup.
    ///
    /// # Errors
    /// - `Error::Decrypt` for a wrong passphrase or corrupted ciphertext
    /// - `Error::Format` if the salt or the decrypted document is malformed
    pub fn restore(&self, envelope: &BackupEnvelope, passphrase: &str) -> Result<Vault> {
        let key = envelope.key_for(passphrase, &self.kdf)?;
        let document = Zeroizing::new(decrypt_to_string(&key, &envelope.encrypted_accounts)?);
        let vault = decode_vault_document(&document)?;

        debug!(
            sites = vault.len(),
            accounts = vault.account_count(),
            "Backup decrypted"
        );
        Ok(vault)
    }
}

/// File name for a backup written at `now`.
pub fn backup_file_name(now: DateTime<Utc>) -> String {
    format!("multi-account-backup-{}.json", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use crate::import::{DuplicateResolution, ImportResolver};
    use crate::model::Cookie;
    use crate::snapshot::Snapshot;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use switchvault_common::SiteId;

    fn fast() -> BackupService {
        BackupService::new(KdfParams::with_iterations(1_000))
    }

    fn vault_of(entries: &[(&str, &str)]) -> Vault {
        let resolver = ImportResolver::new(&VaultConfig::default());
        let mut vault = Vault::new();
        for (host, sid) in entries {
            let snapshot = Snapshot {
                cookies: vec![Cookie::new("sid", *sid, format!(".{}", host))],
                ..Snapshot::default()
            };
            let plan = resolver.plan_capture(&vault, host, snapshot).unwrap();
            resolver
                .apply(&mut vault, plan, DuplicateResolution::AddNew)
                .unwrap();
        }
        vault
    }

    #[test]
    fn test_backup_restore_roundtrip() {
        let mut vault = vault_of(&[("a.com", "1"), ("b.com", "2"), ("a.com", "3")]);
        vault.set_pinned(&SiteId::from_hostname("b.com"), true).unwrap();

        let service = fast();
        let envelope = service.backup(&vault, "passphrase").unwrap();
        let restored = service.restore(&envelope, "passphrase").unwrap();

        assert_eq!(restored, vault);
    }

    #[test]
    fn test_wrong_passphrase() {
        let service = fast();
        let envelope = service.backup(&vault_of(&[("a.com", "1")]), "correct").unwrap();

        assert!(matches!(
            service.restore(&envelope, "wrong"),
            Err(Error::Decrypt)
        ));
        assert!(!envelope
            .verify_passphrase("wrong", &KdfParams::with_iterations(1_000))
            .unwrap());
        assert!(envelope
            .verify_passphrase("correct", &KdfParams::with_iterations(1_000))
            .unwrap());
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        assert!(matches!(
            fast().backup(&Vault::new(), ""),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_envelope_json_shape() {
        let envelope = fast().backup(&Vault::new(), "pw").unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&envelope.to_json_pretty().unwrap()).unwrap();

        assert_eq!(json["version"], 1);
        assert!(json["encryption"]["salt"].is_string());
        assert!(json["encryption"]["test"]["cipherText"].is_string());
        assert!(json["encryption"]["createdAt"].is_string());
        assert!(json["encryptedAccounts"]["iv"].is_string());
        assert!(json["exportedAt"].is_string());
    }

    #[test]
    fn test_fresh_salt_per_backup() {
        let service = fast();
        let vault = Vault::new();
        let a = service.backup(&vault, "pw").unwrap();
        let b = service.backup(&vault, "pw").unwrap();
        assert_ne!(a.encryption.salt, b.encryption.salt);
    }

    #[test]
    fn test_legacy_envelope_without_version() {
        let service = fast();
        let envelope = service.backup(&vault_of(&[("a.com", "1")]), "pw").unwrap();

        let mut json = serde_json::to_value(&envelope).unwrap();
        json.as_object_mut().unwrap().remove("version");
        let accounts = json["encryptedAccounts"].clone();
        json["encryption"]["test"] = accounts;

        let legacy = BackupEnvelope::from_json(&json.to_string()).unwrap();
        assert_eq!(legacy.version, 1);
        assert!(legacy
            .verify_passphrase("pw", &KdfParams::with_iterations(1_000))
            .unwrap());
        assert_eq!(service.restore(&legacy, "pw").unwrap().account_count(), 1);
    }

    #[test]
    fn test_envelope_format_errors() {
        let envelope = fast().backup(&Vault::new(), "pw").unwrap();
        let good = serde_json::to_value(&envelope).unwrap();

        let mut bad_version = good.clone();
        bad_version["version"] = 2.into();
        let mut no_salt = good.clone();
        no_salt["encryption"].as_object_mut().unwrap().remove("salt");
        let mut no_payload = good.clone();
        no_payload.as_object_mut().unwrap().remove("encryptedAccounts");

        for value in [bad_version, no_salt, no_payload] {
            assert!(matches!(
                BackupEnvelope::from_json(&value.to_string()),
                Err(Error::Format(_))
            ));
        }
        assert!(matches!(
            BackupEnvelope::from_json("[]"),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_bad_salt_is_format_error() {
        let service = fast();
        let mut envelope = service.backup(&Vault::new(), "pw").unwrap();
        envelope.encryption.salt = "not base64!".to_string();
        assert!(matches!(
            service.restore(&envelope, "pw"),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_file_name() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(backup_file_name(now), "multi-account-backup-1700000000123.json");
    }

    #[test]
    fn test_roundtrip_standard_iterations() {
        let service = BackupService::default();
        let vault = vault_of(&[("example.com", "s")]);
        let envelope = service.backup(&vault, "correct").unwrap();
        assert_eq!(service.restore(&envelope, "correct").unwrap(), vault);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn prop_restore_inverts_backup(
            entries in proptest::collection::vec(("[a-z]{1,8}\\.(com|org)", "[a-zA-Z0-9]{0,12}"), 0..6),
            passphrase in "[ -~]{1,24}",
        ) {
            let refs: Vec<(&str, &str)> = entries
                .iter()
                .map(|(h, s)| (h.as_str(), s.as_str()))
                .collect();
            let vault = vault_of(&refs);
            let service = fast();
            let envelope = service.backup(&vault, &passphrase).unwrap();
            prop_assert_eq!(service.restore(&envelope, &passphrase).unwrap(), vault);
        }
    }
}
