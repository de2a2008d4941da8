//! Single-account share files.
//!
//! A share file carries exactly one account, either encrypted under a
//! passphrase or, when the user explicitly opts out of a passphrase, in plain
//! text:
//!
//! ```json
//! { "version": 1, "type": "share_account",
//!   "encryption": { "salt": "<b64>", "createdAt": "..." },
//!   "encryptedData": { "cipherText": "...", "iv": "..." } }
//!
//! { "version": 1, "type": "share_account", "account": { ... } }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::Zeroizing;

use crate::codec::{decode_account, encode_account};
use crate::config::VaultConfig;
use crate::import::{ImportPlan, ImportResolver};
use crate::model::{Account, Vault};
use crate::snapshot::hostname_from_cookie_domain;
use switchvault_common::{AccountId, Error, Result};
use switchvault_crypto::{decrypt_to_string, derive, derive_key, encrypt, CipherResult, KdfParams, Salt};

/// Version of the share envelope format.
pub const SHARE_FORMAT_VERSION: u32 = 1;

/// Value of the `type` field of every share file.
pub const SHARE_TYPE: &str = "share_account";

/// Key derivation metadata of an encrypted share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareEncryption {
    pub salt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A share file: one account, encrypted or plain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawShareEnvelope", into = "RawShareEnvelope")]
pub enum ShareEnvelope {
    Encrypted {
        encryption: ShareEncryption,
        data: CipherResult,
    },
    Plain {
        account: Account,
    },
}

impl ShareEnvelope {
    /// Parse a share file.
    ///
    /// # Errors
    /// - `Error::Format` if the JSON is malformed, the type or version is
    ///   wrong, or the file does not hold exactly one of the encrypted and
    ///   plain branches
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Format(format!("Invalid share file: {}", e)))
    }

    /// Serialize as the indented JSON written to disk.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Error::from)
    }

    /// True if opening the share needs a passphrase.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, ShareEnvelope::Encrypted { .. })
    }
}

/// Wire form of [`ShareEnvelope`], with both branches optional.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawShareEnvelope {
    version: u32,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encryption: Option<ShareEncryption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_data: Option<CipherResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    account: Option<Account>,
}

impl TryFrom<RawShareEnvelope> for ShareEnvelope {
    type Error = Error;

    fn try_from(raw: RawShareEnvelope) -> Result<Self> {
        if raw.kind != SHARE_TYPE {
            return Err(Error::Format(format!("Not a share file: type {:?}", raw.kind)));
        }
        if raw.version != SHARE_FORMAT_VERSION {
            return Err(Error::Format(format!(
                "Unsupported share version: {}",
                raw.version
            )));
        }

        match (raw.encryption, raw.encrypted_data, raw.account) {
            (Some(encryption), Some(data), None) => Ok(ShareEnvelope::Encrypted { encryption, data }),
            (None, None, Some(account)) => Ok(ShareEnvelope::Plain { account }),
            (Some(_), Some(_), Some(_)) => Err(Error::Format(
                "Share file holds both an encrypted and a plain account".to_string(),
            )),
            _ => Err(Error::Format("Share file holds no account".to_string())),
        }
    }
}

impl From<ShareEnvelope> for RawShareEnvelope {
    fn from(envelope: ShareEnvelope) -> Self {
        let mut raw = RawShareEnvelope {
            version: SHARE_FORMAT_VERSION,
            kind: SHARE_TYPE.to_string(),
            encryption: None,
            encrypted_data: None,
            account: None,
        };
        match envelope {
            ShareEnvelope::Encrypted { encryption, data } => {
                raw.encryption = Some(encryption);
                raw.encrypted_data = Some(data);
            }
            ShareEnvelope::Plain { account } => raw.account = Some(account),
        }
        raw
    }
}

/// Exports single accounts and prepares received ones for import.
#[derive(Debug, Clone)]
pub struct ShareService {
    kdf: KdfParams,
    default_label: String,
    import_label_suffix: String,
    resolver: ImportResolver,
}

impl ShareService {
    /// Service using the KDF parameters and labels of `config`.
    pub fn new(config: &VaultConfig) -> Self {
        Self {
            kdf: config.kdf,
            default_label: config.default_label.clone(),
            import_label_suffix: config.import_label_suffix.clone(),
            resolver: ImportResolver::new(config),
        }
    }

    /// Package an account for sharing.
    ///
    /// `None` writes the account in plain text. `Some` encrypts it exactly as a
    /// backup would, and rejects an empty passphrase.
    pub fn share(&self, account: &Account, passphrase: Option<&str>) -> Result<ShareEnvelope> {
        let envelope = match passphrase {
            Some(passphrase) => {
                let derived = derive(passphrase, None, &self.kdf)?;
                let json = Zeroizing::new(encode_account(account)?);
                ShareEnvelope::Encrypted {
                    encryption: ShareEncryption {
                        salt: derived.salt_base64(),
                        created_at: Some(Utc::now()),
                    },
                    data: encrypt(&derived.key, json.as_bytes())?,
                }
            }
            None => ShareEnvelope::Plain {
                account: account.clone(),
            },
        };

        info!(
            account = %account.id,
            encrypted = envelope.is_encrypted(),
            "Account shared"
        );
        Ok(envelope)
    }

    /// Recover the account held by a share file.
    ///
    /// # Errors
    /// - `Error::InvalidInput` if the share is encrypted and no passphrase is given
    /// - `Error::Decrypt` for a wrong passphrase or corrupted ciphertext
    /// - `Error::Format` if the decrypted payload is not an account
    pub fn open(&self, envelope: &ShareEnvelope, passphrase: Option<&str>) -> Result<Account> {
        match envelope {
            ShareEnvelope::Plain { account } => Ok(account.clone()),
            ShareEnvelope::Encrypted { encryption, data } => {
                let passphrase = passphrase.ok_or_else(|| {
                    Error::InvalidInput("Share file is encrypted, a passphrase is required".to_string())
                })?;
                let salt = Salt::from_base64(&encryption.salt)?;
                let key = derive_key(passphrase.as_bytes(), &salt, &self.kdf)?;
                let json = Zeroizing::new(decrypt_to_string(&key, data)?);
                decode_account(&json)
            }
        }
    }

    /// Open a share file and plan its import.
    ///
    /// The account goes under the site of its first cookie's domain, else
    /// under `fallback_hostname` (the selected site). It gets a fresh UUID,
    /// fresh timestamps and the import label suffix.
    ///
    /// # Errors
    /// - `Error::InvalidInput` if neither a cookie domain nor the fallback
    ///   names the target site
    /// - any error of [`ShareService::open`]
    pub fn import_share(
        &self,
        vault: &Vault,
        envelope: &ShareEnvelope,
        passphrase: Option<&str>,
        fallback_hostname: Option<&str>,
    ) -> Result<ImportPlan> {
        let mut account = self.open(envelope, passphrase)?;

        let hostname = account
            .cookies
            .first()
            .and_then(|c| hostname_from_cookie_domain(&c.domain))
            .or_else(|| {
                fallback_hostname
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(str::to_string)
            })
            .ok_or_else(|| Error::InvalidInput("Unknown site domain".to_string()))?;

        let now = self.resolver.now();
        let base = if account.label.trim().is_empty() {
            self.default_label.as_str()
        } else {
            account.label.as_str()
        };
        account.label = format!("{}{}", base, self.import_label_suffix);
        account.id = AccountId::random_uuid();
        account.created_at = now;
        account.updated_at = now;

        self.resolver.plan_account(vault, &hostname, account)
    }
}

/// File name for a share of `account` written at `now`.
///
/// Path separators and control characters in the label are replaced.
pub fn share_file_name(account: &Account, now: DateTime<Utc>) -> String {
    let label: String = account
        .label
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let label = if label.is_empty() { "unnamed" } else { label.as_str() };
    format!("account-share-{}-{}.json", label, now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::DuplicateResolution;
    use crate::model::Cookie;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use switchvault_common::{local_now, SiteId};

    fn service() -> ShareService {
        let config = VaultConfig {
            kdf: KdfParams::with_iterations(1_000),
            ..VaultConfig::default()
        };
        ShareService::new(&config)
    }

    fn account(domain: &str) -> Account {
        let now = local_now(8);
        Account {
            id: AccountId::generate(),
            site_id: SiteId::from_hostname("example.com"),
            label: "work".to_string(),
            username: Some("alice".to_string()),
            avatar_color: "#60a5fa".to_string(),
            created_at: now,
            updated_at: now,
            cookies: vec![Cookie::new("sid", "secret-session", domain)],
            local_storage: BTreeMap::from([("token".to_string(), "t".to_string())]),
            login_info: None,
        }
    }

    #[test]
    fn test_plain_share_roundtrip() {
        let service = service();
        let original = account(".example.com");
        let envelope = service.share(&original, None).unwrap();
        assert!(!envelope.is_encrypted());

        let parsed = ShareEnvelope::from_json(&envelope.to_json_pretty().unwrap()).unwrap();
        assert_eq!(service.open(&parsed, None).unwrap(), original);
    }

    #[test]
    fn test_encrypted_share_roundtrip() {
        let service = service();
        let original = account(".example.com");
        let envelope = service.share(&original, Some("pw")).unwrap();

        let text = envelope.to_json_pretty().unwrap();
        assert!(!text.contains("secret-session"));

        let parsed = ShareEnvelope::from_json(&text).unwrap();
        assert!(parsed.is_encrypted());
        assert_eq!(service.open(&parsed, Some("pw")).unwrap(), original);
    }

    #[test]
    fn test_encrypted_share_errors() {
        let service = service();
        let envelope = service.share(&account(".example.com"), Some("pw")).unwrap();

        assert!(matches!(service.open(&envelope, None), Err(Error::InvalidInput(_))));
        assert!(matches!(service.open(&envelope, Some("nope")), Err(Error::Decrypt)));
        assert!(matches!(
            service.share(&account(".example.com"), Some("")),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_envelope_json_shape() {
        let service = service();
        let plain: serde_json::Value =
            serde_json::to_value(service.share(&account("a.com"), None).unwrap()).unwrap();
        assert_eq!(plain["type"], "share_account");
        assert_eq!(plain["version"], 1);
        assert!(plain["account"]["id"].is_string());
        assert!(plain.get("encryption").is_none());

        let sealed: serde_json::Value =
            serde_json::to_value(service.share(&account("a.com"), Some("pw")).unwrap()).unwrap();
        assert!(sealed["encryption"]["salt"].is_string());
        assert!(sealed["encryptedData"]["cipherText"].is_string());
        assert!(sealed.get("account").is_none());
    }

    #[test]
    fn test_envelope_shape_errors() {
        let service = service();
        let plain = serde_json::to_value(service.share(&account("a.com"), None).unwrap()).unwrap();
        let sealed =
            serde_json::to_value(service.share(&account("a.com"), Some("pw")).unwrap()).unwrap();

        let mut both = sealed.clone();
        both["account"] = plain["account"].clone();
        let mut neither = plain.clone();
        neither.as_object_mut().unwrap().remove("account");
        let mut half = sealed.clone();
        half.as_object_mut().unwrap().remove("encryptedData");
        let mut wrong_type = plain.clone();
        wrong_type["type"] = "backup".into();
        let mut wrong_version = plain.clone();
        wrong_version["version"] = 2.into();
        let mut no_version = plain.clone();
        no_version.as_object_mut().unwrap().remove("version");

        for value in [both, neither, half, wrong_type, wrong_version, no_version] {
            assert!(
                matches!(ShareEnvelope::from_json(&value.to_string()), Err(Error::Format(_))),
                "accepted {}",
                value
            );
        }
    }

    #[test]
    fn test_import_uses_cookie_domain() {
        let service = service();
        let original = account(".shop.example.com");
        let envelope = service.share(&original, Some("pw")).unwrap();

        let mut vault = Vault::new();
        let plan = service
            .import_share(&vault, &envelope, Some("pw"), Some("other.com"))
            .unwrap();

        assert_eq!(plan.hostname(), "shop.example.com");
        let candidate = plan.candidate();
        assert_ne!(candidate.id, original.id);
        assert!(uuid::Uuid::parse_str(candidate.id.as_str()).is_ok());
        assert_eq!(candidate.label, "work (imported)");
        assert_eq!(candidate.site_id.as_str(), "shop.example.com");
        assert_eq!(candidate.cookies, original.cookies);
        assert!(candidate.created_at >= original.created_at);

        ImportResolver::new(&VaultConfig::default())
            .apply(&mut vault, plan, DuplicateResolution::AddNew)
            .unwrap();
        assert_eq!(vault.account_count(), 1);
    }

    #[test]
    fn test_import_falls_back_to_active_site() {
        let service = service();
        let mut original = account("");
        original.label = String::new();
        let envelope = service.share(&original, None).unwrap();

        let plan = service
            .import_share(&Vault::new(), &envelope, None, Some("active.com"))
            .unwrap();
        assert_eq!(plan.hostname(), "active.com");
        assert_eq!(plan.candidate().label, "Unnamed account (imported)");

        let err = service
            .import_share(&Vault::new(), &envelope, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_share_file_name() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let mut acct = account("a.com");
        assert_eq!(share_file_name(&acct, now), "account-share-work-1700000000000.json");

        acct.label = "a/b".to_string();
        assert_eq!(share_file_name(&acct, now), "account-share-a_b-1700000000000.json");

        acct.label = " ".to_string();
        assert_eq!(share_file_name(&acct, now), "account-share-unnamed-1700000000000.json");
    }
}
