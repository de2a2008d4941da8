//! Account identity fingerprints used for de-duplication.
//!
//! Two accounts are the same logical account iff their fingerprints are
//! equal. The identity is coarse: user name, label, and the values of a few
//! well-known session cookies and local-storage keys. Accounts that carry none
//! of these and share a label collide, and are treated as duplicates.

use blake2::{digest::consts::U32, Blake2b, Digest};
use std::fmt;

use crate::model::Account;

type Blake2b256 = Blake2b<U32>;

/// Cookie names (compared lowercased) that identify a session.
pub const IDENTITY_COOKIES: [&str; 6] = ["user", "username", "uid", "sid", "session", "token"];

/// Local-storage keys (compared exactly) that identify a session, in
/// fingerprint order.
pub const IDENTITY_STORAGE_KEYS: [&str; 4] = ["user", "username", "uid", "token"];

const DOMAIN_TAG: &[u8] = b"switchvault.fingerprint.v1";

/// The ordered identity tuple an account is fingerprinted over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFields<'a> {
    pub username: &'a str,
    pub label: &'a str,
    /// Identity cookies in the account's cookie order. Empty values are kept.
    pub cookies: Vec<(&'a str, &'a str)>,
    /// Identity storage entries in [`IDENTITY_STORAGE_KEYS`] order. Empty
    /// values are skipped.
    pub storage: Vec<(&'a str, &'a str)>,
}

impl<'a> IdentityFields<'a> {
    /// Extract the identity fields of an account.
    pub fn of(account: &'a Account) -> Self {
        let cookies = account
            .cookies
            .iter()
            .filter(|c| IDENTITY_COOKIES.contains(&c.name.to_lowercase().as_str()))
            .map(|c| (c.name.as_str(), c.value.as_str()))
            .collect();

        let storage = IDENTITY_STORAGE_KEYS
            .iter()
            .filter_map(|key| {
                account
                    .local_storage
                    .get_key_value(*key)
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(k, v)| (k.as_str(), v.as_str()))
            })
            .collect();

        Self {
            username: account.username.as_deref().unwrap_or(""),
            label: &account.label,
            cookies,
            storage,
        }
    }

    /// The delimiter-joined form older versions of the extension compared.
    ///
    /// `|#|` may occur inside values, so distinct identities can produce the
    /// same legacy string. Kept for diagnostics only.
    pub fn legacy_string(&self) -> String {
        let join = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(";")
        };
        [
            self.username.to_string(),
            self.label.to_string(),
            join(&self.cookies),
            join(&self.storage),
        ]
        .join("|#|")
    }

    fn digest(&self) -> Fingerprint {
        let mut hasher = Blake2b256::new();
        hasher.update(DOMAIN_TAG);
        put(&mut hasher, self.username.as_bytes());
        put(&mut hasher, self.label.as_bytes());
        for pairs in [&self.cookies, &self.storage] {
            hasher.update((pairs.len() as u64).to_le_bytes());
            for (k, v) in pairs.iter() {
                put(&mut hasher, k.as_bytes());
                put(&mut hasher, v.as_bytes());
            }
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }
}

fn put(hasher: &mut Blake2b256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Hex-encoded digest of an account's identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Get the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compute the fingerprint of an account.
pub fn fingerprint(account: &Account) -> Fingerprint {
    IdentityFields::of(account).digest()
}
