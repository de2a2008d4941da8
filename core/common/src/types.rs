//! Common types used throughout SwitchVault.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account timestamp, always carrying an explicit UTC offset.
pub type Timestamp = DateTime<FixedOffset>;

/// Current time expressed at a fixed UTC offset.
///
/// Out-of-range offsets fall back to UTC.
pub fn local_now(offset_hours: i32) -> Timestamp {
    let offset = offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&offset)
}

/// Identifier of a site: the lowercased hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    /// Derive the site id for a hostname.
    ///
    /// Two hostnames differing only in case map to the same id.
    pub fn from_hostname(hostname: &str) -> Self {
        Self(hostname.trim().to_lowercase())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SiteId {
    fn from(value: &str) -> Self {
        Self::from_hostname(value)
    }
}

/// Opaque, vault-unique account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a time-ordered id of the form `acct_<millis36>_<random36>`.
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let mut rng = rand::thread_rng();
        let suffix: String = (0..6)
            .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
            .collect();
        Self(format!("acct_{}_{}", to_base36(millis), suffix))
    }

    /// Generate a random UUID v4 id, used for accounts received from a share file.
    pub fn random_uuid() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_id_is_lowercase_hostname() {
        let id = SiteId::from_hostname("WWW.Example.COM");
        assert_eq!(id.as_str(), "www.example.com");
        assert_eq!(id, SiteId::from("www.example.com"));
    }

    #[test]
    fn test_account_id_shape() {
        let id = AccountId::generate();
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "acct");
        assert_eq!(parts[2].len(), 6);
        assert!(parts[1].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_account_ids_differ() {
        assert_ne!(AccountId::generate(), AccountId::generate());
        assert_ne!(AccountId::random_uuid(), AccountId::random_uuid());
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_local_now_offset() {
        let now = local_now(8);
        assert_eq!(now.offset().local_minus_utc(), 8 * 3600);
        assert!(now.to_rfc3339().ends_with("+08:00"));

        let fallback = local_now(1000);
        assert_eq!(fallback.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_ids_serialize_as_strings() {
        let json = serde_json::to_string(&SiteId::from_hostname("a.com")).unwrap();
        assert_eq!(json, "\"a.com\"");
        let id: AccountId = serde_json::from_str("\"acct_1\"").unwrap();
        assert_eq!(id.as_str(), "acct_1");
    }
}
