//! Site and account data model.
//!
//! Field names serialize in camelCase so that stored vaults, backups and share
//! files stay readable by the browser extension that produces them.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use switchvault_common::{AccountId, SiteId, Timestamp};

/// Fixed avatar palette accounts draw their color from.
pub const AVATAR_PALETTE: [&str; 17] = [
    "#f87171", "#fb923c", "#facc15", "#a3e635", "#4ade80", "#22c55e", "#34d399", "#2dd4bf",
    "#38bdf8", "#60a5fa", "#3b82f6", "#818cf8", "#a78bfa", "#c084fc", "#e879f9", "#f472b6",
    "#fb7185",
];

/// Pick a random color from [`AVATAR_PALETTE`].
pub fn random_avatar_color() -> String {
    AVATAR_PALETTE
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(AVATAR_PALETTE[0])
        .to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// A browser cookie as captured by the snapshot provider.
///
/// Fields the core does not interpret (`hostOnly`, `storeId`, ...) are kept
/// in `extra` so they survive a round trip.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Cookie {
    /// Session cookie with default attributes.
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_cookie_path(),
            secure: false,
            http_only: false,
            same_site: None,
            expiration_date: None,
            extra: Map::new(),
        }
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Login hints observed on the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LoginInfo {
    /// The best available user name: `username`, else `hint`.
    pub fn display_name(&self) -> Option<&str> {
        [self.username.as_deref(), self.hint.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
    }
}

/// Page metadata used to name a site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// A web origin accounts are grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: SiteId,
    pub hostname: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
}

impl Site {
    /// New unpinned site named after its hostname.
    pub fn new(hostname: &str) -> Self {
        let hostname = hostname.trim().to_string();
        Self {
            id: SiteId::from_hostname(&hostname),
            display_name: hostname.clone(),
            hostname,
            favicon_url: None,
            is_pinned: false,
        }
    }

    /// True while the display name has never been changed from the hostname.
    pub fn has_default_name(&self) -> bool {
        self.display_name == self.hostname
    }
}

/// One captured login for a site.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub site_id: SiteId,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_color: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_info: Option<LoginInfo>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("site_id", &self.site_id)
            .field("label", &self.label)
            .field("username", &self.username)
            .field("cookies", &self.cookies.len())
            .field("local_storage_keys", &self.local_storage.keys().collect::<Vec<_>>())
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// A site and its ordered accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteGroup {
    pub site: Site,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

impl SiteGroup {
    /// Group for a new site without accounts.
    pub fn new(site: Site) -> Self {
        Self {
            site,
            accounts: Vec::new(),
        }
    }

    /// Find an account of this site by id.
    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.iter().find(|a| &a.id == id)
    }
}

/// The ordered list of site groups.
///
/// Pinned groups always precede unpinned ones; within each partition the
/// order is the user's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vault {
    pub(crate) sites: Vec<SiteGroup>,
}

impl Vault {
    /// Empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a vault from groups, restoring the pinned-first order.
    pub fn from_groups(sites: Vec<SiteGroup>) -> Self {
        let mut vault = Self { sites };
        vault.normalize_pin_order();
        vault
    }

    /// Groups in display order.
    pub fn groups(&self) -> &[SiteGroup] {
        &self.sites
    }

    /// Consume the vault, returning its groups.
    pub fn into_groups(self) -> Vec<SiteGroup> {
        self.sites
    }

    /// Number of site groups.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// True if there are no site groups.
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Total number of accounts across all sites.
    pub fn account_count(&self) -> usize {
        self.sites.iter().map(|g| g.accounts.len()).sum()
    }

    /// Find a site group by id.
    pub fn group(&self, site_id: &SiteId) -> Option<&SiteGroup> {
        self.sites.iter().find(|g| &g.site.id == site_id)
    }

    pub(crate) fn group_mut(&mut self, site_id: &SiteId) -> Option<&mut SiteGroup> {
        self.sites.iter_mut().find(|g| &g.site.id == site_id)
    }

    pub(crate) fn position(&self, site_id: &SiteId) -> Option<usize> {
        self.sites.iter().position(|g| &g.site.id == site_id)
    }

    /// Find an account anywhere in the vault, with the site it belongs to.
    pub fn find_account(&self, id: &AccountId) -> Option<(&Site, &Account)> {
        self.sites
            .iter()
            .find_map(|g| g.account(id).map(|a| (&g.site, a)))
    }

    pub(crate) fn find_account_mut(&mut self, id: &AccountId) -> Option<&mut Account> {
        self.sites
            .iter_mut()
            .flat_map(|g| g.accounts.iter_mut())
            .find(|a| &a.id == id)
    }

    /// True if every pinned group precedes every unpinned group.
    pub fn is_pin_ordered(&self) -> bool {
        self.sites
            .windows(2)
            .all(|w| w[0].site.is_pinned || !w[1].site.is_pinned)
    }

    /// Stable partition: pinned groups first, relative order preserved.
    pub(crate) fn normalize_pin_order(&mut self) {
        self.sites.sort_by_key(|g| !g.site.is_pinned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchvault_common::local_now;

    fn account(id: &str, site: &str) -> Account {
        let now = local_now(8);
        Account {
            id: AccountId::new(id),
            site_id: SiteId::from_hostname(site),
            label: "work".to_string(),
            username: Some("alice".to_string()),
            avatar_color: random_avatar_color(),
            created_at: now,
            updated_at: now,
            cookies: vec![Cookie::new("sid", "s3cret", ".example.com")],
            local_storage: BTreeMap::from([("token".to_string(), "t0k3n".to_string())]),
            login_info: None,
        }
    }

    #[test]
    fn test_site_defaults() {
        let site = Site::new("Example.com");
        assert_eq!(site.id.as_str(), "example.com");
        assert_eq!(site.display_name, "Example.com");
        assert!(site.has_default_name());
        assert!(!site.is_pinned);
    }

    #[test]
    fn test_account_json_field_names() {
        let json = serde_json::to_value(account("a1", "example.com")).unwrap();
        for field in ["id", "siteId", "label", "avatarColor", "createdAt", "updatedAt", "cookies", "localStorage"] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert!(json.get("loginInfo").is_none());
        assert!(json["createdAt"].as_str().unwrap().ends_with("+08:00"));
    }

    #[test]
    fn test_cookie_keeps_unknown_fields() {
        let raw = r#"{"name":"sid","value":"v","domain":".a.com","path":"/","secure":true,
            "httpOnly":true,"sameSite":"lax","hostOnly":false,"storeId":"0"}"#;
        let cookie: Cookie = serde_json::from_str(raw).unwrap();
        assert!(cookie.http_only);
        assert_eq!(cookie.extra.get("storeId"), Some(&Value::from("0")));

        let back = serde_json::to_value(&cookie).unwrap();
        assert_eq!(back["hostOnly"], Value::from(false));
        assert!(back.get("expirationDate").is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", account("a1", "example.com"));
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("t0k3n"));
        assert!(rendered.contains("token"));
    }

    #[test]
    fn test_legacy_site_without_pin_flag() {
        let raw = r#"{"site":{"id":"a.com","hostname":"a.com","displayName":"A"}}"#;
        let group: SiteGroup = serde_json::from_str(raw).unwrap();
        assert!(!group.site.is_pinned);
        assert!(group.accounts.is_empty());
    }

    #[test]
    fn test_login_info_display_name() {
        let info = LoginInfo {
            username: Some(String::new()),
            hint: Some("al***@mail.com".to_string()),
            extra: Map::new(),
        };
        assert_eq!(info.display_name(), Some("al***@mail.com"));
        assert_eq!(LoginInfo::default().display_name(), None);
    }

    #[test]
    fn test_from_groups_restores_pin_order() {
        let mut pinned = Site::new("b.com");
        pinned.is_pinned = true;
        let vault = Vault::from_groups(vec![
            SiteGroup::new(Site::new("a.com")),
            SiteGroup::new(pinned),
            SiteGroup::new(Site::new("c.com")),
        ]);

        let order: Vec<&str> = vault.groups().iter().map(|g| g.site.id.as_str()).collect();
        assert_eq!(order, ["b.com", "a.com", "c.com"]);
        assert!(vault.is_pin_ordered());
    }

    #[test]
    fn test_find_account() {
        let mut group = SiteGroup::new(Site::new("example.com"));
        group.accounts.push(account("a1", "example.com"));
        let vault = Vault::from_groups(vec![group]);

        let (site, acct) = vault.find_account(&AccountId::new("a1")).unwrap();
        assert_eq!(site.hostname, "example.com");
        assert_eq!(acct.label, "work");
        assert!(vault.find_account(&AccountId::new("missing")).is_none());
        assert_eq!(vault.account_count(), 1);
    }

    #[test]
    fn test_palette_color() {
        assert!(AVATAR_PALETTE.contains(&random_avatar_color().as_str()));
    }
}
