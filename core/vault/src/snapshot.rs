//! Session snapshots and the provider that captures and applies them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::model::{Account, Cookie, LoginInfo, SiteInfo};
use switchvault_common::{Error, Result};

/// Page-level state captured alongside cookies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_info: Option<LoginInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_info: Option<SiteInfo>,
}

/// Everything needed to restore one login session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub page_state: PageState,
}

impl Snapshot {
    /// Snapshot that restores a stored account.
    pub fn from_account(account: &Account) -> Self {
        Self {
            cookies: account.cookies.clone(),
            page_state: PageState {
                local_storage: account.local_storage.clone(),
                login_info: account.login_info.clone(),
                site_info: None,
            },
        }
    }
}

/// The page a snapshot is captured from or applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteContext {
    url: String,
}

impl SiteContext {
    /// Context for an arbitrary page URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Context for the root page of a hostname.
    pub fn for_hostname(hostname: &str) -> Self {
        Self::new(format!("https://{}/", hostname))
    }

    /// The page URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Hostname of the page, if it is a regular web page.
    pub fn hostname(&self) -> Option<String> {
        hostname_from_url(&self.url)
    }
}

/// Schemes of browser-internal pages that never hold site sessions.
const INTERNAL_SCHEMES: [&str; 3] = ["chrome", "edge", "about"];

/// Extract the hostname of a web page URL.
///
/// Returns `None` for unparsable URLs, URLs without a host and browser
/// internal pages.
pub fn hostname_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if INTERNAL_SCHEMES.contains(&url.scheme()) {
        return None;
    }
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_string())
}

/// Hostname named by a cookie domain attribute.
///
/// The leading dot of a domain cookie is dropped; the remainder must be a
/// valid host.
pub fn hostname_from_cookie_domain(domain: &str) -> Option<String> {
    let domain = domain.trim().trim_start_matches('.');
    if domain.is_empty() {
        return None;
    }
    let url = Url::parse(&format!("https://{}/", domain)).ok()?;
    url.host_str().map(|h| h.to_string())
}

/// Source and sink of session snapshots, typically a browser.
///
/// The vault core never touches cookies or page storage directly; everything
/// goes through this trait.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Capture the current session of the page.
    ///
    /// # Errors
    /// - `Error::Snapshot` if the page cannot be read
    async fn capture_snapshot(&self, context: &SiteContext) -> Result<Snapshot>;

    /// Replace the session of the page with `snapshot`.
    ///
    /// # Errors
    /// - `Error::Snapshot` if the page cannot be written
    async fn apply_snapshot(&self, context: &SiteContext, snapshot: &Snapshot) -> Result<()>;
}

/// Provider holding one session per hostname in memory.
///
/// Stands in for a browser in tests and offline tools.
#[derive(Debug, Default)]
pub struct StaticSnapshotProvider {
    snapshots: std::sync::Mutex<BTreeMap<String, Snapshot>>,
}

impl StaticSnapshotProvider {
    /// Empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session a later capture of `hostname` returns.
    pub fn insert(&self, hostname: &str, snapshot: Snapshot) -> Result<()> {
        self.lock()?.insert(hostname.to_lowercase(), snapshot);
        Ok(())
    }

    /// The session currently held for `hostname`.
    pub fn current(&self, hostname: &str) -> Result<Option<Snapshot>> {
        Ok(self.lock()?.get(&hostname.to_lowercase()).cloned())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Snapshot>>> {
        self.snapshots
            .lock()
            .map_err(|_| Error::Snapshot("snapshot table lock poisoned".to_string()))
    }

    fn host_of(context: &SiteContext) -> Result<String> {
        context
            .hostname()
            .map(|h| h.to_lowercase())
            .ok_or_else(|| Error::Snapshot(format!("Not a web page: {}", context.url())))
    }
}

#[async_trait]
impl SnapshotProvider for StaticSnapshotProvider {
    async fn capture_snapshot(&self, context: &SiteContext) -> Result<Snapshot> {
        let host = Self::host_of(context)?;
        Ok(self.lock()?.get(&host).cloned().unwrap_or_default())
    }

    async fn apply_snapshot(&self, context: &SiteContext, snapshot: &Snapshot) -> Result<()> {
        let host = Self::host_of(context)?;
        self.lock()?.insert(host, snapshot.clone());
        Ok(())
    }
}
