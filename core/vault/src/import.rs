//! Import resolution: new account or duplicate of an existing one.
//!
//! Resolution is two-phase. Planning looks for an account with the same
//! fingerprint under the target site without touching the vault; the caller
//! then commits the plan with an explicit [`DuplicateResolution`].

use tracing::{debug, warn};

use crate::config::VaultConfig;
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::model::{random_avatar_color, Account, SiteInfo, Vault};
use crate::snapshot::Snapshot;
use switchvault_common::{local_now, AccountId, Error, Result, SiteId, Timestamp};

/// What to do when a candidate matches an existing account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateResolution {
    /// Overwrite the session data of the existing account.
    Update,
    /// Keep both, adding the candidate as a distinct account.
    AddNew,
}

/// Result of committing an [`ImportPlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Added(AccountId),
    Updated(AccountId),
}

impl ImportOutcome {
    /// Id of the account that was added or updated.
    pub fn account_id(&self) -> &AccountId {
        match self {
            ImportOutcome::Added(id) | ImportOutcome::Updated(id) => id,
        }
    }
}

/// A candidate account together with its duplicate check.
#[derive(Debug, Clone)]
pub struct ImportPlan {
    hostname: String,
    site_info: Option<SiteInfo>,
    candidate: Account,
    fingerprint: Fingerprint,
    duplicate_of: Option<AccountId>,
}

impl ImportPlan {
    /// Hostname of the site the candidate goes under.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The account that would be added.
    pub fn candidate(&self) -> &Account {
        &self.candidate
    }

    /// Fingerprint of the candidate.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Existing account with the same fingerprint, if any.
    pub fn duplicate_of(&self) -> Option<&AccountId> {
        self.duplicate_of.as_ref()
    }

    /// True when committing needs a [`DuplicateResolution`] decision.
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

/// Builds candidate accounts and applies import plans to a vault.
#[derive(Debug, Clone)]
pub struct ImportResolver {
    default_label: String,
    utc_offset_hours: i32,
}

impl ImportResolver {
    /// Resolver using the labels and time offset of `config`.
    pub fn new(config: &VaultConfig) -> Self {
        Self {
            default_label: config.default_label.clone(),
            utc_offset_hours: config.utc_offset_hours,
        }
    }

    /// Current time at the configured offset.
    pub fn now(&self) -> Timestamp {
        local_now(self.utc_offset_hours)
    }

    /// Build a fresh account from a captured snapshot.
    ///
    /// The label is the hostname, else the observed user name, else the
    /// configured default.
    pub fn build_candidate(&self, hostname: &str, snapshot: Snapshot) -> Account {
        let page = snapshot.page_state;
        let username = page
            .login_info
            .as_ref()
            .and_then(|info| info.display_name())
            .map(str::to_string);

        let hostname = hostname.trim();
        let label = if !hostname.is_empty() {
            hostname.to_string()
        } else {
            username
                .clone()
                .unwrap_or_else(|| self.default_label.clone())
        };

        let now = self.now();
        Account {
            id: AccountId::generate(),
            site_id: SiteId::from_hostname(hostname),
            label,
            username,
            avatar_color: random_avatar_color(),
            created_at: now,
            updated_at: now,
            cookies: snapshot.cookies,
            local_storage: page.local_storage,
            login_info: page.login_info,
        }
    }

    /// Plan the import of a captured snapshot under `hostname`.
    ///
    /// # Errors
    /// - `Error::InvalidInput` if the hostname is empty
    pub fn plan_capture(&self, vault: &Vault, hostname: &str, snapshot: Snapshot) -> Result<ImportPlan> {
        let site_info = snapshot.page_state.site_info.clone();
        let candidate = self.build_candidate(hostname, snapshot);
        self.plan(vault, hostname, site_info, candidate)
    }

    /// Plan the import of an already built account under `hostname`.
    ///
    /// The account is re-homed to the site of `hostname`.
    pub fn plan_account(&self, vault: &Vault, hostname: &str, mut account: Account) -> Result<ImportPlan> {
        account.site_id = SiteId::from_hostname(hostname);
        self.plan(vault, hostname, None, account)
    }

    fn plan(
        &self,
        vault: &Vault,
        hostname: &str,
        site_info: Option<SiteInfo>,
        candidate: Account,
    ) -> Result<ImportPlan> {
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return Err(Error::InvalidInput("Hostname cannot be empty".to_string()));
        }

        let candidate_fp = fingerprint(&candidate);
        let duplicate_of = vault
            .group(&candidate.site_id)
            .and_then(|group| {
                group
                    .accounts
                    .iter()
                    .find(|existing| fingerprint(existing) == candidate_fp)
            })
            .map(|existing| existing.id.clone());

        Ok(ImportPlan {
            hostname: hostname.to_string(),
            site_info,
            candidate,
            fingerprint: candidate_fp,
            duplicate_of,
        })
    }

    /// Commit a plan to the vault.
    ///
    /// The site is upserted first. With [`DuplicateResolution::Update`] and a
    /// duplicate present, the existing account takes the candidate's cookies,
    /// local storage and login info and keeps its id, creation time, color and
    /// label. Otherwise the candidate is appended.
    pub fn apply(
        &self,
        vault: &mut Vault,
        plan: ImportPlan,
        resolution: DuplicateResolution,
    ) -> Result<ImportOutcome> {
        let ImportPlan {
            hostname,
            site_info,
            mut candidate,
            duplicate_of,
            ..
        } = plan;

        vault.upsert_site(&hostname, site_info.as_ref())?;
        let site_id = SiteId::from_hostname(&hostname);
        candidate.site_id = site_id.clone();

        if let (Some(existing_id), DuplicateResolution::Update) = (&duplicate_of, resolution) {
            let now = self.now();
            let existing = vault
                .group_mut(&site_id)
                .and_then(|group| group.accounts.iter_mut().find(|a| &a.id == existing_id));

            if let Some(existing) = existing {
                existing.cookies = candidate.cookies;
                existing.local_storage = candidate.local_storage;
                existing.login_info = candidate.login_info;
                if let Some(username) = candidate.username.filter(|u| !u.is_empty()) {
                    existing.username = Some(username);
                }
                existing.updated_at = now;
                debug!(account = %existing_id, site = %site_id, "Account updated");
                return Ok(ImportOutcome::Updated(existing_id.clone()));
            }
            warn!(account = %existing_id, "Duplicate vanished before commit, adding as new");
        }

        if vault.find_account(&candidate.id).is_some() {
            candidate.id = AccountId::generate();
        }
        let id = candidate.id.clone();
        vault
            .group_mut(&site_id)
            .ok_or_else(|| Error::NotFound(format!("Site not found: {}", site_id)))?
            .accounts
            .push(candidate);

        debug!(account = %id, site = %site_id, "Account added");
        Ok(ImportOutcome::Added(id))
    }
}
