//! Vault manager: the single writer of the persisted vault.
//!
//! Every mutation runs on a working copy of the vault, which is persisted and
//! only then swapped in. A failed operation leaves both the in-memory and the
//! stored vault as they were.

use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::backup::{BackupEnvelope, BackupService};
use crate::codec::{decode_store, encode_store};
use crate::config::VaultConfig;
use crate::import::{DuplicateResolution, ImportOutcome, ImportPlan, ImportResolver};
use crate::model::{Account, SiteGroup, Vault};
use crate::share::{ShareEnvelope, ShareService};
use crate::snapshot::{SiteContext, Snapshot, SnapshotProvider};
use switchvault_common::{AccountId, Error, Result, SiteId};
use switchvault_storage::KeyValueStore;

/// What the user is currently looking at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Hostname of the browser tab the vault was opened from.
    pub active_hostname: Option<String>,
    pub current_site: Option<SiteId>,
    pub current_account: Option<AccountId>,
}

/// Owns the vault, its store and the selection state.
pub struct VaultManager {
    config: VaultConfig,
    store: Arc<dyn KeyValueStore>,
    provider: Option<Arc<dyn SnapshotProvider>>,
    vault: Vault,
    selection: Selection,
    resolver: ImportResolver,
    backups: BackupService,
    shares: ShareService,
}

/// Run CPU-bound key derivation and cipher work off the async runtime.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Crypto(format!("Crypto task failed: {}", e)))?
}

impl VaultManager {
    /// Load the vault from `store`.
    ///
    /// # Postconditions
    /// - An empty store yields an empty vault
    ///
    /// # Errors
    /// - `Error::InvalidInput` if the configuration is invalid
    /// - `Error::Format` if the stored value is malformed
    /// - `Error::Store` if the store cannot be read
    pub async fn open(config: VaultConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        config.validate()?;
        let vault = Self::load(&config, store.as_ref()).await?;

        info!(
            store = store.name(),
            sites = vault.len(),
            accounts = vault.account_count(),
            "Vault opened"
        );

        Ok(Self {
            resolver: ImportResolver::new(&config),
            backups: BackupService::new(config.kdf),
            shares: ShareService::new(&config),
            config,
            store,
            provider: None,
            vault,
            selection: Selection::default(),
        })
    }

    /// Attach the browser-side snapshot provider.
    pub fn with_snapshot_provider(mut self, provider: Arc<dyn SnapshotProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    async fn load(config: &VaultConfig, store: &dyn KeyValueStore) -> Result<Vault> {
        let value = store.get(&config.storage_key).await?;
        decode_store(value.as_deref())
    }

    /// Get the configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Get the current vault.
    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Get the selection state.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Re-read the vault from the store, discarding the in-memory copy.
    pub async fn reload(&mut self) -> Result<()> {
        self.vault = Self::load(&self.config, self.store.as_ref()).await?;
        self.prune_selection();
        Ok(())
    }

    /// Record the page the user is on and select its site if it is known.
    pub fn set_active_context(&mut self, context: &SiteContext) -> Option<&SiteGroup> {
        let hostname = context.hostname();
        let site_id = hostname.as_deref().map(SiteId::from_hostname);
        self.selection.active_hostname = hostname;

        match site_id.filter(|id| self.vault.group(id).is_some()) {
            Some(id) => {
                if self.selection.current_site.as_ref() != Some(&id) {
                    self.selection.current_account = None;
                }
                self.selection.current_site = Some(id.clone());
                self.vault.group(&id)
            }
            None => None,
        }
    }

    /// Make `site_id` the current site.
    pub fn select_site(&mut self, site_id: &SiteId) -> Result<&SiteGroup> {
        let group = self
            .vault
            .group(site_id)
            .ok_or_else(|| Error::NotFound(format!("Site not found: {}", site_id)))?;

        let keeps_account = self
            .selection
            .current_account
            .as_ref()
            .is_some_and(|id| group.account(id).is_some());
        if !keeps_account {
            self.selection.current_account = None;
        }
        self.selection.current_site = Some(site_id.clone());
        Ok(group)
    }

    fn provider(&self) -> Result<&Arc<dyn SnapshotProvider>> {
        self.provider
            .as_ref()
            .ok_or_else(|| Error::Snapshot("No snapshot provider attached".to_string()))
    }

    async fn persist(&self, vault: &Vault) -> Result<()> {
        let value = encode_store(vault)?;
        let bytes = value.len();
        if let Err(e) = self.store.set(&self.config.storage_key, value).await {
            warn!(store = self.store.name(), bytes, error = %e, "Vault write failed");
            return Err(e);
        }
        debug!(store = self.store.name(), bytes, "Vault persisted");
        Ok(())
    }

    /// Apply `change` to a copy of the vault, persist it, then swap it in.
    async fn mutate<T>(&mut self, change: impl FnOnce(&mut Vault) -> Result<T>) -> Result<T> {
        let mut working = self.vault.clone();
        let out = change(&mut working)?;
        self.persist(&working).await?;
        self.vault = working;
        Ok(out)
    }

    fn prune_selection(&mut self) {
        if let Some(site) = &self.selection.current_site {
            if self.vault.group(site).is_none() {
                self.selection.current_site = None;
            }
        }
        if let Some(account) = &self.selection.current_account {
            if self.vault.find_account(account).is_none() {
                self.selection.current_account = None;
            }
        }
    }

    /// Capture the session of the page in `context` and plan its import.
    ///
    /// Nothing is stored until the plan is passed to [`commit_import`].
    ///
    /// # Errors
    /// - `Error::InvalidInput` for browser-internal or host-less pages
    /// - `Error::Snapshot` if no provider is attached or the capture fails
    ///
    /// [`commit_import`]: VaultManager::commit_import
    pub async fn prepare_capture(&self, context: &SiteContext) -> Result<ImportPlan> {
        let hostname = context.hostname().ok_or_else(|| {
            Error::InvalidInput(format!("Cannot capture accounts on {}", context.url()))
        })?;
        let snapshot = self.provider()?.capture_snapshot(context).await?;

        let plan = self.resolver.plan_capture(&self.vault, &hostname, snapshot)?;
        debug!(
            site = %hostname,
            duplicate = plan.is_duplicate(),
            "Capture planned"
        );
        Ok(plan)
    }

    /// Store a planned import, resolving a duplicate as `resolution` says.
    ///
    /// The imported account becomes the current account.
    pub async fn commit_import(
        &mut self,
        plan: ImportPlan,
        resolution: DuplicateResolution,
    ) -> Result<ImportOutcome> {
        let site_id = SiteId::from_hostname(plan.hostname());
        let resolver = self.resolver.clone();
        let outcome = self
            .mutate(move |vault| resolver.apply(vault, plan, resolution))
            .await?;

        info!(
            account = %outcome.account_id(),
            site = %site_id,
            updated = matches!(outcome, ImportOutcome::Updated(_)),
            "Account saved"
        );
        self.selection.current_site = Some(site_id);
        self.selection.current_account = Some(outcome.account_id().clone());
        Ok(outcome)
    }

    /// Restore a stored account into the browser and make it current.
    ///
    /// # Errors
    /// - `Error::NotFound` if the account does not exist
    /// - `Error::Snapshot` if no provider is attached or applying fails
    pub async fn switch_account(&mut self, account_id: &AccountId) -> Result<()> {
        let (site, account) = self
            .vault
            .find_account(account_id)
            .ok_or_else(|| Error::NotFound(format!("Account not found: {}", account_id)))?;
        let context = SiteContext::for_hostname(&site.hostname);
        let snapshot = Snapshot::from_account(account);
        let site_id = site.id.clone();

        self.provider()?.apply_snapshot(&context, &snapshot).await?;

        info!(account = %account_id, site = %site_id, "Account switched");
        self.selection.current_site = Some(site_id);
        self.selection.current_account = Some(account_id.clone());
        Ok(())
    }

    /// Pin or unpin a site.
    pub async fn set_pinned(&mut self, site_id: &SiteId, pinned: bool) -> Result<()> {
        self.mutate(|vault| vault.set_pinned(site_id, pinned)).await
    }

    /// Flip the pin flag of a site, returning the new flag.
    pub async fn toggle_pinned(&mut self, site_id: &SiteId) -> Result<bool> {
        self.mutate(|vault| vault.toggle_pinned(site_id)).await
    }

    /// Move `source` immediately before `target`.
    pub async fn reorder(&mut self, source: &SiteId, target: &SiteId) -> Result<()> {
        self.mutate(|vault| vault.reorder(source, target)).await
    }

    /// Change an account's label.
    pub async fn rename_account(&mut self, account_id: &AccountId, label: &str) -> Result<()> {
        self.mutate(|vault| vault.rename_account(account_id, label))
            .await
    }

    /// Give a site a user-chosen display name.
    pub async fn rename_site(&mut self, site_id: &SiteId, display_name: &str) -> Result<()> {
        self.mutate(|vault| vault.rename_site(site_id, display_name))
            .await
    }

    /// Delete a site with all its accounts.
    ///
    /// If it was the current site, the site and account selection are
    /// cleared; nothing else is selected in its place.
    pub async fn delete_site(&mut self, site_id: &SiteId) -> Result<SiteGroup> {
        let removed = self.mutate(|vault| vault.delete_site(site_id)).await?;

        info!(site = %site_id, accounts = removed.accounts.len(), "Site deleted");
        if self.selection.current_site.as_ref() == Some(site_id) {
            self.selection.current_site = None;
        }
        self.prune_selection();
        Ok(removed)
    }

    /// Delete one account, clearing it from the selection if current.
    pub async fn delete_account(&mut self, account_id: &AccountId) -> Result<Account> {
        let removed = self
            .mutate(|vault| vault.delete_account(account_id))
            .await?;

        info!(account = %account_id, site = %removed.site_id, "Account deleted");
        if self.selection.current_account.as_ref() == Some(account_id) {
            self.selection.current_account = None;
        }
        Ok(removed)
    }

    /// Encrypt the whole vault into a backup envelope.
    pub async fn backup(&self, passphrase: &str) -> Result<BackupEnvelope> {
        let service = self.backups.clone();
        let vault = self.vault.clone();
        let passphrase = Zeroizing::new(passphrase.to_string());
        blocking(move || service.backup(&vault, &passphrase)).await
    }

    /// Replace the whole vault with the content of a backup.
    ///
    /// # Errors
    /// - `Error::Decrypt` for a wrong passphrase or corrupted file
    /// - `Error::Format` for a malformed vault document
    /// - `Error::Store` if the restored vault cannot be persisted
    ///
    /// On any error the current vault is kept.
    pub async fn restore(&mut self, envelope: &BackupEnvelope, passphrase: &str) -> Result<()> {
        let service = self.backups.clone();
        let envelope = envelope.clone();
        let passphrase = Zeroizing::new(passphrase.to_string());
        let restored = blocking(move || service.restore(&envelope, &passphrase)).await?;

        self.persist(&restored).await?;
        info!(
            sites = restored.len(),
            accounts = restored.account_count(),
            "Vault restored"
        );
        self.vault = restored;
        self.prune_selection();
        Ok(())
    }

    /// Package one account as a share file.
    ///
    /// `None` shares it in plain text.
    pub async fn share(
        &self,
        account_id: &AccountId,
        passphrase: Option<&str>,
    ) -> Result<ShareEnvelope> {
        let (_, account) = self
            .vault
            .find_account(account_id)
            .ok_or_else(|| Error::NotFound(format!("Account not found: {}", account_id)))?;
        let account = account.clone();
        let service = self.shares.clone();
        let passphrase = passphrase.map(|p| Zeroizing::new(p.to_string()));

        blocking(move || service.share(&account, passphrase.as_deref().map(String::as_str))).await
    }

    /// Open a share file and plan its import.
    ///
    /// Accounts whose cookies name no site go under the selected site, else
    /// under the active hostname. Commit the plan with [`commit_import`].
    ///
    /// [`commit_import`]: VaultManager::commit_import
    pub async fn prepare_share_import(
        &self,
        envelope: &ShareEnvelope,
        passphrase: Option<&str>,
    ) -> Result<ImportPlan> {
        let service = self.shares.clone();
        let vault = self.vault.clone();
        let envelope = envelope.clone();
        let fallback = self
            .selection
            .current_site
            .as_ref()
            .and_then(|id| self.vault.group(id))
            .map(|g| g.site.hostname.clone())
            .or_else(|| self.selection.active_hostname.clone());
        let passphrase = passphrase.map(|p| Zeroizing::new(p.to_string()));

        blocking(move || {
            service.import_share(
                &vault,
                &envelope,
                passphrase.as_deref().map(String::as_str),
                fallback.as_deref(),
            )
        })
        .await
    }
}
