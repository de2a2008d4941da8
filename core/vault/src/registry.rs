//! Site registry operations on the in-memory vault.
//!
//! Every mutation keeps pinned groups ahead of unpinned ones.

use tracing::debug;

use crate::model::{Account, Site, SiteGroup, SiteInfo, Vault};
use switchvault_common::{AccountId, Error, Result, SiteId};

fn site_not_found(id: &SiteId) -> Error {
    Error::NotFound(format!("Site not found: {}", id))
}

fn account_not_found(id: &AccountId) -> Error {
    Error::NotFound(format!("Account not found: {}", id))
}

impl Vault {
    /// Get or create the group for `hostname`, refreshing its metadata.
    ///
    /// # Postconditions
    /// - A new site is appended unpinned, named after `hint.title` when given
    /// - An existing site takes `hint.title` only while its display name is
    ///   still the hostname
    /// - A supplied icon URL always replaces the stored one
    ///
    /// # Errors
    /// - `Error::InvalidInput` if the hostname is empty
    pub fn upsert_site(&mut self, hostname: &str, hint: Option<&SiteInfo>) -> Result<&SiteGroup> {
        let id = SiteId::from_hostname(hostname);
        if id.as_str().is_empty() {
            return Err(Error::InvalidInput("Hostname cannot be empty".to_string()));
        }

        let title = hint
            .and_then(|h| h.title.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let icon = hint
            .and_then(|h| h.icon_url.as_deref())
            .filter(|u| !u.is_empty());

        let index = match self.position(&id) {
            Some(index) => {
                let site = &mut self.sites[index].site;
                if let Some(title) = title {
                    if site.has_default_name() && site.display_name != title {
                        site.display_name = title.to_string();
                    }
                }
                if let Some(icon) = icon {
                    if site.favicon_url.as_deref() != Some(icon) {
                        site.favicon_url = Some(icon.to_string());
                    }
                }
                index
            }
            None => {
                let mut site = Site::new(hostname);
                site.id = id.clone();
                if let Some(title) = title {
                    site.display_name = title.to_string();
                }
                site.favicon_url = icon.map(str::to_string);
                debug!(site = %id, "Site created");
                self.sites.push(SiteGroup::new(site));
                self.sites.len() - 1
            }
        };

        Ok(&self.sites[index])
    }

    /// Set the pin flag of a site and restore pinned-first order.
    pub fn set_pinned(&mut self, site_id: &SiteId, pinned: bool) -> Result<()> {
        let group = self
            .group_mut(site_id)
            .ok_or_else(|| site_not_found(site_id))?;
        group.site.is_pinned = pinned;
        self.normalize_pin_order();
        Ok(())
    }

    /// Flip the pin flag of a site. Returns the new flag.
    pub fn toggle_pinned(&mut self, site_id: &SiteId) -> Result<bool> {
        let pinned = !self
            .group(site_id)
            .ok_or_else(|| site_not_found(site_id))?
            .site
            .is_pinned;
        self.set_pinned(site_id, pinned)?;
        Ok(pinned)
    }

    /// Move `source` to sit immediately before `target`.
    ///
    /// The source adopts the target's pin flag, so dragging a site across the
    /// partition boundary pins or unpins it.
    ///
    /// # Errors
    /// - `Error::NotFound` if either site does not exist
    pub fn reorder(&mut self, source: &SiteId, target: &SiteId) -> Result<()> {
        let from = self.position(source).ok_or_else(|| site_not_found(source))?;
        let target_pinned = self
            .group(target)
            .ok_or_else(|| site_not_found(target))?
            .site
            .is_pinned;
        if source == target {
            return Ok(());
        }

        let mut moved = self.sites.remove(from);
        moved.site.is_pinned = target_pinned;
        let to = self.position(target).ok_or_else(|| site_not_found(target))?;
        self.sites.insert(to, moved);

        debug_assert!(self.is_pin_ordered());
        Ok(())
    }

    /// Remove a site and all of its accounts.
    pub fn delete_site(&mut self, site_id: &SiteId) -> Result<SiteGroup> {
        let index = self
            .position(site_id)
            .ok_or_else(|| site_not_found(site_id))?;
        Ok(self.sites.remove(index))
    }

    /// Remove a single account. The site stays even when it becomes empty.
    pub fn delete_account(&mut self, account_id: &AccountId) -> Result<Account> {
        for group in &mut self.sites {
            if let Some(index) = group.accounts.iter().position(|a| &a.id == account_id) {
                return Ok(group.accounts.remove(index));
            }
        }
        Err(account_not_found(account_id))
    }

    /// Change the label of an account.
    pub fn rename_account(&mut self, account_id: &AccountId, label: &str) -> Result<()> {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::InvalidInput("Label cannot be empty".to_string()));
        }
        let account = self
            .find_account_mut(account_id)
            .ok_or_else(|| account_not_found(account_id))?;
        account.label = label.to_string();
        Ok(())
    }

    /// Set a user-chosen display name for a site.
    ///
    /// Page titles never replace a name that differs from the hostname, so a
    /// rename sticks.
    pub fn rename_site(&mut self, site_id: &SiteId, display_name: &str) -> Result<()> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Display name cannot be empty".to_string(),
            ));
        }
        let group = self
            .group_mut(site_id)
            .ok_or_else(|| site_not_found(site_id))?;
        group.site.display_name = name.to_string();
        Ok(())
    }
}
