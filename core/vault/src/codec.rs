//! JSON encoding of the vault.
//!
//! Two shapes exist: the persisted store value, a bare array of site groups
//! kept under the configured storage key, and the versioned document
//! `{"version": 1, "sites": [...]}` that backups encrypt.

use serde::Serialize;
use serde_json::Value;

use crate::model::{Account, SiteGroup, Vault};
use switchvault_common::{Error, Result};

/// Version of the vault document format.
pub const VAULT_FORMAT_VERSION: u64 = 1;

#[derive(Serialize)]
struct VaultDocument<'a> {
    version: u64,
    sites: &'a [SiteGroup],
}

/// Encode the vault as a versioned document.
pub fn encode_vault_document(vault: &Vault) -> Result<String> {
    let doc = VaultDocument {
        version: VAULT_FORMAT_VERSION,
        sites: vault.groups(),
    };
    serde_json::to_string(&doc).map_err(Error::from)
}

/// Decode a versioned vault document.
///
/// # Errors
/// - `Error::Format` if the text is not JSON, the version is not 1, or
///   `sites` is missing or not an array
pub fn decode_vault_document(text: &str) -> Result<Vault> {
    let mut doc: Value = serde_json::from_str(text)?;

    match doc.get("version").and_then(Value::as_u64) {
        Some(VAULT_FORMAT_VERSION) => {}
        Some(other) => {
            return Err(Error::Format(format!(
                "Unsupported vault version: {}",
                other
            )))
        }
        None => return Err(Error::Format("Missing vault version".to_string())),
    }

    let sites = match doc.get_mut("sites").map(Value::take) {
        Some(sites @ Value::Array(_)) => sites,
        _ => return Err(Error::Format("Vault sites must be an array".to_string())),
    };

    decode_groups(sites)
}

/// Encode the vault as the value persisted in the key-value store.
pub fn encode_store(vault: &Vault) -> Result<String> {
    serde_json::to_string(vault.groups()).map_err(Error::from)
}

/// Decode the value persisted in the key-value store.
///
/// An absent value is an empty vault; a present but malformed one is an error.
pub fn decode_store(value: Option<&str>) -> Result<Vault> {
    match value {
        None => Ok(Vault::new()),
        Some(text) if text.trim().is_empty() => Ok(Vault::new()),
        Some(text) => {
            let parsed: Value = serde_json::from_str(text)?;
            if !parsed.is_array() {
                return Err(Error::Format("Stored vault must be an array".to_string()));
            }
            decode_groups(parsed)
        }
    }
}

/// Encode a single account, as carried by share files.
pub fn encode_account(account: &Account) -> Result<String> {
    serde_json::to_string(account).map_err(Error::from)
}

/// Decode a single account.
pub fn decode_account(text: &str) -> Result<Account> {
    serde_json::from_str(text).map_err(Error::from)
}

fn decode_groups(sites: Value) -> Result<Vault> {
    let groups: Vec<SiteGroup> = serde_json::from_value(sites)?;
    let vault = Vault::from_groups(groups);
    validate(&vault)?;
    Ok(vault)
}

/// Reject vaults whose ids collide or whose accounts point at another site.
fn validate(vault: &Vault) -> Result<()> {
    let mut site_ids = std::collections::HashSet::new();
    let mut account_ids = std::collections::HashSet::new();

    for group in vault.groups() {
        if !site_ids.insert(&group.site.id) {
            return Err(Error::Format(format!(
                "Duplicate site id: {}",
                group.site.id
            )));
        }
        for account in &group.accounts {
            if account.site_id != group.site.id {
                return Err(Error::Format(format!(
                    "Account {} belongs to {} but is stored under {}",
                    account.id, account.site_id, group.site.id
                )));
            }
            if !account_ids.insert(&account.id) {
                return Err(Error::Format(format!(
                    "Duplicate account id: {}",
                    account.id
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn vault_document_value(vault: &Vault) -> Value {
    serde_json::json!({ "version": VAULT_FORMAT_VERSION, "sites": vault.groups() })
}
