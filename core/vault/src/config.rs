//! Vault configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use switchvault_common::{Error, Result};
use switchvault_crypto::KdfParams;

/// Default store key holding the serialized vault.
pub const DEFAULT_STORAGE_KEY: &str = "accounts";

/// Default label for captures without a hostname or username.
pub const DEFAULT_ACCOUNT_LABEL: &str = "Unnamed account";

/// Default suffix appended to the label of accounts imported from a share file.
pub const DEFAULT_IMPORT_SUFFIX: &str = " (imported)";

/// Default UTC offset, in hours, of account timestamps.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 8;

/// Runtime configuration of the vault core.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Key under which the whole vault is persisted.
    pub storage_key: String,
    /// Key derivation parameters for backup and share files.
    ///
    /// Not recorded in the files themselves; only the default produces
    /// portable files.
    pub kdf: KdfParams,
    /// Label used when a capture has neither hostname nor username.
    pub default_label: String,
    /// Suffix marking accounts imported from a share file.
    pub import_label_suffix: String,
    /// Fixed UTC offset of account timestamps.
    pub utc_offset_hours: i32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            kdf: KdfParams::standard(),
            default_label: DEFAULT_ACCOUNT_LABEL.to_string(),
            import_label_suffix: DEFAULT_IMPORT_SUFFIX.to_string(),
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
        }
    }
}

impl VaultConfig {
    /// Check the configuration for values the core cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.storage_key.trim().is_empty() {
            return Err(Error::InvalidInput("storage_key cannot be empty".to_string()));
        }
        if self.kdf.iterations == 0 {
            return Err(Error::InvalidInput(
                "kdf.iterations must be positive".to_string(),
            ));
        }
        if !(-23..=23).contains(&self.utc_offset_hours) {
            return Err(Error::InvalidInput(format!(
                "utc_offset_hours out of range: {}",
                self.utc_offset_hours
            )));
        }
        Ok(())
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Error::from)
    }

    /// Deserialize and validate configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file, falling back to defaults when the
    /// file does not exist.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        match tokio::fs::read_to_string(path.as_ref()).await {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::InvalidInput(format!(
                "Cannot read config {}: {}",
                path.as_ref().display(),
                e
            ))),
        }
    }
}
