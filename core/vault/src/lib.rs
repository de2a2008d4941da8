//! Vault core for SwitchVault.
//!
//! This module provides:
//! - The site and account data model and its JSON codec
//! - Account fingerprints and duplicate-aware import
//! - Site registry operations (upsert, pin, reorder, rename, delete)
//! - Encrypted whole-vault backups and single-account share files
//! - `VaultManager`, the single writer of the persisted vault
//!
//! # Architecture
//! The core never touches a browser or a disk directly. Sessions are captured
//! and applied through a [`SnapshotProvider`]; the vault is persisted in full
//! under one key of a [`switchvault_storage::KeyValueStore`].

pub mod backup;
pub mod codec;
pub mod config;
pub mod fingerprint;
pub mod import;
pub mod manager;
pub mod model;
pub mod registry;
pub mod share;
pub mod snapshot;

pub use backup::{backup_file_name, BackupEncryption, BackupEnvelope, BackupService};
pub use config::VaultConfig;
pub use fingerprint::{fingerprint, Fingerprint};
pub use import::{DuplicateResolution, ImportOutcome, ImportPlan, ImportResolver};
pub use manager::{Selection, VaultManager};
pub use model::{Account, Cookie, LoginInfo, Site, SiteGroup, SiteInfo, Vault, AVATAR_PALETTE};
pub use share::{share_file_name, ShareEncryption, ShareEnvelope, ShareService};
pub use snapshot::{
    hostname_from_url, PageState, SiteContext, Snapshot, SnapshotProvider, StaticSnapshotProvider,
};
