//! SwitchVault CLI - Command line interface for the account vault.
//!
//! This tool drives the vault core from a terminal: it captures sessions from
//! snapshot files, edits the site list, and reads and writes backup and share
//! files. Snapshot files stand in for the browser.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use switchvault_common::{AccountId, Error as CoreError, SiteId};
use switchvault_storage::LocalStore;
use switchvault_vault::{
    backup_file_name, share_file_name, BackupEnvelope, DuplicateResolution, ImportPlan,
    ShareEnvelope, SiteContext, Snapshot, SnapshotProvider, VaultConfig, VaultManager,
};

#[derive(Parser)]
#[command(name = "switchvault")]
#[command(about = "SwitchVault - Saved browser sessions, one click apart")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the vault (default: platform data dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (default: <data-dir>/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// How to treat a capture that matches an existing account.
#[derive(Clone, Copy, ValueEnum)]
enum OnDuplicate {
    /// Refresh the existing account's session.
    Update,
    /// Keep both accounts.
    AddNew,
}

impl From<OnDuplicate> for DuplicateResolution {
    fn from(value: OnDuplicate) -> Self {
        match value {
            OnDuplicate::Update => DuplicateResolution::Update,
            OnDuplicate::AddNew => DuplicateResolution::AddNew,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List sites and their accounts.
    List,

    /// Save the session in a snapshot file as an account.
    Add {
        /// Page URL the snapshot was taken on.
        #[arg(short, long)]
        url: String,

        /// Snapshot JSON file ({"cookies": [...], "pageState": {...}}).
        #[arg(short, long)]
        snapshot: PathBuf,

        /// What to do if the account is already stored.
        #[arg(long, value_enum)]
        on_duplicate: Option<OnDuplicate>,
    },

    /// Write an account's session to a snapshot file.
    Switch {
        /// Account id.
        #[arg(short, long)]
        account: String,

        /// Snapshot file to write.
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Pin a site to the top of the list.
    Pin {
        /// Site id (hostname).
        site: String,
    },

    /// Unpin a site.
    Unpin {
        /// Site id (hostname).
        site: String,
    },

    /// Move a site right before another one.
    Move {
        /// Site to move.
        site: String,

        /// Site to place it in front of.
        #[arg(long)]
        before: String,
    },

    /// Rename a site.
    RenameSite {
        site: String,
        name: String,
    },

    /// Relabel an account.
    RenameAccount {
        account: String,
        label: String,
    },

    /// Delete a site and all its accounts.
    DeleteSite {
        site: String,
    },

    /// Delete an account.
    DeleteAccount {
        account: String,
    },

    /// Write an encrypted backup of the whole vault.
    Backup {
        /// Output directory.
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Replace the vault with the content of a backup file.
    Restore {
        /// Backup file.
        file: PathBuf,
    },

    /// Export one account as a share file.
    Share {
        /// Account id.
        account: String,

        /// Write the account unencrypted.
        #[arg(long)]
        plain: bool,

        /// Output directory.
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Import an account from a share file.
    ImportShare {
        /// Share file.
        file: PathBuf,

        /// Hostname to file the account under when its cookies name none.
        #[arg(long)]
        site: Option<String>,

        /// What to do if the account is already stored.
        #[arg(long, value_enum)]
        on_duplicate: Option<OnDuplicate>,
    },
}

/// Snapshot provider backed by JSON files.
///
/// Captures read `source`; applies write `target`.
struct FileSnapshotProvider {
    source: Option<PathBuf>,
    target: Option<PathBuf>,
}

#[async_trait]
impl SnapshotProvider for FileSnapshotProvider {
    async fn capture_snapshot(&self, _context: &SiteContext) -> switchvault_common::Result<Snapshot> {
        let path = self
            .source
            .as_ref()
            .ok_or_else(|| CoreError::Snapshot("No snapshot file given".to_string()))?;
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CoreError::Snapshot(format!("Cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| CoreError::Snapshot(format!("Invalid snapshot {}: {}", path.display(), e)))
    }

    async fn apply_snapshot(
        &self,
        _context: &SiteContext,
        snapshot: &Snapshot,
    ) -> switchvault_common::Result<()> {
        let path = self
            .target
            .as_ref()
            .ok_or_else(|| CoreError::Snapshot("No output file given".to_string()))?;
        let text = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(path, text)
            .await
            .map_err(|e| CoreError::Snapshot(format!("Cannot write {}: {}", path.display(), e)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG overrides the level
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("No platform data directory, pass --data-dir")?
            .join("switchvault"),
    };
    let config_path = cli
        .config
        .unwrap_or_else(|| data_dir.join("config.json"));
    let config = VaultConfig::load(&config_path)
        .await
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    let ctx = Ctx { data_dir, config };

    match cli.command {
        Commands::List => cmd_list(&ctx).await,

        Commands::Add {
            url,
            snapshot,
            on_duplicate,
        } => cmd_add(&ctx, &url, &snapshot, on_duplicate).await,

        Commands::Switch { account, out } => cmd_switch(&ctx, &account, &out).await,

        Commands::Pin { site } => cmd_pin(&ctx, &site, true).await,

        Commands::Unpin { site } => cmd_pin(&ctx, &site, false).await,

        Commands::Move { site, before } => cmd_move(&ctx, &site, &before).await,

        Commands::RenameSite { site, name } => cmd_rename_site(&ctx, &site, &name).await,

        Commands::RenameAccount { account, label } => {
            cmd_rename_account(&ctx, &account, &label).await
        }

        Commands::DeleteSite { site } => cmd_delete_site(&ctx, &site).await,

        Commands::DeleteAccount { account } => cmd_delete_account(&ctx, &account).await,

        Commands::Backup { out } => cmd_backup(&ctx, &out).await,

        Commands::Restore { file } => cmd_restore(&ctx, &file).await,

        Commands::Share {
            account,
            plain,
            out,
        } => cmd_share(&ctx, &account, plain, &out).await,

        Commands::ImportShare {
            file,
            site,
            on_duplicate,
        } => cmd_import_share(&ctx, &file, site.as_deref(), on_duplicate).await,
    }
}

/// Resolved global options.
struct Ctx {
    data_dir: PathBuf,
    config: VaultConfig,
}

impl Ctx {
    async fn open(&self) -> Result<VaultManager> {
        let store = LocalStore::new(&self.data_dir).context("Failed to open data directory")?;
        VaultManager::open(self.config.clone(), Arc::new(store))
            .await
            .context("Failed to open vault")
    }

    async fn open_with(&self, provider: FileSnapshotProvider) -> Result<VaultManager> {
        Ok(self.open().await?.with_snapshot_provider(Arc::new(provider)))
    }
}

/// Prompt for a passphrase securely.
fn prompt_passphrase(prompt: &str) -> Result<Zeroizing<String>> {
    let passphrase = rpassword::prompt_password(prompt).context("Failed to read passphrase")?;
    Ok(Zeroizing::new(passphrase))
}

/// Prompt for a new passphrase twice.
fn prompt_new_passphrase() -> Result<Zeroizing<String>> {
    let passphrase = prompt_passphrase("Enter passphrase: ")?;
    let confirm = prompt_passphrase("Confirm passphrase: ")?;

    if passphrase != confirm {
        anyhow::bail!("Passphrases do not match");
    }

    if passphrase.is_empty() {
        anyhow::bail!("Passphrase cannot be empty");
    }

    Ok(passphrase)
}

/// Map a decrypt failure to the message users should see.
fn explain(err: CoreError) -> anyhow::Error {
    if matches!(err, CoreError::Decrypt) {
        anyhow::anyhow!("Wrong passphrase or corrupted file")
    } else if err.is_quota_exceeded() {
        anyhow::anyhow!("Storage is full, delete some accounts first")
    } else {
        err.into()
    }
}

/// Commit a plan, insisting on an explicit choice for duplicates.
async fn commit(
    manager: &mut VaultManager,
    plan: ImportPlan,
    on_duplicate: Option<OnDuplicate>,
) -> Result<()> {
    let resolution: DuplicateResolution = match (plan.duplicate_of(), on_duplicate) {
        (_, Some(choice)) => choice.into(),
        (None, None) => DuplicateResolution::AddNew,
        (Some(existing), None) => anyhow::bail!(
            "Account already stored as {}; pass --on-duplicate update or add-new",
            existing
        ),
    };

    let outcome = manager
        .commit_import(plan, resolution)
        .await
        .map_err(explain)?;
    println!("Saved account {}", outcome.account_id());

    Ok(())
}

/// List sites and accounts.
async fn cmd_list(ctx: &Ctx) -> Result<()> {
    let manager = ctx.open().await?;
    let vault = manager.vault();

    if vault.is_empty() {
        println!("No accounts saved.");
        return Ok(());
    }

    for group in vault.groups() {
        let pin = if group.site.is_pinned { "*" } else { " " };
        println!("{} {} ({})", pin, group.site.display_name, group.site.hostname);
        for account in &group.accounts {
            println!(
                "    {}  {}  {}  updated {}",
                account.id,
                account.label,
                account.username.as_deref().unwrap_or("-"),
                account.updated_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    Ok(())
}

/// Capture a snapshot file as an account.
async fn cmd_add(
    ctx: &Ctx,
    url: &str,
    snapshot: &Path,
    on_duplicate: Option<OnDuplicate>,
) -> Result<()> {
    info!("Capturing {} from {}", url, snapshot.display());

    let mut manager = ctx
        .open_with(FileSnapshotProvider {
            source: Some(snapshot.to_path_buf()),
            target: None,
        })
        .await?;

    let plan = manager
        .prepare_capture(&SiteContext::new(url))
        .await
        .context("Failed to capture snapshot")?;

    commit(&mut manager, plan, on_duplicate).await
}

/// Write an account's session to a snapshot file.
async fn cmd_switch(ctx: &Ctx, account: &str, out: &Path) -> Result<()> {
    let mut manager = ctx
        .open_with(FileSnapshotProvider {
            source: None,
            target: Some(out.to_path_buf()),
        })
        .await?;

    manager
        .switch_account(&AccountId::new(account))
        .await
        .context("Failed to switch account")?;

    println!("Session written to {}", out.display());

    Ok(())
}

/// Pin or unpin a site.
async fn cmd_pin(ctx: &Ctx, site: &str, pinned: bool) -> Result<()> {
    let mut manager = ctx.open().await?;
    manager
        .set_pinned(&SiteId::from_hostname(site), pinned)
        .await
        .map_err(explain)?;

    println!("{} {}", if pinned { "Pinned" } else { "Unpinned" }, site);

    Ok(())
}

/// Move a site in front of another.
async fn cmd_move(ctx: &Ctx, site: &str, before: &str) -> Result<()> {
    let mut manager = ctx.open().await?;
    manager
        .reorder(&SiteId::from_hostname(site), &SiteId::from_hostname(before))
        .await
        .map_err(explain)?;

    println!("Moved {} before {}", site, before);

    Ok(())
}

/// Rename a site.
async fn cmd_rename_site(ctx: &Ctx, site: &str, name: &str) -> Result<()> {
    let mut manager = ctx.open().await?;
    manager
        .rename_site(&SiteId::from_hostname(site), name)
        .await
        .map_err(explain)?;

    println!("Renamed {} to {}", site, name);

    Ok(())
}

/// Relabel an account.
async fn cmd_rename_account(ctx: &Ctx, account: &str, label: &str) -> Result<()> {
    let mut manager = ctx.open().await?;
    manager
        .rename_account(&AccountId::new(account), label)
        .await
        .map_err(explain)?;

    println!("Relabeled {} as {}", account, label);

    Ok(())
}

/// Delete a site.
async fn cmd_delete_site(ctx: &Ctx, site: &str) -> Result<()> {
    let mut manager = ctx.open().await?;
    let removed = manager
        .delete_site(&SiteId::from_hostname(site))
        .await
        .map_err(explain)?;

    println!(
        "Deleted {} and {} account(s)",
        removed.site.hostname,
        removed.accounts.len()
    );

    Ok(())
}

/// Delete an account.
async fn cmd_delete_account(ctx: &Ctx, account: &str) -> Result<()> {
    let mut manager = ctx.open().await?;
    let removed = manager
        .delete_account(&AccountId::new(account))
        .await
        .map_err(explain)?;

    println!("Deleted account {} ({})", removed.id, removed.label);

    Ok(())
}

/// Write an encrypted backup.
async fn cmd_backup(ctx: &Ctx, out: &Path) -> Result<()> {
    let manager = ctx.open().await?;
    let passphrase = prompt_new_passphrase()?;

    let envelope = manager
        .backup(&passphrase)
        .await
        .context("Failed to create backup")?;

    let path = out.join(backup_file_name(Utc::now()));
    tokio::fs::write(&path, envelope.to_json_pretty()?)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!(
        "Backup of {} account(s) written to {}",
        manager.vault().account_count(),
        path.display()
    );

    Ok(())
}

/// Restore a backup, replacing the vault.
async fn cmd_restore(ctx: &Ctx, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let envelope = BackupEnvelope::from_json(&text).context("Not a backup file")?;

    let mut manager = ctx.open().await?;
    let passphrase = prompt_passphrase("Enter backup passphrase: ")?;
    manager
        .restore(&envelope, &passphrase)
        .await
        .map_err(explain)?;

    println!(
        "Restored {} site(s), {} account(s)",
        manager.vault().len(),
        manager.vault().account_count()
    );

    Ok(())
}

/// Export one account.
async fn cmd_share(ctx: &Ctx, account: &str, plain: bool, out: &Path) -> Result<()> {
    let manager = ctx.open().await?;
    let account_id = AccountId::new(account);

    let passphrase = if plain {
        None
    } else {
        Some(prompt_new_passphrase()?)
    };

    let envelope = manager
        .share(&account_id, passphrase.as_deref().map(String::as_str))
        .await
        .map_err(explain)?;

    let (_, stored) = manager
        .vault()
        .find_account(&account_id)
        .context("Account vanished")?;
    let path = out.join(share_file_name(stored, Utc::now()));
    tokio::fs::write(&path, envelope.to_json_pretty()?)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if plain {
        println!("WARNING: {} holds the session unencrypted", path.display());
    }
    println!("Share file written to {}", path.display());

    Ok(())
}

/// Import a share file.
async fn cmd_import_share(
    ctx: &Ctx,
    file: &Path,
    site: Option<&str>,
    on_duplicate: Option<OnDuplicate>,
) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let envelope = ShareEnvelope::from_json(&text).context("Not a share file")?;

    let mut manager = ctx.open().await?;
    if let Some(site) = site {
        manager.set_active_context(&SiteContext::for_hostname(site));
    }

    let passphrase = if envelope.is_encrypted() {
        Some(prompt_passphrase("Enter share passphrase: ")?)
    } else {
        None
    };

    let plan = manager
        .prepare_share_import(&envelope, passphrase.as_deref().map(String::as_str))
        .await
        .map_err(explain)?;

    commit(&mut manager, plan, on_duplicate).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["switchvault", "list", "-v", "--data-dir", "/tmp/sv"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/sv")));
        assert!(matches!(cli.command, Commands::List));
    }
}
