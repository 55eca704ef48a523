//! credvault CLI - Command line interface for the credential vault.
//!
//! Manages connection records whose passwords are encrypted under a master
//! password, and rotates that password.

mod config;
mod prompt;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use credvault_common::RecordId;
use credvault_storage::{CredentialRecord, RecordStore, SqliteStore, VaultStore};
use credvault_vault::{Vault, VaultHeader, VaultStatus};

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "credvault")]
#[command(about = "credvault - Encrypted connection credentials")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to the config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vault and set the master password.
    Init,

    /// Show whether a vault exists and how it is configured.
    Status,

    /// Check the master password.
    Unlock,

    /// Add a connection record with an encrypted secret.
    Add {
        /// Display label.
        #[arg(short, long)]
        label: String,

        /// Host name or address.
        #[arg(long)]
        host: String,

        /// Port number.
        #[arg(short, long, default_value_t = 22)]
        port: u16,

        /// Protocol (e.g. "ssh", "postgres").
        #[arg(long, default_value = "ssh")]
        protocol: String,

        /// Login name.
        #[arg(short, long)]
        username: String,

        /// Free-form notes.
        #[arg(short, long)]
        notes: Option<String>,

        /// Record id (generated if omitted).
        #[arg(long)]
        id: Option<String>,
    },

    /// List connection records.
    List,

    /// Show a record and reveal its secret.
    Show {
        /// Record id.
        id: String,
    },

    /// Remove a record.
    Remove {
        /// Record id.
        id: String,
    },

    /// Change the master password and re-encrypt every secret.
    ChangePassword,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = CliConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let vault = open_vault(&config).await?;

    match cli.command {
        Commands::Init => cmd_init(&vault).await,
        Commands::Status => cmd_status(&vault, &config).await,
        Commands::Unlock => cmd_unlock(&vault).await,
        Commands::Add {
            label,
            host,
            port,
            protocol,
            username,
            notes,
            id,
        } => {
            let id = match id {
                Some(id) => RecordId::new(id).context("Invalid record id")?,
                None => RecordId::new(uuid::Uuid::new_v4().to_string())?,
            };
            let mut record = CredentialRecord::new(id, label, host, port, protocol, username);
            record.notes = notes;
            cmd_add(&vault, record).await
        }
        Commands::List => cmd_list(&vault).await,
        Commands::Show { id } => cmd_show(&vault, &id).await,
        Commands::Remove { id } => cmd_remove(&vault, &id).await,
        Commands::ChangePassword => cmd_change_password(&vault).await,
    }
}

/// Open the SQLite store named in the config.
async fn open_vault(config: &CliConfig) -> Result<Vault<SqliteStore>> {
    let store = SqliteStore::open(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    Ok(Vault::new(Arc::new(store), config.kdf.clone()))
}

/// Prompt for the master password and unlock.
async fn unlock(vault: &Vault<SqliteStore>) -> Result<()> {
    let password = prompt::master_password()?;
    vault
        .unlock(&password)
        .await
        .context("Failed to unlock vault")
}

/// Create the vault.
async fn cmd_init(vault: &Vault<SqliteStore>) -> Result<()> {
    if vault.status().await? == VaultStatus::VaultExists {
        anyhow::bail!("A vault already exists in this database");
    }

    let (password, confirmation) = prompt::new_master_password(true)?;
    vault
        .initialize(&password, &confirmation)
        .await
        .context("Failed to create vault")?;

    println!("Vault created successfully!");
    println!("  Store: {}", vault.store().name());
    println!("  KDF: {}", vault.kdf_params().algorithm());

    Ok(())
}

/// Show vault status.
async fn cmd_status(vault: &Vault<SqliteStore>, config: &CliConfig) -> Result<()> {
    println!("Database: {}", config.database.display());

    match VaultHeader::load(vault.store().as_ref()).await? {
        None => println!("Status: no vault (run `credvault init`)"),
        Some(header) => {
            let records = vault.store().list_records().await?;
            let with_secret = records.iter().filter(|r| r.has_secret()).count();

            println!("Status: vault exists");
            println!("  KDF: {}", header.kdf.algorithm());
            println!("  Salt: {} bytes", header.salt.len());
            println!("  Records: {} ({} with secrets)", records.len(), with_secret);
            if header.kdf != config.kdf {
                println!("  Note: configured KDF differs; change the password to upgrade");
            }
        }
    }

    Ok(())
}

/// Verify the master password.
async fn cmd_unlock(vault: &Vault<SqliteStore>) -> Result<()> {
    unlock(vault).await?;
    println!("Master password accepted.");
    vault.lock().await;
    Ok(())
}

/// Add a record and encrypt its secret.
async fn cmd_add(vault: &Vault<SqliteStore>, record: CredentialRecord) -> Result<()> {
    unlock(vault).await?;

    let id = record.id.clone();
    vault
        .add_record(&record)
        .await
        .context("Failed to save record")?;

    let secret = prompt::secret("Secret (leave empty for none): ")?;
    if !secret.is_empty() {
        vault
            .store_secret(&id, &secret)
            .await
            .context("Failed to store secret")?;
    }
    vault.lock().await;

    info!("Added record {}", id);
    println!("Record added: {}", id);

    Ok(())
}

/// List records.
async fn cmd_list(vault: &Vault<SqliteStore>) -> Result<()> {
    let records = vault
        .store()
        .list_records()
        .await
        .context("Failed to list records")?;

    if records.is_empty() {
        println!("No records.");
    } else {
        for record in records {
            let marker = if record.has_secret() { "*" } else { " " };
            println!(
                "{} {}  {}  {}@{}:{} ({})",
                marker,
                record.id,
                record.label,
                record.username,
                record.host,
                record.port,
                record.protocol
            );
        }
    }

    Ok(())
}

/// Show a record with its decrypted secret.
async fn cmd_show(vault: &Vault<SqliteStore>, id: &str) -> Result<()> {
    let id = RecordId::new(id).context("Invalid record id")?;
    let record = vault
        .store()
        .get_record(&id)
        .await?
        .with_context(|| format!("No record with id {}", id))?;

    unlock(vault).await?;
    let secret = vault
        .reveal_secret(&id)
        .await
        .context("Failed to decrypt secret")?;
    vault.lock().await;

    println!("Record {}:", record.id);
    println!("  Label: {}", record.label);
    println!("  Host: {}:{}", record.host, record.port);
    println!("  Protocol: {}", record.protocol);
    println!("  Username: {}", record.username);
    if let Some(notes) = &record.notes {
        println!("  Notes: {}", notes);
    }
    match secret {
        Some(secret) => println!("  Secret: {}", secret.expose()),
        None => println!("  Secret: (none)"),
    }
    println!("  Updated: {}", record.updated_at);

    Ok(())
}

/// Remove a record.
async fn cmd_remove(vault: &Vault<SqliteStore>, id: &str) -> Result<()> {
    let id = RecordId::new(id).context("Invalid record id")?;
    vault
        .remove_record(&id)
        .await
        .context("Failed to remove record")?;

    println!("Record removed: {}", id);

    Ok(())
}

/// Change the master password.
async fn cmd_change_password(vault: &Vault<SqliteStore>) -> Result<()> {
    info!("Changing master password");

    let old_password = prompt::master_password()?;
    vault
        .unlock(&old_password)
        .await
        .context("Failed to unlock vault")?;

    let (new_password, confirmation) = prompt::new_master_password(false)?;
    let result = vault
        .rotate_password(&old_password, &new_password, Some(confirmation.as_str()))
        .await
        .context("Failed to change password")?;
    vault.lock().await;

    println!("Password changed successfully!");
    println!("  Secrets migrated: {}", result.migrated_count);
    if !result.is_clean() {
        println!("  Secrets that could not be decrypted (left unchanged):");
        for id in &result.failed_ids {
            println!("    {}", id);
        }
    }

    Ok(())
}
