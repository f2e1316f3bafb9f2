//! SnapStore CLI - Command line interface for object storage operations.
//!
//! This tool drives the storage adapters against a tenant provider config,
//! for inspecting buckets, moving snapshot artifacts and validating
//! credentials.

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use snapstore_common::{ObjectPath, TenantId};
use snapstore_storage::{
    validate_provider, AdapterFactory, ObjectMetadata, ProviderCredentials, SignedAccessGateway,
    StorageAdapter, StorageProviderConfig, ValidationOutcome,
};

#[derive(Parser)]
#[command(name = "snapstore")]
#[command(about = "SnapStore - Snapshot object storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Provider config JSON file.
    #[arg(short, long)]
    config: PathBuf,

    /// Access key id of the provider credentials.
    #[arg(long, env = "SNAPSTORE_ACCESS_KEY_ID")]
    access_key_id: String,

    /// Secret access key of the provider credentials.
    #[arg(long, env = "SNAPSTORE_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file.
    Put {
        /// Source file.
        source: PathBuf,

        /// Destination object path.
        dest: String,

        /// Content type of the object.
        #[arg(short = 't', long)]
        content_type: Option<String>,

        /// User metadata entry, `key=value`. Repeatable.
        #[arg(short, long = "meta")]
        meta: Vec<String>,
    },

    /// Download an object to a local file.
    Get {
        /// Source object path.
        source: String,

        /// Destination file.
        dest: PathBuf,
    },

    /// List object keys under a prefix.
    Ls {
        /// Key prefix (default: whole bucket).
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Delete an object.
    Rm {
        /// Object path.
        path: String,
    },

    /// Server-side copy of an object.
    Cp {
        /// Source object path.
        from: String,

        /// Destination object path.
        to: String,
    },

    /// Show object metadata as JSON.
    Stat {
        /// Object path.
        path: String,
    },

    /// Check whether an object exists.
    Exists {
        /// Object path.
        path: String,
    },

    /// Issue a signed download URL on behalf of a tenant.
    Url {
        /// Requesting tenant id.
        #[arg(short, long)]
        requester: String,

        /// Object path under the tenant prefix.
        path: String,
    },

    /// Probe the provider with a write/read/delete round trip.
    Validate {
        /// Tenant whose prefix receives the probe object.
        #[arg(short, long)]
        tenant: String,

        /// Write the outcome back into the config file.
        #[arg(long)]
        save: bool,
    },
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
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli.config).await?;
    let credentials = ProviderCredentials::new(cli.access_key_id, cli.secret_access_key);
    let adapter = AdapterFactory::new()
        .build(&config, &credentials)
        .context("Failed to set up storage provider")?;

    match cli.command {
        Commands::Put {
            source,
            dest,
            content_type,
            meta,
        } => cmd_put(adapter.as_ref(), &source, &dest, content_type, &meta).await,

        Commands::Get { source, dest } => cmd_get(adapter.as_ref(), &source, &dest).await,

        Commands::Ls { prefix } => cmd_ls(adapter.as_ref(), &prefix).await,

        Commands::Rm { path } => cmd_rm(adapter.as_ref(), &path).await,

        Commands::Cp { from, to } => cmd_cp(adapter.as_ref(), &from, &to).await,

        Commands::Stat { path } => cmd_stat(adapter.as_ref(), &path).await,

        Commands::Exists { path } => cmd_exists(adapter.as_ref(), &path).await,

        Commands::Url { requester, path } => cmd_url(adapter, &requester, &path).await,

        Commands::Validate { tenant, save } => {
            cmd_validate(adapter.as_ref(), config, &cli.config, &tenant, save).await
        }
    }
}

/// Read a provider config file.
async fn load_config(path: &Path) -> Result<StorageProviderConfig> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).context("Invalid provider config")
}

fn object_path(raw: &str) -> Result<ObjectPath> {
    ObjectPath::parse(raw).with_context(|| format!("Invalid object path: {}", raw))
}

/// Collect `--content-type` and `key=value` entries into object metadata.
fn parse_metadata(content_type: Option<String>, entries: &[String]) -> Result<Option<ObjectMetadata>> {
    let mut metadata = ObjectMetadata::new();
    if let Some(content_type) = content_type {
        metadata.insert("content-type".to_string(), content_type);
    }
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("Metadata must be key=value: {}", entry))?;
        if key.is_empty() {
            anyhow::bail!("Metadata key cannot be empty");
        }
        metadata.insert(key.to_ascii_lowercase(), value.to_string());
    }
    Ok((!metadata.is_empty()).then_some(metadata))
}

/// Upload a file.
async fn cmd_put(
    adapter: &dyn StorageAdapter,
    source: &Path,
    dest: &str,
    content_type: Option<String>,
    meta: &[String],
) -> Result<()> {
    let dest = object_path(dest)?;
    let metadata = parse_metadata(content_type, meta)?;
    let content = tokio::fs::read(source)
        .await
        .context("Failed to read source file")?;
    let size = content.len();

    info!(path = %dest, size, "Uploading");
    adapter
        .write(&dest, Bytes::from(content), metadata)
        .await
        .context("Failed to upload object")?;

    println!("Uploaded {} ({} bytes)", dest, size);
    Ok(())
}

/// Download an object.
async fn cmd_get(adapter: &dyn StorageAdapter, source: &str, dest: &Path) -> Result<()> {
    let source = object_path(source)?;
    let content = adapter
        .read(&source)
        .await
        .context("Failed to download object")?;

    tokio::fs::write(dest, &content)
        .await
        .context("Failed to write output file")?;

    println!("Downloaded {} to {} ({} bytes)", source, dest.display(), content.len());
    Ok(())
}

/// List keys.
async fn cmd_ls(adapter: &dyn StorageAdapter, prefix: &str) -> Result<()> {
    let mut keys = adapter.list(prefix).await.context("Failed to list objects")?;
    keys.sort();

    if keys.is_empty() {
        println!("No objects under '{}'.", prefix);
    } else {
        for key in keys {
            println!("{}", key);
        }
    }
    Ok(())
}

/// Delete an object.
async fn cmd_rm(adapter: &dyn StorageAdapter, path: &str) -> Result<()> {
    let path = object_path(path)?;
    adapter
        .delete(&path)
        .await
        .context("Failed to delete object")?;
    println!("Deleted {}", path);
    Ok(())
}

/// Copy an object.
async fn cmd_cp(adapter: &dyn StorageAdapter, from: &str, to: &str) -> Result<()> {
    let (from, to) = (object_path(from)?, object_path(to)?);
    adapter
        .copy(&from, &to)
        .await
        .context("Failed to copy object")?;
    println!("Copied {} to {}", from, to);
    Ok(())
}

/// Print object metadata.
async fn cmd_stat(adapter: &dyn StorageAdapter, path: &str) -> Result<()> {
    let path = object_path(path)?;
    match adapter
        .get_metadata(&path)
        .await
        .context("Failed to fetch metadata")?
    {
        Some(metadata) => println!("{}", serde_json::to_string_pretty(&metadata)?),
        None => anyhow::bail!("No object at {}", path),
    }
    Ok(())
}

/// Print whether an object exists.
async fn cmd_exists(adapter: &dyn StorageAdapter, path: &str) -> Result<()> {
    let path = object_path(path)?;
    let exists = adapter
        .exists(&path)
        .await
        .context("Failed to check object")?;
    println!("{}", exists);
    Ok(())
}

/// Issue a signed download URL. The URL goes to stdout only.
async fn cmd_url(adapter: Arc<dyn StorageAdapter>, requester: &str, path: &str) -> Result<()> {
    let gateway = SignedAccessGateway::new(adapter);
    let download = gateway
        .issue_download_url(requester, path)
        .await
        .context("Failed to issue download URL")?;

    println!("{}", download.signed.url);
    println!("  File: {}", download.filename);
    println!("  Expires: {}", download.signed.expires_at);
    Ok(())
}

/// Validate the provider and optionally persist the outcome.
async fn cmd_validate(
    adapter: &dyn StorageAdapter,
    mut config: StorageProviderConfig,
    config_path: &Path,
    tenant: &str,
    save: bool,
) -> Result<()> {
    let tenant = TenantId::new(tenant).context("Invalid tenant id")?;
    let outcome = validate_provider(adapter, &tenant).await;

    match &outcome {
        ValidationOutcome::Success => println!("Provider {} is reachable.", config.id),
        ValidationOutcome::Failed(message) => println!("Provider {} failed: {}", config.id, message),
    }

    if save {
        config.record_validation(&outcome, Utc::now());
        let json = serde_json::to_string_pretty(&config)?;
        tokio::fs::write(config_path, json)
            .await
            .context("Failed to save config")?;
        println!("Validation status saved to {}", config_path.display());
    }

    match outcome {
        ValidationOutcome::Success => Ok(()),
        ValidationOutcome::Failed(_) => anyhow::bail!("Validation failed"),
    }
}
