use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::SecretString;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use feedsync::config::Config;
use feedsync::engine::{Account, SyncError};
use feedsync::remote::{ApiClient, Credentials, OAuthRefresher};
use feedsync::storage::{Database, DatabaseError, StatusKey};

/// Get the config directory path (~/.config/feedsync/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedsync"))
}

#[derive(Parser, Debug)]
#[command(name = "feedsync", about = "Sync a feed-aggregation account into a local database")]
struct Args {
    /// Config file (defaults to ~/.config/feedsync/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push pending changes, then pull folders, feeds, statuses and articles
    Refresh,
    /// Push pending read/starred changes only
    Push,
    /// Pull unread and starred state only
    PullStatuses,
    /// Change the status of articles locally and queue the change for the remote
    Mark {
        #[arg(value_enum)]
        status: MarkStatus,
        #[arg(required = true)]
        article_ids: Vec<String>,
    },
    /// List local folders
    Folders,
    /// Create a folder (a remote collection)
    AddFolder { name: String },
    /// Revoke the session on the remote
    Logout,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MarkStatus {
    Read,
    Unread,
    Starred,
    Unstarred,
}

impl MarkStatus {
    fn key_and_flag(self) -> (StatusKey, bool) {
        match self {
            MarkStatus::Read => (StatusKey::Read, true),
            MarkStatus::Unread => (StatusKey::Read, false),
            MarkStatus::Starred => (StatusKey::Starred, true),
            MarkStatus::Unstarred => (StatusKey::Starred, false),
        }
    }
}

fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
    }

    // SEC-007: Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(config_dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}

fn build_client(config: &Config) -> Result<ApiClient> {
    let base_url = config.api_url().context("Invalid api_base_url")?;
    let client = ApiClient::new(base_url.clone(), Duration::from_secs(config.request_timeout_secs))
        .context("Failed to build HTTP client")?
        .with_batch_sizes(config.mark_batch_size, config.entries_batch_size);

    let client = match (&config.user_id, config.resolved_access_token()) {
        (Some(user_id), Some(token)) => client.with_credentials(Credentials::new(user_id.clone(), token)),
        _ => {
            tracing::warn!("No user_id or access token configured, remote calls will fail");
            client
        }
    };

    let refresher = match (
        config.resolved_refresh_token(),
        &config.client_id,
        &config.client_secret,
    ) {
        (Some(refresh), Some(client_id), Some(secret)) => Some(
            OAuthRefresher::new(
                client.http_client().clone(),
                &base_url,
                client_id.clone(),
                SecretString::from(secret.clone()),
                SecretString::from(refresh),
            )
            .context("Failed to set up token refresh")?,
        ),
        _ => None,
    };

    Ok(match refresher {
        Some(refresher) => client.with_authorizer(Arc::new(refresher)),
        None => client,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    ensure_config_dir(&config_dir)?;

    let config_path = args.config.clone().unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(config = ?config, "Using configuration");

    let db_path = config.database_path_or(&config_dir);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: Another feedsync process appears to be running. Please wait for it to finish.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let client = build_client(&config)?;
    let user_id = config.user_id.clone().unwrap_or_default();
    let account = Account::new(Arc::new(db), Arc::new(client), user_id, config.account_settings());

    match args.command {
        Command::Refresh => {
            let progress = account.progress();
            let reporter = tokio::spawn(report_progress(progress));
            let result = account.refresh_all().await;
            reporter.abort();
            match result {
                Ok(()) => println!("Sync complete."),
                Err(SyncError::NotLoggedIn) => {
                    anyhow::bail!("Not logged in: set user_id and access_token in {}", config_path.display())
                }
                Err(e) => return Err(e).context("Sync failed"),
            }
        }
        Command::Push => {
            account.send_article_statuses().await.context("Failed to push statuses")?;
            println!("Pending statuses pushed.");
        }
        Command::PullStatuses => {
            account
                .refresh_article_statuses()
                .await
                .context("Failed to pull statuses")?;
            println!("Statuses updated.");
        }
        Command::Mark { status, article_ids } => {
            let (key, flag) = status.key_and_flag();
            let ids: HashSet<String> = article_ids.into_iter().collect();
            account
                .mark_articles(&ids, key, flag)
                .await
                .context("Failed to mark articles")?;
            println!("Marked {} article(s) as {:?}.", ids.len(), status);
        }
        Command::Folders => {
            let folders = account.store().folders().await.context("Failed to load folders")?;
            for folder in folders {
                let feeds = account
                    .store()
                    .feed_ids_in_folder(folder.id)
                    .await
                    .context("Failed to load folder feeds")?;
                println!(
                    "{}\t{} feed(s)\t{}",
                    folder.name,
                    feeds.len(),
                    folder.external_id.as_deref().unwrap_or("-")
                );
            }
        }
        Command::AddFolder { name } => {
            let folder = account.create_folder(&name).await.context("Failed to create folder")?;
            println!("Created folder {}.", folder.name);
        }
        Command::Logout => {
            account.logout().await.context("Failed to log out")?;
            println!("Logged out.");
        }
    }

    Ok(())
}

async fn report_progress(mut progress: tokio::sync::watch::Receiver<feedsync::engine::ProgressInfo>) {
    while progress.changed().await.is_ok() {
        let info = *progress.borrow();
        if info.number_of_tasks > 0 {
            tracing::info!(
                completed = info.number_completed,
                total = info.number_of_tasks,
                "Sync progress"
            );
        }
    }
}
