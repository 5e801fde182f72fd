//! Configuration file parser for ~/.config/feedsync/config.toml.
//!
//! The config file is optional and a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::engine::{AccountSettings, SyncSettings, DEFAULT_PENDING_PUSH_THRESHOLD};
use crate::remote::{DEFAULT_ENTRIES_BATCH_SIZE, DEFAULT_MARK_BATCH_SIZE};
use crate::util::{validate_api_base_url, UrlValidationError};

/// Environment variable overriding `access_token`.
pub const ACCESS_TOKEN_ENV: &str = "FEEDSYNC_ACCESS_TOKEN";
/// Environment variable overriding `refresh_token`.
pub const REFRESH_TOKEN_ENV: &str = "FEEDSYNC_REFRESH_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid api_base_url: {0}")]
    ApiUrl(#[from] UrlValidationError),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Account and sync configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// SEC-015: Custom Debug impl masks tokens and the client secret.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the remote API. Must be HTTPS unless it points at localhost.
    pub api_base_url: String,

    /// Remote user id, used to address the account's streams.
    pub user_id: Option<String>,

    /// OAuth access token. `FEEDSYNC_ACCESS_TOKEN` takes precedence.
    pub access_token: Option<String>,

    /// OAuth refresh token. `FEEDSYNC_REFRESH_TOKEN` takes precedence.
    pub refresh_token: Option<String>,

    /// OAuth client used for refresh-token grants.
    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    /// SQLite database file. Defaults to `feedsync.db` in the config directory.
    pub database_path: Option<PathBuf>,

    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,

    /// Ids per mark request.
    pub mark_batch_size: usize,

    /// Ids per entry download request.
    pub entries_batch_size: usize,

    /// Pending status changes that trigger an immediate push.
    pub pending_push_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://cloud.feedly.com/".to_string(),
            user_id: None,
            access_token: None,
            refresh_token: None,
            client_id: None,
            client_secret: None,
            database_path: None,
            request_timeout_secs: 60,
            mark_batch_size: DEFAULT_MARK_BATCH_SIZE,
            entries_batch_size: DEFAULT_ENTRIES_BATCH_SIZE,
            pending_push_threshold: DEFAULT_PENDING_PUSH_THRESHOLD,
        }
    }
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "[REDACTED]")
}

/// SEC-015: Mask secrets in Debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("user_id", &self.user_id)
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("database_path", &self.database_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("mark_batch_size", &self.mark_batch_size)
            .field("entries_batch_size", &self.entries_batch_size)
            .field("pending_push_threshold", &self.pending_push_threshold)
            .finish()
    }
}

const KNOWN_KEYS: [&str; 11] = [
    "api_base_url",
    "user_id",
    "access_token",
    "refresh_token",
    "client_id",
    "client_secret",
    "database_path",
    "request_timeout_secs",
    "mark_batch_size",
    "entries_batch_size",
    "pending_push_threshold",
];

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Zero batch sizes or timeout → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(path = %path.display(), api = %config.api_base_url, "Loaded configuration");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be positive".into()));
        }
        if self.mark_batch_size == 0 || self.entries_batch_size == 0 {
            return Err(ConfigError::Invalid("batch sizes must be positive".into()));
        }
        Ok(())
    }

    /// The validated API base URL.
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        Ok(validate_api_base_url(&self.api_base_url)?)
    }

    /// Access token, preferring the environment over the file.
    pub fn resolved_access_token(&self) -> Option<String> {
        prefer_env(std::env::var(ACCESS_TOKEN_ENV).ok(), &self.access_token)
    }

    /// Refresh token, preferring the environment over the file.
    pub fn resolved_refresh_token(&self) -> Option<String> {
        prefer_env(std::env::var(REFRESH_TOKEN_ENV).ok(), &self.refresh_token)
    }

    pub fn database_path_or(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("feedsync.db"))
    }

    pub fn account_settings(&self) -> AccountSettings {
        AccountSettings {
            sync: SyncSettings {
                mark_batch_size: self.mark_batch_size,
                entries_batch_size: self.entries_batch_size,
            },
            pending_push_threshold: self.pending_push_threshold,
        }
    }
}

fn prefer_env(env: Option<String>, file: &Option<String>) -> Option<String> {
    env.filter(|v| !v.trim().is_empty())
        .or_else(|| file.clone().filter(|v| !v.trim().is_empty()))
}

// ============================================================================
// Tests
// ============================================================================
