use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has the database locked
    #[error("Another feedsync process appears to be using the database. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A folder name was empty after sanitization
    #[error("Invalid folder name: {0:?}")]
    InvalidName(String),

    /// A stored value could not be decoded
    #[error("Corrupt value in {table}: {value}")]
    Corrupt { table: &'static str, value: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Status Keys
// ============================================================================

/// The two boolean dimensions of an article status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKey {
    Read,
    Starred,
}

impl StatusKey {
    /// Column value used by the pending ledger
    pub fn as_str(self) -> &'static str {
        match self {
            StatusKey::Read => "read",
            StatusKey::Starred => "starred",
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self, DatabaseError> {
        match value {
            "read" => Ok(StatusKey::Read),
            "starred" => Ok(StatusKey::Starred),
            other => Err(DatabaseError::Corrupt {
                table: "pending_statuses",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A local folder. `external_id` links it to exactly one remote collection.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Folder {
    pub id: i64,
    pub name: String,
    pub external_id: Option<String>,
}

/// A subscribed feed, keyed by the remote feed resource id.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub feed_id: String,
    pub title: String,
    pub url: String,
    pub home_page_url: Option<String>,
}

/// Input for [`Database::create_feed`](super::Database::create_feed)
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub feed_id: String,
    pub title: String,
    pub url: String,
    pub home_page_url: Option<String>,
}

/// An article as delivered by the remote service, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
    pub article_id: String,
    pub feed_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub external_url: Option<String>,
    pub content_html: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub date_published: Option<DateTime<Utc>>,
    pub date_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Article {
    pub article_id: String,
    pub feed_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub external_url: Option<String>,
    pub content_html: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub published: Option<i64>,
    pub modified: Option<i64>,
    pub fetched_at: i64,
}

/// Account-scoped read/starred state, which may exist before its article.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ArticleStatus {
    pub article_id: String,
    pub read: bool,
    pub starred: bool,
    pub date_arrived: i64,
}

/// A local status change that has not been pushed to the remote yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStatus {
    pub article_id: String,
    pub key: StatusKey,
    pub flag: bool,
    pub inserted_at: DateTime<Utc>,
}

impl PendingStatus {
    pub fn new(article_id: impl Into<String>, key: StatusKey, flag: bool) -> Self {
        Self {
            article_id: article_id.into(),
            key,
            flag,
            inserted_at: Utc::now(),
        }
    }
}
