use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `":memory:"` opens a private in-memory database on a single pooled
    /// connection, so every query sees the same data.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process holds the
    /// database lock. Returns `DatabaseError::Migration` if the schema cannot
    /// be created.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let in_memory = path == ":memory:";
        let url = format!("sqlite:{}?mode=rwc", path);

        // SEC-010: Pre-create the database file with user-only permissions
        #[cfg(unix)]
        if !in_memory {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set database file permissions");
                }
            } else if db_path.parent().is_some_and(|p| p.exists()) {
                // If creation fails, SQLite reports the error at connect time.
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");

        let mut pool_options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(10));
        pool_options = if in_memory {
            // Each in-memory connection is a separate database; pin exactly one.
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| match e {
            DatabaseError::InstanceLocked => DatabaseError::InstanceLocked,
            other => DatabaseError::Migration(other.to_string()),
        })?;
        db.release_abandoned_selections().await?;
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                external_id TEXT UNIQUE
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                feed_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                home_page_url TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Folder membership; a feed with no rows here lives at the account root.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS folder_feeds (
                folder_id INTEGER NOT NULL REFERENCES folders(id) ON DELETE CASCADE,
                feed_id TEXT NOT NULL REFERENCES feeds(feed_id) ON DELETE CASCADE,
                PRIMARY KEY (folder_id, feed_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                article_id TEXT PRIMARY KEY,
                feed_id TEXT NOT NULL REFERENCES feeds(feed_id) ON DELETE CASCADE,
                title TEXT,
                url TEXT,
                external_url TEXT,
                content_html TEXT,
                summary TEXT,
                author TEXT,
                published INTEGER,
                modified INTEGER,
                fetched_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Statuses are account-scoped and may precede their article.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS statuses (
                article_id TEXT PRIMARY KEY,
                read INTEGER NOT NULL DEFAULT 0,
                starred INTEGER NOT NULL DEFAULT 0,
                date_arrived INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_statuses (
                article_id TEXT NOT NULL,
                key TEXT NOT NULL,
                flag INTEGER NOT NULL,
                inserted_at INTEGER NOT NULL,
                selected INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (article_id, key)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS account_metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_feed ON articles(feed_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_statuses_read ON statuses(read)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_statuses_starred ON statuses(starred)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_folder_feeds_feed ON folder_feeds(feed_id)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Number of rows modified since this connection opened.
    ///
    /// Only meaningful for `":memory:"` databases, which use a single connection.
    pub async fn total_changes(&self) -> Result<i64, DatabaseError> {
        let (changes,): (i64,) = sqlx::query_as("SELECT total_changes()")
            .fetch_one(&self.pool)
            .await?;
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_database() {
        let db = Database::open(":memory:").await.unwrap();
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('folders', 'feeds', 'folder_feeds', 'articles', 'statuses', 'pending_statuses', 'account_metadata')",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(count, 7);
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_file_database_persists() {
        let dir = std::env::temp_dir().join(format!("feedsync_db_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sync.db");
        let path_str = path.to_str().unwrap();

        {
            let db = Database::open(path_str).await.unwrap();
            db.ensure_folder("Tech", Some("c1")).await.unwrap();
            db.pool.close().await;
        }

        let db = Database::open(path_str).await.unwrap();
        let folders = db.folders().await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "Tech");

        db.pool.close().await;
        std::fs::remove_dir_all(&dir).ok();
    }
}
