use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::DatabaseError;

const LAST_FETCH_START: &str = "last_article_fetch_start";
const LAST_FETCH_END: &str = "last_article_fetch_end";

// ============================================================================
// Account Metadata
// ============================================================================

impl Database {
    async fn metadata(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM account_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    async fn metadata_time(&self, key: &str) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        match self.metadata(key).await? {
            Some(value) => DateTime::parse_from_rfc3339(&value)
                .map(|d| Some(d.with_timezone(&Utc)))
                .map_err(|_| DatabaseError::Corrupt {
                    table: "account_metadata",
                    value,
                }),
            None => Ok(None),
        }
    }

    /// Start time of the last sync that completed successfully.
    pub async fn last_article_fetch_start(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        self.metadata_time(LAST_FETCH_START).await
    }

    pub async fn last_article_fetch_end(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        self.metadata_time(LAST_FETCH_END).await
    }

    pub async fn set_last_article_fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in [(LAST_FETCH_START, start), (LAST_FETCH_END, end)] {
            sqlx::query(
                "INSERT INTO account_metadata (key, value) VALUES (?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
