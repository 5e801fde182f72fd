use std::collections::HashSet;

use chrono::Utc;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{ArticleStatus, DatabaseError, StatusKey};

// 4 bind parameters per row
const BATCH_SIZE: usize = 200;

// ============================================================================
// Status Operations
// ============================================================================

impl Database {
    pub async fn status(&self, article_id: &str) -> Result<Option<ArticleStatus>, DatabaseError> {
        let status = sqlx::query_as::<_, ArticleStatus>(
            "SELECT article_id, read, starred, date_arrived FROM statuses WHERE article_id = ?",
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }

    pub async fn fetch_unread_article_ids(&self) -> Result<HashSet<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT article_id FROM statuses WHERE read = 0")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn fetch_starred_article_ids(&self) -> Result<HashSet<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT article_id FROM statuses WHERE starred = 1")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Set one status flag on every id, creating missing statuses.
    ///
    /// Rows that already hold `flag` are not touched. Returns the number of
    /// rows inserted or changed.
    pub async fn mark(
        &self,
        article_ids: &HashSet<String>,
        key: StatusKey,
        flag: bool,
    ) -> Result<u64, DatabaseError> {
        if article_ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().timestamp();
        let ids: Vec<&String> = article_ids.iter().collect();
        let column = key.as_str();
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;

        for chunk in ids.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO statuses (article_id, read, starred, date_arrived) ");
            builder.push_values(chunk, |mut b, id| {
                let (read, starred) = match key {
                    StatusKey::Read => (flag, false),
                    StatusKey::Starred => (false, flag),
                };
                b.push_bind(id.as_str())
                    .push_bind(read)
                    .push_bind(starred)
                    .push_bind(now);
            });
            // `column` is one of two fixed identifiers, never user input
            builder.push(format!(
                " ON CONFLICT(article_id) DO UPDATE SET {column} = excluded.{column} \
                 WHERE statuses.{column} != excluded.{column}"
            ));
            changed += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(changed)
    }

    /// Insert statuses for ids that have none. Existing statuses are untouched.
    pub async fn create_statuses_if_needed(
        &self,
        article_ids: &HashSet<String>,
        read: bool,
    ) -> Result<u64, DatabaseError> {
        if article_ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().timestamp();
        let ids: Vec<&String> = article_ids.iter().collect();
        let mut tx = self.pool.begin().await?;
        let mut created = 0;

        for chunk in ids.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO statuses (article_id, read, starred, date_arrived) ",
            );
            builder.push_values(chunk, |mut b, id| {
                b.push_bind(id.as_str())
                    .push_bind(read)
                    .push_bind(false)
                    .push_bind(now);
            });
            created += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(created)
    }
}
