use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, PendingStatus, StatusKey};

const BATCH_SIZE: usize = 200;

type PendingRow = (String, String, bool, i64);

// ============================================================================
// Pending Status Ledger
// ============================================================================

impl Database {
    /// Record local status changes awaiting push.
    ///
    /// Last write wins per `(article_id, key)`. A newer write to a record that
    /// is currently selected for processing replaces it and clears the
    /// selection, so a later delete of the selected batch keeps it.
    pub async fn insert_pending_statuses(&self, records: &[PendingStatus]) -> Result<(), DatabaseError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for chunk in records.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO pending_statuses (article_id, key, flag, inserted_at, selected) ");
            builder.push_values(chunk, |mut b, record| {
                b.push_bind(&record.article_id)
                    .push_bind(record.key.as_str())
                    .push_bind(record.flag)
                    .push_bind(record.inserted_at.timestamp_millis())
                    .push_bind(false);
            });
            builder.push(
                " ON CONFLICT(article_id, key) DO UPDATE SET flag = excluded.flag, \
                 inserted_at = excluded.inserted_at, selected = 0",
            );
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Mark every unselected record as selected and return them, oldest first.
    pub async fn select_pending_for_processing(&self) -> Result<Vec<PendingStatus>, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE pending_statuses SET selected = 1 WHERE selected = 0")
            .execute(&mut *tx)
            .await?;
        let rows: Vec<PendingRow> = sqlx::query_as(
            "SELECT article_id, key, flag, inserted_at FROM pending_statuses \
             WHERE selected = 1 ORDER BY inserted_at, article_id",
        )
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.into_iter()
            .map(|(article_id, key, flag, inserted_at)| {
                Ok(PendingStatus {
                    article_id,
                    key: StatusKey::parse(&key)?,
                    flag,
                    inserted_at: DateTime::<Utc>::from_timestamp_millis(inserted_at).unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Ids with an un-pushed change for `key`, selected or not.
    pub async fn pending_article_ids(&self, key: StatusKey) -> Result<HashSet<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT article_id FROM pending_statuses WHERE key = ?")
            .bind(key.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Drop selected records after a successful push.
    pub async fn delete_selected_for_processing(
        &self,
        key: StatusKey,
        article_ids: &[String],
    ) -> Result<u64, DatabaseError> {
        self.update_selected(
            "DELETE FROM pending_statuses WHERE selected = 1 AND key = ",
            key,
            article_ids,
        )
        .await
    }

    /// Return selected records to the queue after a failed push.
    pub async fn reset_selected_for_processing(
        &self,
        key: StatusKey,
        article_ids: &[String],
    ) -> Result<u64, DatabaseError> {
        self.update_selected(
            "UPDATE pending_statuses SET selected = 0 WHERE selected = 1 AND key = ",
            key,
            article_ids,
        )
        .await
    }

    async fn update_selected(
        &self,
        prefix: &'static str,
        key: StatusKey,
        article_ids: &[String],
    ) -> Result<u64, DatabaseError> {
        if article_ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for chunk in article_ids.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(prefix);
            builder.push_bind(key.as_str());
            builder.push(" AND article_id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");
            affected += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    pub async fn pending_count(&self) -> Result<u64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_statuses")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Selections left behind by an interrupted push are released on open.
    pub(crate) async fn release_abandoned_selections(&self) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE pending_statuses SET selected = 0 WHERE selected = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
