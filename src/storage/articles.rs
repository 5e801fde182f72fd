use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use crate::util::strip_rtl_wrapper;

use super::schema::Database;
use super::types::{Article, DatabaseError, ParsedItem};

// ============================================================================
// Article Operations
// ============================================================================

impl Database {
    /// Store downloaded items grouped by feed id.
    ///
    /// Creates a status for every item that has none yet, using `default_read`
    /// for the read flag. Items whose feed is not subscribed locally are
    /// skipped. Returns the number of newly inserted articles.
    pub async fn update_feeds_with_items(
        &self,
        items_by_feed: &HashMap<String, Vec<ParsedItem>>,
        default_read: bool,
    ) -> Result<usize, DatabaseError> {
        if items_by_feed.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        // 11 bind parameters per row keeps each statement under SQLite's 999 limit.
        const BATCH_SIZE: usize = 50;
        let mut total_inserted = 0usize;

        for (feed_id, items) in items_by_feed {
            if items.is_empty() {
                continue;
            }
            let known: Option<(String,)> = sqlx::query_as("SELECT feed_id FROM feeds WHERE feed_id = ?")
                .bind(feed_id)
                .fetch_optional(&mut *tx)
                .await?;
            if known.is_none() {
                tracing::warn!(feed_id = %feed_id, count = items.len(), "Skipping items for unknown feed");
                continue;
            }

            for chunk in items.chunks(BATCH_SIZE) {
                let mut status_builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                    "INSERT OR IGNORE INTO statuses (article_id, read, starred, date_arrived) ",
                );
                status_builder.push_values(chunk, |mut b, item| {
                    b.push_bind(&item.article_id)
                        .push_bind(default_read)
                        .push_bind(false)
                        .push_bind(now);
                });
                status_builder.build().execute(&mut *tx).await?;

                let mut insert_builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                    "INSERT INTO articles (article_id, feed_id, title, url, external_url, content_html, \
                     summary, author, published, modified, fetched_at) ",
                );
                insert_builder.push_values(chunk, |mut b, item| {
                    b.push_bind(&item.article_id)
                        .push_bind(feed_id)
                        .push_bind(item.title.as_deref().map(|t| strip_rtl_wrapper(t).into_owned()))
                        .push_bind(&item.url)
                        .push_bind(&item.external_url)
                        .push_bind(&item.content_html)
                        .push_bind(item.summary.as_deref().map(|t| strip_rtl_wrapper(t).into_owned()))
                        .push_bind(&item.author)
                        .push_bind(item.date_published.map(|d| d.timestamp()))
                        .push_bind(item.date_modified.map(|d| d.timestamp()))
                        .push_bind(now);
                });
                // fetched_at keeps the first-seen time
                insert_builder.push(
                    " ON CONFLICT(article_id) DO UPDATE SET \
                     feed_id = excluded.feed_id, title = excluded.title, url = excluded.url, \
                     external_url = excluded.external_url, content_html = excluded.content_html, \
                     summary = excluded.summary, author = excluded.author, \
                     published = excluded.published, modified = excluded.modified",
                );
                let existing: HashSet<String> = {
                    let mut lookup: QueryBuilder<sqlx::Sqlite> =
                        QueryBuilder::new("SELECT article_id FROM articles WHERE article_id IN (");
                    let mut separated = lookup.separated(", ");
                    for item in chunk {
                        separated.push_bind(&item.article_id);
                    }
                    separated.push_unseparated(")");
                    let rows: Vec<(String,)> = lookup.build_query_as().fetch_all(&mut *tx).await?;
                    rows.into_iter().map(|(id,)| id).collect()
                };
                insert_builder.build().execute(&mut *tx).await?;

                total_inserted += chunk
                    .iter()
                    .filter(|item| !existing.contains(&item.article_id))
                    .map(|item| &item.article_id)
                    .collect::<HashSet<_>>()
                    .len();
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    pub async fn article(&self, article_id: &str) -> Result<Option<Article>, DatabaseError> {
        let article = sqlx::query_as::<_, Article>(
            "SELECT article_id, feed_id, title, url, external_url, content_html, summary, author, \
             published, modified, fetched_at FROM articles WHERE article_id = ?",
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(article)
    }

    pub async fn articles_for_feed(&self, feed_id: &str) -> Result<Vec<Article>, DatabaseError> {
        let articles = sqlx::query_as::<_, Article>(
            "SELECT article_id, feed_id, title, url, external_url, content_html, summary, author, \
             published, modified, fetched_at FROM articles WHERE feed_id = ? \
             ORDER BY published DESC, article_id",
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    /// Ids of statuses that arrived after `since` and have no stored article.
    pub async fn article_ids_missing_content(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT s.article_id FROM statuses s \
             LEFT JOIN articles a ON a.article_id = s.article_id \
             WHERE a.article_id IS NULL AND s.date_arrived >= ?",
        )
        .bind(since.timestamp())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
