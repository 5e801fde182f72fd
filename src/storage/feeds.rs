use std::collections::HashSet;

use crate::util::sanitize_name;

use super::schema::Database;
use super::types::{DatabaseError, Feed, NewFeed};

const BATCH_SIZE: usize = 500;

// ============================================================================
// Feed Operations
// ============================================================================

impl Database {
    /// All subscribed feeds, ordered by title.
    pub async fn feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let feeds = sqlx::query_as::<_, Feed>(
            "SELECT feed_id, title, url, home_page_url FROM feeds ORDER BY title COLLATE NOCASE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    pub async fn existing_feed(&self, feed_id: &str) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(
            "SELECT feed_id, title, url, home_page_url FROM feeds WHERE feed_id = ?",
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Insert a feed. An existing feed with the same id is returned unchanged.
    pub async fn create_feed(&self, feed: &NewFeed) -> Result<Feed, DatabaseError> {
        let title = sanitize_name(&feed.title);
        sqlx::query(
            "INSERT OR IGNORE INTO feeds (feed_id, title, url, home_page_url) VALUES (?, ?, ?, ?)",
        )
        .bind(&feed.feed_id)
        .bind(&title)
        .bind(&feed.url)
        .bind(&feed.home_page_url)
        .execute(&self.pool)
        .await?;

        self.existing_feed(&feed.feed_id)
            .await?
            .ok_or_else(|| DatabaseError::Corrupt {
                table: "feeds",
                value: feed.feed_id.clone(),
            })
    }

    /// Returns `true` if the title changed.
    pub async fn update_feed_title(&self, feed_id: &str, title: &str) -> Result<bool, DatabaseError> {
        let title = sanitize_name(title);
        let result = sqlx::query("UPDATE feeds SET title = ? WHERE feed_id = ? AND title != ?")
            .bind(&title)
            .bind(feed_id)
            .bind(&title)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn feed_ids_in_folder(&self, folder_id: i64) -> Result<HashSet<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT feed_id FROM folder_feeds WHERE folder_id = ?")
            .bind(folder_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Feeds that belong to no folder.
    pub async fn root_feed_ids(&self) -> Result<HashSet<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT feed_id FROM feeds WHERE feed_id NOT IN (SELECT feed_id FROM folder_feeds)",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Returns `true` if the membership was added.
    pub async fn add_feed_to_folder(&self, feed_id: &str, folder_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("INSERT OR IGNORE INTO folder_feeds (folder_id, feed_id) VALUES (?, ?)")
            .bind(folder_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `true` if the membership existed.
    pub async fn remove_feed_from_folder(
        &self,
        feed_id: &str,
        folder_id: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM folder_feeds WHERE folder_id = ? AND feed_id = ?")
            .bind(folder_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Unsubscribe feeds. Their articles and folder memberships cascade.
    pub async fn remove_feeds(&self, feed_ids: &[String]) -> Result<u64, DatabaseError> {
        if feed_ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for chunk in feed_ids.chunks(BATCH_SIZE) {
            let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
                sqlx::QueryBuilder::new("DELETE FROM feeds WHERE feed_id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");
            removed += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn new_feed(id: &str, title: &str) -> NewFeed {
        NewFeed {
            feed_id: id.to_string(),
            title: title.to_string(),
            url: id.trim_start_matches("feed/").to_string(),
            home_page_url: Some("https://example.com".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_feed_is_idempotent() {
        let db = test_db().await;
        let a = db.create_feed(&new_feed("feed/https://a.com/rss", "A")).await.unwrap();
        let b = db.create_feed(&new_feed("feed/https://a.com/rss", "Other")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(b.title, "A");
        assert_eq!(db.feeds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_feed_title_only_when_changed() {
        let db = test_db().await;
        db.create_feed(&new_feed("feed/x", "X")).await.unwrap();
        assert!(!db.update_feed_title("feed/x", "X").await.unwrap());
        assert!(db.update_feed_title("feed/x", "Y").await.unwrap());
        assert_eq!(db.existing_feed("feed/x").await.unwrap().unwrap().title, "Y");
    }

    #[tokio::test]
    async fn test_folder_membership() {
        let db = test_db().await;
        let folder = db.ensure_folder("Tech", None).await.unwrap();
        db.create_feed(&new_feed("feed/x", "X")).await.unwrap();

        assert!(db.add_feed_to_folder("feed/x", folder.id).await.unwrap());
        assert!(!db.add_feed_to_folder("feed/x", folder.id).await.unwrap());
        assert!(db.feed_ids_in_folder(folder.id).await.unwrap().contains("feed/x"));
        assert!(db.root_feed_ids().await.unwrap().is_empty());

        assert!(db.remove_feed_from_folder("feed/x", folder.id).await.unwrap());
        assert!(db.root_feed_ids().await.unwrap().contains("feed/x"));
    }

    #[tokio::test]
    async fn test_remove_feeds_cascades_membership() {
        let db = test_db().await;
        let folder = db.ensure_folder("Tech", None).await.unwrap();
        db.create_feed(&new_feed("feed/x", "X")).await.unwrap();
        db.add_feed_to_folder("feed/x", folder.id).await.unwrap();

        let removed = db.remove_feeds(&["feed/x".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(db.feed_ids_in_folder(folder.id).await.unwrap().is_empty());
        assert!(db.existing_feed("feed/x").await.unwrap().is_none());
    }
}
