use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{DatabaseError, Feed, Folder, NewFeed, ParsedItem, PendingStatus, StatusKey};

/// Persistence used by the sync engine.
///
/// [`Database`] is the production implementation. Every method maps onto the
/// inherent `Database` method of the same name.
#[async_trait]
pub trait LocalStore: Send + Sync {
    // Folders
    async fn folders(&self) -> Result<Vec<Folder>, DatabaseError>;
    async fn ensure_folder(&self, name: &str, external_id: Option<&str>) -> Result<Folder, DatabaseError>;
    async fn rename_folder(&self, folder_id: i64, name: &str) -> Result<bool, DatabaseError>;
    async fn remove_folder(&self, folder_id: i64) -> Result<Vec<String>, DatabaseError>;

    // Feeds
    async fn feeds(&self) -> Result<Vec<Feed>, DatabaseError>;
    async fn existing_feed(&self, feed_id: &str) -> Result<Option<Feed>, DatabaseError>;
    async fn create_feed(&self, feed: &NewFeed) -> Result<Feed, DatabaseError>;
    async fn update_feed_title(&self, feed_id: &str, title: &str) -> Result<bool, DatabaseError>;
    async fn feed_ids_in_folder(&self, folder_id: i64) -> Result<HashSet<String>, DatabaseError>;
    async fn add_feed_to_folder(&self, feed_id: &str, folder_id: i64) -> Result<bool, DatabaseError>;
    async fn remove_feed_from_folder(&self, feed_id: &str, folder_id: i64) -> Result<bool, DatabaseError>;
    async fn remove_feeds(&self, feed_ids: &[String]) -> Result<u64, DatabaseError>;

    // Statuses
    async fn fetch_unread_article_ids(&self) -> Result<HashSet<String>, DatabaseError>;
    async fn fetch_starred_article_ids(&self) -> Result<HashSet<String>, DatabaseError>;
    async fn mark(&self, article_ids: &HashSet<String>, key: StatusKey, flag: bool) -> Result<u64, DatabaseError>;
    async fn create_statuses_if_needed(&self, article_ids: &HashSet<String>, read: bool) -> Result<u64, DatabaseError>;
    async fn article_ids_missing_content(&self, since: DateTime<Utc>) -> Result<HashSet<String>, DatabaseError>;

    async fn mark_as_read(&self, article_ids: &HashSet<String>) -> Result<u64, DatabaseError> {
        self.mark(article_ids, StatusKey::Read, true).await
    }

    async fn mark_as_unread(&self, article_ids: &HashSet<String>) -> Result<u64, DatabaseError> {
        self.mark(article_ids, StatusKey::Read, false).await
    }

    async fn mark_as_starred(&self, article_ids: &HashSet<String>) -> Result<u64, DatabaseError> {
        self.mark(article_ids, StatusKey::Starred, true).await
    }

    async fn mark_as_unstarred(&self, article_ids: &HashSet<String>) -> Result<u64, DatabaseError> {
        self.mark(article_ids, StatusKey::Starred, false).await
    }

    // Articles
    async fn update_feeds_with_items(
        &self,
        items_by_feed: &HashMap<String, Vec<ParsedItem>>,
        default_read: bool,
    ) -> Result<usize, DatabaseError>;

    // Pending ledger
    async fn insert_pending_statuses(&self, records: &[PendingStatus]) -> Result<(), DatabaseError>;
    async fn select_pending_for_processing(&self) -> Result<Vec<PendingStatus>, DatabaseError>;
    async fn pending_article_ids(&self, key: StatusKey) -> Result<HashSet<String>, DatabaseError>;
    async fn delete_selected_for_processing(&self, key: StatusKey, article_ids: &[String]) -> Result<u64, DatabaseError>;
    async fn reset_selected_for_processing(&self, key: StatusKey, article_ids: &[String]) -> Result<u64, DatabaseError>;
    async fn pending_count(&self) -> Result<u64, DatabaseError>;

    // Account metadata
    async fn last_article_fetch_start(&self) -> Result<Option<DateTime<Utc>>, DatabaseError>;
    async fn set_last_article_fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), DatabaseError>;
}

#[async_trait]
impl LocalStore for Database {
    async fn folders(&self) -> Result<Vec<Folder>, DatabaseError> {
        Database::folders(self).await
    }

    async fn ensure_folder(&self, name: &str, external_id: Option<&str>) -> Result<Folder, DatabaseError> {
        Database::ensure_folder(self, name, external_id).await
    }

    async fn rename_folder(&self, folder_id: i64, name: &str) -> Result<bool, DatabaseError> {
        Database::rename_folder(self, folder_id, name).await
    }

    async fn remove_folder(&self, folder_id: i64) -> Result<Vec<String>, DatabaseError> {
        Database::remove_folder(self, folder_id).await
    }

    async fn feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        Database::feeds(self).await
    }

    async fn existing_feed(&self, feed_id: &str) -> Result<Option<Feed>, DatabaseError> {
        Database::existing_feed(self, feed_id).await
    }

    async fn create_feed(&self, feed: &NewFeed) -> Result<Feed, DatabaseError> {
        Database::create_feed(self, feed).await
    }

    async fn update_feed_title(&self, feed_id: &str, title: &str) -> Result<bool, DatabaseError> {
        Database::update_feed_title(self, feed_id, title).await
    }

    async fn feed_ids_in_folder(&self, folder_id: i64) -> Result<HashSet<String>, DatabaseError> {
        Database::feed_ids_in_folder(self, folder_id).await
    }

    async fn add_feed_to_folder(&self, feed_id: &str, folder_id: i64) -> Result<bool, DatabaseError> {
        Database::add_feed_to_folder(self, feed_id, folder_id).await
    }

    async fn remove_feed_from_folder(&self, feed_id: &str, folder_id: i64) -> Result<bool, DatabaseError> {
        Database::remove_feed_from_folder(self, feed_id, folder_id).await
    }

    async fn remove_feeds(&self, feed_ids: &[String]) -> Result<u64, DatabaseError> {
        Database::remove_feeds(self, feed_ids).await
    }

    async fn fetch_unread_article_ids(&self) -> Result<HashSet<String>, DatabaseError> {
        Database::fetch_unread_article_ids(self).await
    }

    async fn fetch_starred_article_ids(&self) -> Result<HashSet<String>, DatabaseError> {
        Database::fetch_starred_article_ids(self).await
    }

    async fn mark(&self, article_ids: &HashSet<String>, key: StatusKey, flag: bool) -> Result<u64, DatabaseError> {
        Database::mark(self, article_ids, key, flag).await
    }

    async fn create_statuses_if_needed(&self, article_ids: &HashSet<String>, read: bool) -> Result<u64, DatabaseError> {
        Database::create_statuses_if_needed(self, article_ids, read).await
    }

    async fn article_ids_missing_content(&self, since: DateTime<Utc>) -> Result<HashSet<String>, DatabaseError> {
        Database::article_ids_missing_content(self, since).await
    }

    async fn update_feeds_with_items(
        &self,
        items_by_feed: &HashMap<String, Vec<ParsedItem>>,
        default_read: bool,
    ) -> Result<usize, DatabaseError> {
        Database::update_feeds_with_items(self, items_by_feed, default_read).await
    }

    async fn insert_pending_statuses(&self, records: &[PendingStatus]) -> Result<(), DatabaseError> {
        Database::insert_pending_statuses(self, records).await
    }

    async fn select_pending_for_processing(&self) -> Result<Vec<PendingStatus>, DatabaseError> {
        Database::select_pending_for_processing(self).await
    }

    async fn pending_article_ids(&self, key: StatusKey) -> Result<HashSet<String>, DatabaseError> {
        Database::pending_article_ids(self, key).await
    }

    async fn delete_selected_for_processing(&self, key: StatusKey, article_ids: &[String]) -> Result<u64, DatabaseError> {
        Database::delete_selected_for_processing(self, key, article_ids).await
    }

    async fn reset_selected_for_processing(&self, key: StatusKey, article_ids: &[String]) -> Result<u64, DatabaseError> {
        Database::reset_selected_for_processing(self, key, article_ids).await
    }

    async fn pending_count(&self) -> Result<u64, DatabaseError> {
        Database::pending_count(self).await
    }

    async fn last_article_fetch_start(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        Database::last_article_fetch_start(self).await
    }

    async fn set_last_article_fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), DatabaseError> {
        Database::set_last_article_fetch(self, start, end).await
    }
}
