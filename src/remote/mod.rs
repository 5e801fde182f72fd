//! Remote feed-aggregation service: the [`RemoteSyncClient`] surface used by
//! the sync engine and its HTTP implementation.

mod auth;
mod client;
mod error;
mod models;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use auth::{Authorizer, Credentials, OAuthRefresher};
pub use client::{ApiClient, DEFAULT_ENTRIES_BATCH_SIZE, DEFAULT_MARK_BATCH_SIZE};
pub use error::TransportError;
pub use models::{
    Collection, Content, Entry, Link, MarkAction, Origin, RemoteFeed, ResourceId, Stream,
    StreamIds, Tag,
};

/// Authenticated, paginated API surface of the remote account.
///
/// Bulk calls (`get_entries`, `mark_articles`) split their ids into bounded
/// batches and succeed only if every batch succeeds.
#[async_trait]
pub trait RemoteSyncClient: Send + Sync {
    async fn get_collections(&self) -> Result<Vec<Collection>, TransportError>;

    /// One page of article ids. `continuation` comes from the previous page.
    async fn get_stream_ids(
        &self,
        resource: &ResourceId,
        continuation: Option<&str>,
        newer_than: Option<DateTime<Utc>>,
        unread_only: Option<bool>,
    ) -> Result<StreamIds, TransportError>;

    /// One page of article contents. `continuation` comes from the previous page.
    async fn get_stream_contents(
        &self,
        resource: &ResourceId,
        continuation: Option<&str>,
        newer_than: Option<DateTime<Utc>>,
        unread_only: Option<bool>,
    ) -> Result<Stream, TransportError>;

    async fn get_entries(&self, ids: &[String]) -> Result<Vec<Entry>, TransportError>;

    async fn mark_articles(&self, ids: &[String], action: MarkAction) -> Result<(), TransportError>;

    /// Subscribe to (or retitle) a feed inside a collection. Returns the
    /// collection's feeds as stored remotely.
    async fn add_feed(
        &self,
        feed: &ResourceId,
        title: Option<&str>,
        collection_id: &str,
    ) -> Result<Vec<RemoteFeed>, TransportError>;

    async fn remove_feed(&self, feed_id: &str, collection_id: &str) -> Result<(), TransportError>;

    async fn create_collection(&self, label: &str) -> Result<Collection, TransportError>;

    async fn rename_collection(&self, collection_id: &str, label: &str) -> Result<Collection, TransportError>;

    async fn delete_collection(&self, collection_id: &str) -> Result<(), TransportError>;

    async fn logout(&self) -> Result<(), TransportError>;

    /// Abandon in-flight requests and reject new ones until [`resume`](Self::resume).
    fn suspend(&self);

    fn resume(&self);
}
