//! The operations that make up a sync.
//!
//! Each stage reads what it needs from the store or from a [`Shared`](super::Shared)
//! slot filled by an earlier stage, talks to the remote, and writes the result
//! back. Ordering between stages comes only from queue dependencies.

mod article_ids;
mod collections;
mod download;
mod feeds;
mod folders;
mod send_statuses;
mod statuses;
mod stream_contents;

use std::sync::Arc;

use crate::remote::RemoteSyncClient;
use crate::storage::LocalStore;

pub use article_ids::{
    FetchUpdatedArticleIds, FindMissingArticleIds, IngestArticleIds, MISSING_CONTENT_DAYS,
};
pub use collections::FetchCollections;
pub use download::{DownloadArticles, FetchEntries, UpdateAccount};
pub use feeds::MaterializeFeeds;
pub use folders::MirrorFolders;
pub use send_statuses::SendArticleStatuses;
pub use statuses::{ReconcileStatuses, StatusKind};
pub use stream_contents::SyncStreamContents;

/// Store and remote shared by every stage of one account.
#[derive(Clone)]
pub struct SyncEnv {
    pub store: Arc<dyn LocalStore>,
    pub remote: Arc<dyn RemoteSyncClient>,
    pub user_id: String,
}

impl SyncEnv {
    pub fn new(store: Arc<dyn LocalStore>, remote: Arc<dyn RemoteSyncClient>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            remote,
            user_id: user_id.into(),
        }
    }
}
