use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::download::group_by_feed;
use super::SyncEnv;
use crate::engine::error::SyncError;
use crate::engine::operation::{Operation, OperationContext};
use crate::engine::paging::{fetch_stream_contents, StreamFilter};
use crate::remote::ResourceId;
use crate::storage::StatusKey;

/// Pages a stream's contents and stores every article in it.
///
/// Used after subscribing to a feed so its articles show up without waiting
/// for the next full sync. Articles the remote reports unread are marked
/// unread unless a local change is still pending.
pub struct SyncStreamContents {
    env: SyncEnv,
    resource: ResourceId,
    newer_than: Option<DateTime<Utc>>,
}

impl SyncStreamContents {
    pub fn new(env: SyncEnv, resource: ResourceId) -> Self {
        Self {
            env,
            resource,
            newer_than: None,
        }
    }

    pub fn newer_than(mut self, newer_than: DateTime<Utc>) -> Self {
        self.newer_than = Some(newer_than);
        self
    }
}

#[async_trait]
impl Operation for SyncStreamContents {
    fn name(&self) -> &str {
        "sync-stream-contents"
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        let filter = StreamFilter {
            newer_than: self.newer_than,
            unread_only: None,
        };
        let entries = fetch_stream_contents(self.env.remote.as_ref(), &self.resource, filter, ctx.cancel_flag()).await?;
        ctx.check_canceled()?;

        let store = &self.env.store;
        let items_by_feed = group_by_feed(&entries);
        let stored = store.update_feeds_with_items(&items_by_feed, true).await?;

        let pending = store.pending_article_ids(StatusKey::Read).await?;
        let unread: HashSet<String> = entries
            .iter()
            .filter(|e| e.unread && !pending.contains(&e.id))
            .map(|e| e.id.clone())
            .collect();
        if !unread.is_empty() {
            store.mark_as_unread(&unread).await?;
        }

        tracing::info!(
            stream = %self.resource,
            entries = entries.len(),
            stored,
            unread = unread.len(),
            "Synced stream contents"
        );
        Ok(())
    }
}
