use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use super::SyncEnv;
use crate::engine::error::SyncError;
use crate::engine::operation::{Operation, OperationContext};
use crate::engine::paging::{fetch_stream_ids, StreamFilter};
use crate::engine::shared::Shared;
use crate::remote::ResourceId;

/// How many days back articles without content are downloaded.
pub const MISSING_CONTENT_DAYS: i64 = 90;

/// Pages every article id of the account and creates unread statuses for
/// the ones not seen before.
pub struct IngestArticleIds {
    env: SyncEnv,
}

impl IngestArticleIds {
    pub fn new(env: SyncEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Operation for IngestArticleIds {
    fn name(&self) -> &str {
        "ingest-article-ids"
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        let resource = ResourceId::all(&self.env.user_id);
        let ids = fetch_stream_ids(
            self.env.remote.as_ref(),
            &resource,
            StreamFilter::default(),
            ctx.cancel_flag(),
        )
        .await?;
        ctx.check_canceled()?;

        let created = self.env.store.create_statuses_if_needed(&ids, false).await?;
        tracing::debug!(ids = ids.len(), created, "Ingested article ids");
        Ok(())
    }
}

/// Ids of articles changed since the last successful sync.
///
/// Without a previous sync there is nothing to compare against and the
/// result is empty; missing content is covered by [`FindMissingArticleIds`].
pub struct FetchUpdatedArticleIds {
    env: SyncEnv,
    newer_than: Option<DateTime<Utc>>,
    output: Shared<HashSet<String>>,
}

impl FetchUpdatedArticleIds {
    pub fn new(env: SyncEnv, newer_than: Option<DateTime<Utc>>, output: Shared<HashSet<String>>) -> Self {
        Self {
            env,
            newer_than,
            output,
        }
    }
}

#[async_trait]
impl Operation for FetchUpdatedArticleIds {
    fn name(&self) -> &str {
        "fetch-updated-article-ids"
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        let Some(newer_than) = self.newer_than else {
            tracing::debug!("No previous sync, skipping updated article ids");
            self.output.set(HashSet::new());
            return Ok(());
        };

        let resource = ResourceId::all(&self.env.user_id);
        let filter = StreamFilter {
            newer_than: Some(newer_than),
            unread_only: None,
        };
        let ids = fetch_stream_ids(self.env.remote.as_ref(), &resource, filter, ctx.cancel_flag()).await?;
        ctx.check_canceled()?;

        tracing::debug!(ids = ids.len(), since = %newer_than, "Fetched updated article ids");
        self.output.set(ids);
        Ok(())
    }
}

/// Unions recent statuses without an article body with the updated ids,
/// giving the set of articles to download.
pub struct FindMissingArticleIds {
    env: SyncEnv,
    updated: Shared<HashSet<String>>,
    output: Shared<HashSet<String>>,
}

impl FindMissingArticleIds {
    pub fn new(env: SyncEnv, updated: Shared<HashSet<String>>, output: Shared<HashSet<String>>) -> Self {
        Self { env, updated, output }
    }
}

#[async_trait]
impl Operation for FindMissingArticleIds {
    fn name(&self) -> &str {
        "find-missing-article-ids"
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        let since = Utc::now() - Duration::days(MISSING_CONTENT_DAYS);
        let mut ids = self.env.store.article_ids_missing_content(since).await?;
        ctx.check_canceled()?;

        let missing = ids.len();
        ids.extend(self.updated.get());
        tracing::debug!(missing, total = ids.len(), "Found articles to download");
        self.output.set(ids);
        Ok(())
    }
}
