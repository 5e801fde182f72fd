use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Weak;

use super::SyncEnv;
use crate::engine::error::SyncError;
use crate::engine::operation::{Operation, OperationContext, OperationDelegate, OperationId};
use crate::engine::progress::Progress;
use crate::engine::queue::Enqueue;
use crate::engine::shared::Shared;
use crate::remote::{Entry, DEFAULT_ENTRIES_BATCH_SIZE};
use crate::storage::ParsedItem;

/// Splits the ids to download into batches and queues a fetch plus an
/// update operation per batch.
///
/// Each update is added as a dependency of `finish`, so the sync does not
/// report completion before every batch is stored.
pub struct DownloadArticles {
    env: SyncEnv,
    ids: Shared<HashSet<String>>,
    finish: OperationId,
    batch_size: usize,
    delegate: Option<Weak<dyn OperationDelegate>>,
    progress: Option<Progress>,
}

impl DownloadArticles {
    pub fn new(env: SyncEnv, ids: Shared<HashSet<String>>, finish: OperationId) -> Self {
        Self {
            env,
            ids,
            finish,
            batch_size: DEFAULT_ENTRIES_BATCH_SIZE,
            delegate: None,
            progress: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Delegate and progress handed to the queued batch operations.
    pub fn with_tracking(mut self, delegate: Weak<dyn OperationDelegate>, progress: Progress) -> Self {
        self.delegate = Some(delegate);
        self.progress = Some(progress);
        self
    }

    fn enqueue(&self, operation: impl Operation + 'static) -> Enqueue {
        let mut request = Enqueue::new(operation);
        if let Some(delegate) = &self.delegate {
            request = request.delegate(delegate.clone());
        }
        if let Some(progress) = &self.progress {
            request = request.progress(progress.clone());
        }
        request
    }
}

#[async_trait]
impl Operation for DownloadArticles {
    fn name(&self) -> &str {
        "download-articles"
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        let mut ids: Vec<String> = self.ids.take().into_iter().collect();
        if ids.is_empty() {
            tracing::debug!("No articles to download");
            return Ok(());
        }
        ids.sort();

        let queue = ctx.queue();
        let mut batches = 0usize;
        for chunk in ids.chunks(self.batch_size) {
            ctx.check_canceled()?;
            let entries = Shared::default();

            let fetch = queue.add(self.enqueue(FetchEntries::new(self.env.clone(), chunk.to_vec(), entries.clone())));
            let update = queue.add(self.enqueue(UpdateAccount::new(self.env.clone(), entries)).after(fetch));
            queue.add_dependency(self.finish, update);
            batches += 1;
        }

        tracing::debug!(articles = ids.len(), batches, "Queued article downloads");
        Ok(())
    }
}

/// Fetches one batch of entries.
pub struct FetchEntries {
    env: SyncEnv,
    ids: Vec<String>,
    output: Shared<Vec<Entry>>,
}

impl FetchEntries {
    pub fn new(env: SyncEnv, ids: Vec<String>, output: Shared<Vec<Entry>>) -> Self {
        Self { env, ids, output }
    }
}

#[async_trait]
impl Operation for FetchEntries {
    fn name(&self) -> &str {
        "fetch-entries"
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        let entries = self.env.remote.get_entries(&self.ids).await?;
        ctx.check_canceled()?;

        tracing::trace!(requested = self.ids.len(), received = entries.len(), "Fetched entries");
        self.output.set(entries);
        Ok(())
    }
}

/// Stores fetched entries, grouped by feed.
///
/// Statuses created here start out read; unread state comes from the unread
/// stream only.
pub struct UpdateAccount {
    env: SyncEnv,
    entries: Shared<Vec<Entry>>,
}

impl UpdateAccount {
    pub fn new(env: SyncEnv, entries: Shared<Vec<Entry>>) -> Self {
        Self { env, entries }
    }
}

pub(crate) fn group_by_feed(entries: &[Entry]) -> HashMap<String, Vec<ParsedItem>> {
    let mut items_by_feed: HashMap<String, Vec<ParsedItem>> = HashMap::new();
    for item in entries.iter().filter_map(Entry::parsed_item) {
        items_by_feed.entry(item.feed_id.clone()).or_default().push(item);
    }
    items_by_feed
}

#[async_trait]
impl Operation for UpdateAccount {
    fn name(&self) -> &str {
        "update-account"
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        ctx.check_canceled()?;
        let entries = self.entries.take();
        if entries.is_empty() {
            return Ok(());
        }

        let items_by_feed = group_by_feed(&entries);
        let stored = self.env.store.update_feeds_with_items(&items_by_feed, true).await?;
        tracing::debug!(feeds = items_by_feed.len(), stored, "Stored downloaded articles");
        Ok(())
    }
}
