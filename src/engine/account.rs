//! The account facade used by the binary.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::watch;

use super::error::SyncError;
use super::operation::Outcome;
use super::progress::{Progress, ProgressInfo};
use super::queue::{Enqueue, OperationQueue, QueueHandle};
use super::stages::{ReconcileStatuses, SendArticleStatuses, StatusKind, SyncEnv, SyncStreamContents};
use super::sync_all::{SyncAll, SyncSettings};
use crate::remote::{RemoteSyncClient, ResourceId, TransportError};
use crate::storage::{Feed, Folder, LocalStore, PendingStatus, StatusKey};

/// Pending records above which marking pushes immediately.
pub const DEFAULT_PENDING_PUSH_THRESHOLD: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSettings {
    pub sync: SyncSettings,
    pub pending_push_threshold: u64,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            sync: SyncSettings::default(),
            pending_push_threshold: DEFAULT_PENDING_PUSH_THRESHOLD,
        }
    }
}

/// A synced account: local store, remote client and the queue that runs
/// operations between them.
///
/// At most one full sync runs at a time. All operations share one progress
/// counter, which clears itself once nothing is outstanding.
pub struct Account {
    env: SyncEnv,
    queue: QueueHandle,
    progress: Progress,
    settings: AccountSettings,
    syncing: AtomicBool,
    current: Mutex<Option<Arc<SyncAll>>>,
    network_suspended: AtomicBool,
}

/// Releases the single-sync slot. Cancels the sync if the caller stopped
/// waiting for it.
struct SyncGuard<'a> {
    account: &'a Account,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        if let Some(sync) = self.account.current_sync().take() {
            sync.cancel();
        }
        self.account.syncing.store(false, Ordering::Release);
    }
}

impl Account {
    /// Create the account and spawn its operation queue on the current runtime.
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteSyncClient>,
        user_id: impl Into<String>,
        settings: AccountSettings,
    ) -> Self {
        Self {
            env: SyncEnv::new(store, remote, user_id),
            queue: OperationQueue::spawn(),
            progress: Progress::new(),
            settings,
            syncing: AtomicBool::new(false),
            current: Mutex::new(None),
            network_suspended: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.env.store
    }

    pub fn user_id(&self) -> &str {
        &self.env.user_id
    }

    /// Outstanding work of everything queued for this account.
    pub fn progress(&self) -> watch::Receiver<ProgressInfo> {
        self.progress.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    fn current_sync(&self) -> std::sync::MutexGuard<'_, Option<Arc<SyncAll>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_network(&self) -> Result<(), SyncError> {
        if self.network_suspended.load(Ordering::Acquire) {
            return Err(SyncError::Transport(TransportError::Suspended));
        }
        Ok(())
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Run a full sync.
    ///
    /// Returns `Ok(())` straight away if a sync is already running. The
    /// start time is recorded only when the sync succeeds, so the next sync
    /// asks for changes since the last good one. Dropping the returned
    /// future cancels the sync.
    pub async fn refresh_all(&self) -> Result<(), SyncError> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync already running, ignoring refresh");
            return Ok(());
        }
        let _guard = SyncGuard { account: self };
        self.check_network()?;

        let started_at = Utc::now();
        let newer_than = self.env.store.last_article_fetch_start().await?;

        let session = SyncAll::start(
            self.env.clone(),
            self.queue.clone(),
            self.progress.clone(),
            self.settings.sync,
            newer_than,
        );
        *self.current_sync() = Some(Arc::clone(session.sync()));

        session.wait().await?;
        self.env.store.set_last_article_fetch(started_at, Utc::now()).await?;
        Ok(())
    }

    /// Cancel the running sync, if any.
    pub fn cancel_sync(&self) {
        if let Some(sync) = self.current_sync().as_ref() {
            sync.cancel();
        }
    }

    /// Push pending statuses without a full sync.
    pub async fn send_article_statuses(&self) -> Result<(), SyncError> {
        self.check_network()?;
        let operation = SendArticleStatuses::new(self.env.clone()).with_batch_size(self.settings.sync.mark_batch_size);
        self.queue
            .run(Enqueue::new(operation).progress(self.progress.clone()))
            .await
            .into_result()
    }

    /// Reconcile unread and starred state without a full sync.
    pub async fn refresh_article_statuses(&self) -> Result<(), SyncError> {
        self.check_network()?;
        let unread = self.queue.run(
            Enqueue::new(ReconcileStatuses::new(self.env.clone(), StatusKind::Unread)).progress(self.progress.clone()),
        );
        let starred = self.queue.run(
            Enqueue::new(ReconcileStatuses::new(self.env.clone(), StatusKind::Starred)).progress(self.progress.clone()),
        );
        let (unread, starred) = futures::join!(unread, starred);
        unread.into_result()?;
        starred.into_result()
    }

    /// Change a status locally and record it for the next push.
    ///
    /// Pushes right away once more than the configured number of records are
    /// waiting. A failed push leaves the records pending and is only logged.
    pub async fn mark_articles(&self, article_ids: &HashSet<String>, key: StatusKey, flag: bool) -> Result<(), SyncError> {
        if article_ids.is_empty() {
            return Ok(());
        }

        let store = &self.env.store;
        store.mark(article_ids, key, flag).await?;
        let records: Vec<PendingStatus> = article_ids
            .iter()
            .map(|id| PendingStatus::new(id.clone(), key, flag))
            .collect();
        store.insert_pending_statuses(&records).await?;

        let pending = store.pending_count().await?;
        tracing::debug!(count = article_ids.len(), key = %key, flag, pending, "Marked articles");
        if pending > self.settings.pending_push_threshold {
            if let Err(e) = self.send_article_statuses().await {
                tracing::warn!(error = %e, "Failed to push pending statuses");
            }
        }
        Ok(())
    }

    // ========================================================================
    // Folders and Feeds
    // ========================================================================

    /// Create a remote collection and its local folder.
    pub async fn create_folder(&self, name: &str) -> Result<Folder, SyncError> {
        self.check_network()?;
        let collection = self.env.remote.create_collection(name).await?;
        let folder = self
            .env
            .store
            .ensure_folder(&collection.folder_name(), Some(&collection.id))
            .await?;
        tracing::info!(folder = %folder.name, collection = %collection.id, "Created folder");
        Ok(folder)
    }

    /// Rename a folder locally right away, then remotely. The local name is
    /// restored if the remote rename fails.
    pub async fn rename_folder(&self, folder: &Folder, name: &str) -> Result<(), SyncError> {
        self.check_network()?;
        let collection_id = linked_collection(folder)?;
        let store = &self.env.store;

        store.rename_folder(folder.id, name).await?;
        if let Err(e) = self.env.remote.rename_collection(collection_id, name).await {
            tracing::warn!(folder = %folder.name, error = %e, "Remote rename failed, restoring name");
            store.rename_folder(folder.id, &folder.name).await?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Delete the remote collection, then the folder. Its feeds move to the root.
    pub async fn remove_folder(&self, folder: &Folder) -> Result<(), SyncError> {
        self.check_network()?;
        if let Some(collection_id) = folder.external_id.as_deref() {
            self.env.remote.delete_collection(collection_id).await?;
        }
        self.env.store.remove_folder(folder.id).await?;
        Ok(())
    }

    /// Subscribe to `url` inside `folder` and load the feed's articles.
    ///
    /// The feed is kept even if loading its articles fails; the next sync
    /// picks them up.
    pub async fn add_feed_to_folder(&self, url: &str, title: Option<&str>, folder: &Folder) -> Result<Feed, SyncError> {
        self.check_network()?;
        let collection_id = linked_collection(folder)?;
        let store = &self.env.store;
        let resource = ResourceId::feed(url);

        let remote_feeds = self.env.remote.add_feed(&resource, title, collection_id).await?;
        let remote_feed = remote_feeds
            .into_iter()
            .find(|f| f.id == resource.as_str())
            .ok_or_else(|| SyncError::NotFound(resource.to_string()))?;

        let feed = match store.existing_feed(&remote_feed.id).await? {
            Some(feed) => {
                let title = remote_feed.display_title();
                if !title.is_empty() && title != feed.title {
                    store.update_feed_title(&feed.feed_id, &title).await?;
                }
                feed
            }
            None => store.create_feed(&remote_feed.to_new_feed()).await?,
        };
        store.add_feed_to_folder(&feed.feed_id, folder.id).await?;

        let ingest = Enqueue::new(SyncStreamContents::new(self.env.clone(), resource)).progress(self.progress.clone());
        match self.queue.run(ingest).await {
            Outcome::Failed(e) => tracing::warn!(feed = %feed.feed_id, error = %e, "Failed to load articles of new feed"),
            Outcome::Canceled => tracing::debug!(feed = %feed.feed_id, "Loading articles of new feed canceled"),
            Outcome::Succeeded => {}
        }
        Ok(feed)
    }

    pub async fn remove_feed_from_folder(&self, feed_id: &str, folder: &Folder) -> Result<(), SyncError> {
        self.check_network()?;
        let collection_id = linked_collection(folder)?;
        self.env.remote.remove_feed(feed_id, collection_id).await?;
        self.env.store.remove_feed_from_folder(feed_id, folder.id).await?;
        Ok(())
    }

    // ========================================================================
    // Network and Session
    // ========================================================================

    /// Abandon in-flight requests and cancel everything queued.
    pub fn suspend_network(&self) {
        tracing::info!("Suspending network");
        self.network_suspended.store(true, Ordering::Release);
        self.env.remote.suspend();
        self.cancel_sync();
        self.queue.cancel_all();
    }

    pub fn resume(&self) {
        tracing::info!("Resuming network");
        self.env.remote.resume();
        self.network_suspended.store(false, Ordering::Release);
    }

    pub async fn logout(&self) -> Result<(), SyncError> {
        self.cancel_sync();
        self.env.remote.logout().await?;
        Ok(())
    }
}

fn linked_collection(folder: &Folder) -> Result<&str, SyncError> {
    folder
        .external_id
        .as_deref()
        .ok_or_else(|| SyncError::NotFound(format!("collection for folder {}", folder.name)))
}
