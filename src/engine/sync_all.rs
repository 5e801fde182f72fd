//! Full account sync.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::checkpoint::{Checkpoint, CheckpointDelegate};
use super::error::SyncError;
use super::operation::{OperationDelegate, OperationId};
use super::progress::Progress;
use super::queue::{Enqueue, QueueHandle};
use super::shared::Shared;
use super::stages::{
    DownloadArticles, FetchCollections, FetchUpdatedArticleIds, FindMissingArticleIds,
    IngestArticleIds, MaterializeFeeds, MirrorFolders, ReconcileStatuses, SendArticleStatuses,
    StatusKind, SyncEnv,
};
use crate::remote::{DEFAULT_ENTRIES_BATCH_SIZE, DEFAULT_MARK_BATCH_SIZE};

/// Batch sizes used by a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub mark_batch_size: usize,
    pub entries_batch_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mark_batch_size: DEFAULT_MARK_BATCH_SIZE,
            entries_batch_size: DEFAULT_ENTRIES_BATCH_SIZE,
        }
    }
}

/// One sync session: the stage graph plus its single result.
///
/// Every stage reports failures here. The first failure (or cancellation)
/// decides the result and cancels everything left in the queue; later
/// failures are only logged by the queue. Success is reported when the
/// finish checkpoint runs.
pub struct SyncAll {
    sync_id: Uuid,
    queue: QueueHandle,
    result: Mutex<Option<oneshot::Sender<Result<(), SyncError>>>>,
}

/// Handle to a running [`SyncAll`].
pub struct SyncSession {
    sync: Arc<SyncAll>,
    result: oneshot::Receiver<Result<(), SyncError>>,
    started: Instant,
}

/// Stage ids of one sync graph.
#[derive(Debug, Clone, Copy)]
pub struct SyncGraph {
    pub send_statuses: OperationId,
    pub fetch_collections: OperationId,
    pub mirror_folders: OperationId,
    pub materialize_feeds: OperationId,
    pub ingest_ids: OperationId,
    pub unread: OperationId,
    pub starred: OperationId,
    pub updated_ids: OperationId,
    pub missing_ids: OperationId,
    pub download: OperationId,
    pub finish: OperationId,
}

impl SyncAll {
    /// Queue the stage graph and return a handle to wait on.
    ///
    /// The queue is suspended while the graph is added so no stage can start
    /// against a half-built graph. `newer_than` is the start of the last
    /// successful sync.
    pub fn start(
        env: SyncEnv,
        queue: QueueHandle,
        progress: Progress,
        settings: SyncSettings,
        newer_than: Option<DateTime<Utc>>,
    ) -> SyncSession {
        let (tx, rx) = oneshot::channel();
        let sync = Arc::new(SyncAll {
            sync_id: Uuid::new_v4(),
            queue,
            result: Mutex::new(Some(tx)),
        });

        tracing::info!(sync_id = %sync.sync_id, since = ?newer_than, "Starting sync");
        let graph = sync.build(env, progress, settings, newer_than);
        tracing::debug!(sync_id = %sync.sync_id, graph = ?graph, "Queued sync stages");

        SyncSession {
            sync,
            result: rx,
            started: Instant::now(),
        }
    }

    fn build(
        self: &Arc<Self>,
        env: SyncEnv,
        progress: Progress,
        settings: SyncSettings,
        newer_than: Option<DateTime<Utc>>,
    ) -> SyncGraph {
        let queue = &self.queue;
        let this: Weak<SyncAll> = Arc::downgrade(self);
        let delegate: Weak<dyn OperationDelegate> = this.clone();
        let checkpoint_delegate: Weak<dyn CheckpointDelegate> = this.clone();
        let track = |request: Enqueue| request.delegate(delegate.clone()).progress(progress.clone());

        let collections = Shared::default();
        let updated = Shared::default();
        let missing = Shared::default();

        queue.suspend();

        let send_statuses = queue.add(track(Enqueue::new(
            SendArticleStatuses::new(env.clone()).with_batch_size(settings.mark_batch_size),
        )));
        let fetch_collections = queue.add(
            track(Enqueue::new(FetchCollections::new(env.clone(), collections.clone()))).after(send_statuses),
        );
        let mirror_folders = queue.add(
            track(Enqueue::new(MirrorFolders::new(env.clone(), collections.clone()))).after(fetch_collections),
        );
        let materialize_feeds =
            queue.add(track(Enqueue::new(MaterializeFeeds::new(env.clone(), collections))).after(mirror_folders));
        let ingest_ids = queue.add(track(Enqueue::new(IngestArticleIds::new(env.clone()))).after(materialize_feeds));
        let unread = queue.add(
            track(Enqueue::new(ReconcileStatuses::new(env.clone(), StatusKind::Unread))).after(ingest_ids),
        );
        let starred = queue.add(
            track(Enqueue::new(ReconcileStatuses::new(env.clone(), StatusKind::Starred))).after(materialize_feeds),
        );
        let updated_ids = queue.add(
            track(Enqueue::new(FetchUpdatedArticleIds::new(env.clone(), newer_than, updated.clone())))
                .after(materialize_feeds),
        );
        let missing_ids = queue.add(
            track(Enqueue::new(FindMissingArticleIds::new(env.clone(), updated, missing.clone())))
                .after_all([ingest_ids, unread, starred, updated_ids]),
        );

        let on_finish = this;
        let finish = queue.add(
            Enqueue::new(Checkpoint::new("sync-finished", checkpoint_delegate))
                .after(missing_ids)
                .progress(progress.clone())
                .on_complete(move |outcome| {
                    if outcome.is_canceled() {
                        if let Some(sync) = on_finish.upgrade() {
                            sync.cancel();
                        }
                    }
                }),
        );
        let download = queue.add(
            track(Enqueue::new(
                DownloadArticles::new(env, missing, finish)
                    .with_batch_size(settings.entries_batch_size)
                    .with_tracking(delegate.clone(), progress.clone()),
            ))
            .after_all([missing_ids, updated_ids]),
        );
        queue.add_dependency(finish, download);

        queue.resume();

        SyncGraph {
            send_statuses,
            fetch_collections,
            mirror_folders,
            materialize_feeds,
            ingest_ids,
            unread,
            starred,
            updated_ids,
            missing_ids,
            download,
            finish,
        }
    }

    pub fn sync_id(&self) -> Uuid {
        self.sync_id
    }

    /// Stop the sync. It completes with [`SyncError::Canceled`] unless it
    /// already finished.
    pub fn cancel(&self) {
        if self.report(Err(SyncError::Canceled)) {
            tracing::info!(sync_id = %self.sync_id, "Sync canceled");
            self.queue.cancel_all();
        }
    }

    /// Deliver the result. Returns `false` if one was already delivered.
    fn report(&self, result: Result<(), SyncError>) -> bool {
        let sender = self.result.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(sender) => {
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }
}

impl OperationDelegate for SyncAll {
    fn operation_did_fail(&self, operation: &str, error: &SyncError) {
        if error.is_canceled() {
            return;
        }
        if self.report(Err(error.clone())) {
            tracing::error!(sync_id = %self.sync_id, operation, error = %error, "Sync failed");
            self.queue.cancel_all();
        } else {
            tracing::debug!(sync_id = %self.sync_id, operation, error = %error, "Ignoring failure after sync result");
        }
    }
}

impl CheckpointDelegate for SyncAll {
    fn did_reach_checkpoint(&self, _name: &str) {
        self.report(Ok(()));
    }
}

impl SyncSession {
    pub fn sync(&self) -> &Arc<SyncAll> {
        &self.sync
    }

    pub fn cancel(&self) {
        self.sync.cancel();
    }

    /// Wait for the sync's single result.
    pub async fn wait(self) -> Result<(), SyncError> {
        let result = self.result.await.unwrap_or(Err(SyncError::Canceled));
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(()) => tracing::info!(sync_id = %self.sync.sync_id, elapsed_ms, "Sync finished"),
            Err(e) => tracing::info!(sync_id = %self.sync.sync_id, elapsed_ms, error = %e, "Sync ended with error"),
        }
        result
    }
}
