use async_trait::async_trait;
use std::collections::HashSet;

use super::SyncEnv;
use crate::engine::error::SyncError;
use crate::engine::operation::{CancelFlag, Operation, OperationContext};
use crate::engine::paging::{fetch_stream_ids, StreamFilter};
use crate::engine::reconcile::{reconcile, StatusDelta};
use crate::remote::ResourceId;
use crate::storage::StatusKey;

/// The status dimension a [`ReconcileStatuses`] stage works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Unread,
    Starred,
}

impl StatusKind {
    fn key(self) -> StatusKey {
        match self {
            StatusKind::Unread => StatusKey::Read,
            StatusKind::Starred => StatusKey::Starred,
        }
    }

    /// Value of the stored flag for ids in the remote set
    fn flag_for_listed(self) -> bool {
        match self {
            StatusKind::Unread => false,
            StatusKind::Starred => true,
        }
    }

    fn resource_and_filter(self, user_id: &str) -> (ResourceId, StreamFilter) {
        match self {
            StatusKind::Unread => (
                ResourceId::all(user_id),
                StreamFilter {
                    newer_than: None,
                    unread_only: Some(true),
                },
            ),
            StatusKind::Starred => (ResourceId::saved(user_id), StreamFilter::default()),
        }
    }
}

/// Brings one local status flag in line with the remote id stream.
///
/// Ids with unpushed local changes keep their local value. Both directions
/// are applied even if the first fails; the first error is returned and
/// nothing is rolled back.
pub struct ReconcileStatuses {
    env: SyncEnv,
    kind: StatusKind,
}

impl ReconcileStatuses {
    pub fn new(env: SyncEnv, kind: StatusKind) -> Self {
        Self { env, kind }
    }

    pub async fn reconcile(&self, cancel: &CancelFlag) -> Result<StatusDelta, SyncError> {
        let store = &self.env.store;
        let (resource, filter) = self.kind.resource_and_filter(&self.env.user_id);

        let remote = fetch_stream_ids(self.env.remote.as_ref(), &resource, filter, cancel).await?;
        let pending = store.pending_article_ids(self.kind.key()).await?;
        let local = match self.kind {
            StatusKind::Unread => store.fetch_unread_article_ids().await?,
            StatusKind::Starred => store.fetch_starred_article_ids().await?,
        };

        let delta = reconcile(&remote, &pending, &local);
        if cancel.is_canceled() {
            return Err(SyncError::Canceled);
        }

        let key = self.kind.key();
        let listed = self.kind.flag_for_listed();
        let set_result = self.apply(&delta.to_set, key, listed).await;
        let clear_result = self.apply(&delta.to_clear, key, !listed).await;
        set_result?;
        clear_result?;

        tracing::debug!(
            kind = ?self.kind,
            remote = remote.len(),
            pending = pending.len(),
            set = delta.to_set.len(),
            cleared = delta.to_clear.len(),
            "Reconciled statuses"
        );
        Ok(delta)
    }

    async fn apply(&self, ids: &HashSet<String>, key: StatusKey, flag: bool) -> Result<(), SyncError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.env.store.mark(ids, key, flag).await?;
        Ok(())
    }
}

#[async_trait]
impl Operation for ReconcileStatuses {
    fn name(&self) -> &str {
        match self.kind {
            StatusKind::Unread => "reconcile-unread",
            StatusKind::Starred => "reconcile-starred",
        }
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        self.reconcile(ctx.cancel_flag()).await.map(|_| ())
    }
}
