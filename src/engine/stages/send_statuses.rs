use async_trait::async_trait;
use std::collections::HashMap;

use super::SyncEnv;
use crate::engine::error::SyncError;
use crate::engine::operation::{Operation, OperationContext};
use crate::remote::{MarkAction, DEFAULT_MARK_BATCH_SIZE};
use crate::storage::{PendingStatus, StatusKey};

/// Order in which grouped records are pushed.
const ACTIONS: [MarkAction; 4] = [
    MarkAction::Read,
    MarkAction::Unread,
    MarkAction::Saved,
    MarkAction::Unsaved,
];

/// Pushes the pending-status ledger to the remote.
///
/// Records are selected first, then sent in batches per action. A batch the
/// remote accepted is deleted from the ledger; a batch it rejected is reset so
/// the next sync sends it again. Rejected batches are logged and do not fail
/// the operation. Ledger write errors do.
pub struct SendArticleStatuses {
    env: SyncEnv,
    batch_size: usize,
}

impl SendArticleStatuses {
    pub fn new(env: SyncEnv) -> Self {
        Self {
            env,
            batch_size: DEFAULT_MARK_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

fn action_for(record: &PendingStatus) -> MarkAction {
    match (record.key, record.flag) {
        (StatusKey::Read, true) => MarkAction::Read,
        (StatusKey::Read, false) => MarkAction::Unread,
        (StatusKey::Starred, true) => MarkAction::Saved,
        (StatusKey::Starred, false) => MarkAction::Unsaved,
    }
}

fn key_for(action: MarkAction) -> StatusKey {
    match action {
        MarkAction::Read | MarkAction::Unread => StatusKey::Read,
        MarkAction::Saved | MarkAction::Unsaved => StatusKey::Starred,
    }
}

#[async_trait]
impl Operation for SendArticleStatuses {
    fn name(&self) -> &str {
        "send-article-statuses"
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        let store = &self.env.store;
        let pending = store.select_pending_for_processing().await?;
        if pending.is_empty() {
            tracing::debug!("No pending statuses to send");
            return Ok(());
        }

        let mut groups: HashMap<MarkAction, Vec<String>> = HashMap::new();
        for record in &pending {
            groups.entry(action_for(record)).or_default().push(record.article_id.clone());
        }

        let mut sent = 0usize;
        let mut rejected = 0usize;
        for action in ACTIONS {
            let Some(mut ids) = groups.remove(&action) else {
                continue;
            };
            ids.sort();
            let key = key_for(action);

            for (index, chunk) in ids.chunks(self.batch_size).enumerate() {
                if ctx.is_canceled() {
                    let remaining: Vec<String> = ids[index * self.batch_size..].to_vec();
                    store.reset_selected_for_processing(key, &remaining).await?;
                    return Err(SyncError::Canceled);
                }

                match self.env.remote.mark_articles(chunk, action).await {
                    Ok(()) => {
                        store.delete_selected_for_processing(key, chunk).await?;
                        sent += chunk.len();
                    }
                    Err(e) => {
                        tracing::warn!(action = %action, count = chunk.len(), error = %e, "Failed to send statuses, will retry next sync");
                        store.reset_selected_for_processing(key, chunk).await?;
                        rejected += chunk.len();
                    }
                }
            }
        }

        tracing::info!(sent, rejected, "Sent article statuses");
        Ok(())
    }
}
