use async_trait::async_trait;
use std::collections::HashSet;

use super::SyncEnv;
use crate::engine::error::SyncError;
use crate::engine::operation::{Operation, OperationContext};
use crate::engine::shared::Shared;
use crate::remote::Collection;
use crate::storage::DatabaseError;

/// Mirrors remote collections as local folders.
///
/// Every collection gets exactly one folder linked by its id. Folders not
/// linked to a current collection are removed and their feeds move to the
/// account root.
pub struct MirrorFolders {
    env: SyncEnv,
    collections: Shared<Vec<Collection>>,
}

impl MirrorFolders {
    pub fn new(env: SyncEnv, collections: Shared<Vec<Collection>>) -> Self {
        Self { env, collections }
    }
}

#[async_trait]
impl Operation for MirrorFolders {
    fn name(&self) -> &str {
        "mirror-folders"
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        let collections = self.collections.get();
        let store = &self.env.store;

        for collection in &collections {
            ctx.check_canceled()?;
            match store.ensure_folder(&collection.folder_name(), Some(&collection.id)).await {
                Ok(_) => {}
                Err(DatabaseError::InvalidName(name)) => {
                    tracing::warn!(collection = %collection.id, name = %name, "Skipping collection with unusable label");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let remote_ids: HashSet<&str> = collections.iter().map(|c| c.id.as_str()).collect();
        for folder in store.folders().await? {
            let linked = folder
                .external_id
                .as_deref()
                .is_some_and(|id| remote_ids.contains(id));
            if linked {
                continue;
            }

            ctx.check_canceled()?;
            let hoisted = store.remove_folder(folder.id).await?;
            tracing::info!(
                folder = %folder.name,
                hoisted_feeds = hoisted.len(),
                "Removed folder without remote collection"
            );
        }

        Ok(())
    }
}
