use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use super::SyncEnv;
use crate::engine::error::SyncError;
use crate::engine::operation::{Operation, OperationContext};
use crate::engine::shared::Shared;
use crate::remote::Collection;

/// Creates, retitles and files the feeds of every collection.
///
/// Runs after [`MirrorFolders`](super::MirrorFolders), so each collection
/// already has its folder. Collections whose folder could not be created are
/// skipped, but their feeds still count as subscribed.
pub struct MaterializeFeeds {
    env: SyncEnv,
    collections: Shared<Vec<Collection>>,
}

impl MaterializeFeeds {
    pub fn new(env: SyncEnv, collections: Shared<Vec<Collection>>) -> Self {
        Self { env, collections }
    }
}

#[async_trait]
impl Operation for MaterializeFeeds {
    fn name(&self) -> &str {
        "materialize-feeds"
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        let collections = self.collections.get();
        let store = &self.env.store;

        let folders: HashMap<String, i64> = store
            .folders()
            .await?
            .into_iter()
            .filter_map(|f| Some((f.external_id?, f.id)))
            .collect();

        let subscribed: HashSet<&str> = collections
            .iter()
            .flat_map(|c| c.feeds.iter().map(|f| f.id.as_str()))
            .collect();

        let mut created = 0usize;
        let mut retitled = 0usize;
        for collection in &collections {
            ctx.check_canceled()?;
            let Some(&folder_id) = folders.get(&collection.id) else {
                continue;
            };

            let wanted: HashSet<&str> = collection.feeds.iter().map(|f| f.id.as_str()).collect();
            let current = store.feed_ids_in_folder(folder_id).await?;

            for feed_id in current.iter().filter(|id| !wanted.contains(id.as_str())) {
                store.remove_feed_from_folder(feed_id, folder_id).await?;
            }

            for remote_feed in &collection.feeds {
                match store.existing_feed(&remote_feed.id).await? {
                    Some(feed) => {
                        let title = remote_feed.display_title();
                        if !title.is_empty() && title != feed.title {
                            store.update_feed_title(&feed.feed_id, &title).await?;
                            retitled += 1;
                        }
                    }
                    None => {
                        store.create_feed(&remote_feed.to_new_feed()).await?;
                        created += 1;
                    }
                }

                if !current.contains(&remote_feed.id) {
                    store.add_feed_to_folder(&remote_feed.id, folder_id).await?;
                }
            }
        }

        ctx.check_canceled()?;
        let stale: Vec<String> = store
            .feeds()
            .await?
            .into_iter()
            .map(|f| f.feed_id)
            .filter(|id| !subscribed.contains(id.as_str()))
            .collect();
        if !stale.is_empty() {
            store.remove_feeds(&stale).await?;
        }

        tracing::debug!(created, retitled, removed = stale.len(), "Materialized feeds");
        Ok(())
    }
}
