use async_trait::async_trait;

use super::SyncEnv;
use crate::engine::error::SyncError;
use crate::engine::operation::{Operation, OperationContext};
use crate::engine::shared::Shared;
use crate::remote::Collection;

/// Fetches the account's collections for the folder and feed stages.
pub struct FetchCollections {
    env: SyncEnv,
    output: Shared<Vec<Collection>>,
}

impl FetchCollections {
    pub fn new(env: SyncEnv, output: Shared<Vec<Collection>>) -> Self {
        Self { env, output }
    }
}

#[async_trait]
impl Operation for FetchCollections {
    fn name(&self) -> &str {
        "fetch-collections"
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        let collections = self.env.remote.get_collections().await?;
        ctx.check_canceled()?;

        tracing::debug!(count = collections.len(), "Fetched collections");
        self.output.set(collections);
        Ok(())
    }
}
