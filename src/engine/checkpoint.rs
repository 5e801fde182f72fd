use async_trait::async_trait;
use std::sync::Weak;

use super::error::SyncError;
use super::operation::{Operation, OperationContext};

/// Notified when a checkpoint runs.
pub trait CheckpointDelegate: Send + Sync {
    fn did_reach_checkpoint(&self, name: &str);
}

/// Join barrier with no work of its own.
///
/// Add it with dependencies on everything that must finish first. Stages
/// created later can still add themselves through
/// [`QueueHandle::add_dependency`](super::QueueHandle::add_dependency) as
/// long as the checkpoint has not started.
pub struct Checkpoint {
    name: String,
    delegate: Weak<dyn CheckpointDelegate>,
}

impl Checkpoint {
    pub fn new(name: impl Into<String>, delegate: Weak<dyn CheckpointDelegate>) -> Self {
        Self {
            name: name.into(),
            delegate,
        }
    }
}

#[async_trait]
impl Operation for Checkpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError> {
        ctx.check_canceled()?;
        if let Some(delegate) = self.delegate.upgrade() {
            delegate.did_reach_checkpoint(&self.name);
        }
        Ok(())
    }
}
