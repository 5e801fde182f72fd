use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::SyncError;
use super::queue::QueueHandle;

/// Identifier assigned by the queue when an operation is added.
pub type OperationId = u64;

/// How an operation ended. Exactly one outcome is produced per operation.
#[derive(Debug, Clone)]
pub enum Outcome {
    Succeeded,
    Failed(SyncError),
    Canceled,
}

impl Outcome {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Outcome::Canceled)
    }

    pub fn into_result(self) -> Result<(), SyncError> {
        match self {
            Outcome::Succeeded => Ok(()),
            Outcome::Failed(e) => Err(e),
            Outcome::Canceled => Err(SyncError::Canceled),
        }
    }
}

/// A unit of cancellable asynchronous work run by the [`OperationQueue`](super::OperationQueue).
///
/// `run` is called at most once, and never for an operation canceled before
/// it started. Long-running implementations should call
/// [`OperationContext::check_canceled`] between units of work and stop
/// producing side effects once it fails.
#[async_trait]
pub trait Operation: Send {
    fn name(&self) -> &str;

    async fn run(&mut self, ctx: &OperationContext) -> Result<(), SyncError>;
}

/// Receives failures before the failing operation completes.
pub trait OperationDelegate: Send + Sync {
    fn operation_did_fail(&self, operation: &str, error: &SyncError);
}

/// Shared cancellation flag of one operation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a running operation can see of the queue.
pub struct OperationContext {
    id: OperationId,
    canceled: CancelFlag,
    queue: QueueHandle,
}

impl OperationContext {
    pub(crate) fn new(id: OperationId, canceled: CancelFlag, queue: QueueHandle) -> Self {
        Self { id, canceled, queue }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.is_canceled()
    }

    /// `Err(SyncError::Canceled)` once the operation has been canceled.
    pub fn check_canceled(&self) -> Result<(), SyncError> {
        if self.is_canceled() {
            Err(SyncError::Canceled)
        } else {
            Ok(())
        }
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.canceled
    }

    /// Handle for adding follow-up operations from inside `run`.
    pub fn queue(&self) -> &QueueHandle {
        &self.queue
    }
}
