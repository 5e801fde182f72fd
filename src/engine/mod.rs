//! Incremental sync engine.
//!
//! Work is split into [`Operation`]s run by an [`OperationQueue`] that honors
//! dependencies between them. [`SyncAll`] builds the full sync graph on top of
//! the queue and [`Account`] wraps it for callers.

mod account;
mod checkpoint;
mod error;
mod operation;
mod paging;
mod progress;
mod queue;
mod reconcile;
mod shared;
pub mod stages;
mod sync_all;

pub use account::{Account, AccountSettings, DEFAULT_PENDING_PUSH_THRESHOLD};
pub use checkpoint::{Checkpoint, CheckpointDelegate};
pub use error::SyncError;
pub use operation::{CancelFlag, Operation, OperationContext, OperationDelegate, OperationId, Outcome};
pub use paging::{fetch_stream_contents, fetch_stream_ids, paginate, Page, StreamFilter};
pub use progress::{Progress, ProgressInfo};
pub use queue::{CompletionCallback, Enqueue, OperationQueue, QueueHandle, DEFAULT_MAX_CONCURRENT};
pub use reconcile::{reconcile, StatusDelta};
pub use shared::Shared;
pub use sync_all::{SyncAll, SyncGraph, SyncSession, SyncSettings};
