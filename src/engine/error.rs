use std::sync::Arc;
use thiserror::Error;

use crate::remote::TransportError;
use crate::storage::DatabaseError;

/// Terminal error of a sync operation.
///
/// `Clone` so the first failure can reach both the failure delegate and
/// the caller of the sync.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Network or API failure, including `Unauthorized` and `Suspended`
    #[error(transparent)]
    Transport(TransportError),
    /// Local store failure
    #[error("Store error: {0}")]
    Store(Arc<DatabaseError>),
    /// A local or remote entity the operation needs does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// No credentials are configured for the account
    #[error("Not logged in")]
    NotLoggedIn,
    /// The operation was canceled; never reported to the user
    #[error("Canceled")]
    Canceled,
}

impl From<DatabaseError> for SyncError {
    fn from(e: DatabaseError) -> Self {
        SyncError::Store(Arc::new(e))
    }
}

/// A remote 404 becomes [`SyncError::NotFound`] and missing credentials
/// become [`SyncError::NotLoggedIn`].
impl From<TransportError> for SyncError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NotFound(what) => SyncError::NotFound(what),
            TransportError::MissingCredentials => SyncError::NotLoggedIn,
            other => SyncError::Transport(other),
        }
    }
}

impl SyncError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, SyncError::Canceled)
    }
}
