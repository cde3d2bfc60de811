//! Synchronizer error types.

use thiserror::Error;

/// Synchronizer error type.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Shared storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] session_storage::StorageError),

    /// Invalid state transition in the poller FSM
    #[error("Invalid poller state transition: {0}")]
    InvalidStateTransition(String),
}

impl SyncError {
    /// Returns true if the next poll may succeed without intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Storage(err) => err.is_transient(),
            SyncError::InvalidStateTransition(_) => false,
        }
    }
}

/// Result type for synchronizer operations.
pub type SyncResult<T> = Result<T, SyncError>;
