//! Runtime error types.

use auth_health_monitor::AlertDeliveryError;
use auth_state_synchronizer::SyncError;
use session_config_and_utils::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Invalid or unreadable configuration
    #[error(transparent)]
    Config(#[from] CoreError),

    /// Auth state synchronization failed
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Alert webhook could not be set up
    #[error("Alert webhook setup failed: {0}")]
    Alerting(#[from] AlertDeliveryError),

    /// A tokio scheduler was requested outside a tokio runtime
    #[error("No tokio runtime available")]
    NoAsyncRuntime,
}

impl RuntimeError {
    /// Returns true if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RuntimeError::Sync(err) => err.is_transient(),
            _ => false,
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
