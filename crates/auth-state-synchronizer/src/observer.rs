//! Hooks through which the synchronizer reports what it does.

use crate::state::AuthState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageOperation {
    Read,
    Write,
    Delete,
}

/// Where an observed state change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// This context wrote new state.
    LocalWrite,
    /// This context cleared the state.
    LocalClear,
    /// Polling found a change written by another context.
    RemotePoll,
}

/// Receives every polling, storage and callback outcome.
///
/// All methods default to doing nothing so observers implement only what
/// they need.
pub trait SyncObserver: Send + Sync {
    fn on_polling_event(&self, _success: bool, _interval: Duration, _error: Option<&str>) {}

    fn on_storage_event(&self, _success: bool, _operation: StorageOperation, _error: Option<&str>) {}

    fn on_callback_event(&self, _success: bool, _callback_count: usize, _error: Option<&str>) {}

    fn on_state_change(&self, _state: Option<&AuthState>, _source: ChangeSource) {}
}

pub type SharedObserver = Arc<dyn SyncObserver>;

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}
