//! # Auth State Synchronizer
//!
//! Keeps an authenticated user's status consistent across execution contexts
//! (browser tabs, windows, native webviews) that share one key-value store.
//!
//! - Writes go through [`AuthStateSynchronizer::set_auth_state`] as a
//!   versioned [`StoredAuthState`] envelope.
//! - Other contexts notice by polling: each tick reads the envelope, diffs it
//!   field-wise against the last state seen and notifies subscribers.
//! - Polling is an explicit state machine ([`PollerState`]) that backs off on
//!   storage errors and restarts from the base interval once its error budget
//!   is spent.
//! - Every storage, polling and callback outcome is reported to a
//!   [`SyncObserver`], which is how the health monitor watches the
//!   synchronizer.

mod error;
mod observer;
mod poller_fsm;
mod state;
mod synchronizer;

pub use error::{SyncError, SyncResult};
pub use observer::{ChangeSource, NoopObserver, SharedObserver, StorageOperation, SyncObserver};
pub use poller_fsm::{PollerInput, PollerMachine, PollerState};
pub use state::{states_differ, AuthState, StoredAuthMetadata, StoredAuthState, AUTH_STATE_VERSION};
pub use synchronizer::{AuthStateCallback, AuthStateSynchronizer, Subscription};
