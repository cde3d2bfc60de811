//! End-to-end scenarios for the session sync runtime.
//!
//! - `cross_context.rs` - several runtimes sharing one store
//! - `recovery.rs`      - error reporting and recommendation escalation
//! - `health.rs`        - storage outages seen through the health monitor
//! - `lifecycle.rs`     - timers, cleanup, reloads and teardown

mod cross_context;

use crate::SessionSyncRuntime;
use auth_state_synchronizer::AuthState;
use backoff_scheduler::ManualScheduler;
use parking_lot::Mutex;
use session_config_and_utils::{Clock, ManualClock, SessionSyncConfig};
use session_storage::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

/// Contexts of one origin: a shared store, one virtual clock and one timer
/// queue.
pub(crate) struct Origin {
    pub storage: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub scheduler: Arc<ManualScheduler>,
}

impl Origin {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        Self {
            storage: MemoryStore::new(),
            scheduler: Arc::new(ManualScheduler::new(clock.clone())),
            clock,
        }
    }

    pub fn context(&self) -> SessionSyncRuntime {
        self.context_with(SessionSyncConfig::default())
    }

    pub fn context_with(&self, config: SessionSyncConfig) -> SessionSyncRuntime {
        SessionSyncRuntime::new(
            config,
            Arc::new(self.storage.clone()),
            self.clock.clone(),
            self.scheduler.clone(),
        )
        .expect("runtime should build")
    }

    pub fn signed_in(&self, token: &str) -> AuthState {
        AuthState::authenticated("user-1", token, "sign_in", self.clock.now())
    }

    /// Fire the next `n` timers, whenever they are due.
    pub fn fire_next(&self, n: usize) {
        for _ in 0..n {
            let Some(due) = self.scheduler.next_due_in() else {
                return;
            };
            self.scheduler.advance(due);
        }
    }

    pub fn advance(&self, by: Duration) {
        self.scheduler.advance(by);
    }
}

/// Session tokens seen by a state-change callback, in order.
pub(crate) fn token_log() -> (
    Arc<Mutex<Vec<Option<String>>>>,
    impl Fn(Option<&AuthState>) + Send + Sync + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback = move |state: Option<&AuthState>| {
        sink.lock()
            .push(state.and_then(|state| state.session_token.clone()));
    };
    (seen, callback)
}
