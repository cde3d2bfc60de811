//! Per-scenario debouncing of high-frequency triggers.

use crate::scheduler::{SharedScheduler, TimerHandle};
use parking_lot::Mutex;
use session_config_and_utils::{DebounceScenario, SessionSyncConfig};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

struct PendingTrigger {
    id: u64,
    handle: Option<TimerHandle>,
}

#[derive(Default)]
struct DebounceState {
    next_id: u64,
    pending: HashMap<DebounceScenario, PendingTrigger>,
}

/// Coalesces rapid triggers so only the last one in a quiet window runs.
///
/// Each scenario has its own delay and its own pending slot: a tab switch
/// never cancels a pending route navigation.
pub struct Debouncer {
    scheduler: SharedScheduler,
    delays: BTreeMap<DebounceScenario, Duration>,
    state: Arc<Mutex<DebounceState>>,
}

impl Debouncer {
    pub fn new(scheduler: SharedScheduler, delays: BTreeMap<DebounceScenario, Duration>) -> Self {
        Self {
            scheduler,
            delays,
            state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    pub fn from_config(config: &SessionSyncConfig, scheduler: SharedScheduler) -> Self {
        let delays = DebounceScenario::ALL
            .iter()
            .map(|scenario| (*scenario, config.debounce_delay(*scenario)))
            .collect();
        Self::new(scheduler, delays)
    }

    pub fn delay(&self, scenario: DebounceScenario) -> Duration {
        self.delays
            .get(&scenario)
            .copied()
            .unwrap_or_else(|| Duration::from_millis(scenario.default_delay_ms()))
    }

    /// Run `action` once the scenario has been quiet for its delay.
    ///
    /// A newer trigger for the same scenario replaces a pending one.
    pub fn trigger<F>(&self, scenario: DebounceScenario, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let (id, replaced) = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            let replaced = state
                .pending
                .insert(scenario, PendingTrigger { id, handle: None });
            (id, replaced)
        };
        if let Some(handle) = replaced.and_then(|pending| pending.handle) {
            trace!(scenario = ?scenario, "Debounced trigger replaced");
            handle.cancel();
        }

        let state = Arc::downgrade(&self.state);
        let handle = self.scheduler.schedule(
            self.delay(scenario),
            Box::new(move || {
                let Some(shared) = state.upgrade() else {
                    return;
                };
                {
                    let mut state = shared.lock();
                    if state.pending.get(&scenario).map(|p| p.id) != Some(id) {
                        return;
                    }
                    state.pending.remove(&scenario);
                }
                action();
            }),
        );

        // The trigger may already have fired or been replaced in the meantime.
        let mut state = self.state.lock();
        if let Some(pending) = state.pending.get_mut(&scenario).filter(|p| p.id == id) {
            pending.handle = Some(handle);
        }
    }

    /// Drop the pending trigger for a scenario, if any.
    pub fn cancel(&self, scenario: DebounceScenario) {
        let removed = self.state.lock().pending.remove(&scenario);
        if let Some(handle) = removed.and_then(|pending| pending.handle) {
            handle.cancel();
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<PendingTrigger> = self.state.lock().pending.drain().map(|(_, p)| p).collect();
        for handle in drained.into_iter().filter_map(|pending| pending.handle) {
            handle.cancel();
        }
    }

    pub fn is_pending(&self, scenario: DebounceScenario) -> bool {
        self.state.lock().pending.contains_key(&scenario)
    }
}
