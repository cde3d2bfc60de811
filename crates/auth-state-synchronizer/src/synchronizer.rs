//! Cross-context auth state synchronizer.
//!
//! One synchronizer runs per execution context. Writes go to the shared
//! store under a single key; other contexts pick them up by polling and
//! diffing against the last state they saw.

use crate::error::{SyncError, SyncResult};
use crate::observer::{ChangeSource, SharedObserver, StorageOperation};
use crate::poller_fsm::{PollerInput, PollerMachine, PollerState};
use crate::state::{states_differ, AuthState, StoredAuthState, AUTH_STATE_VERSION};
use backoff_scheduler::{compute_interval, SharedScheduler, TimerHandle};
use parking_lot::Mutex;
use session_config_and_utils::{Clock, SessionSyncConfig, SharedClock};
use session_storage::{load_json, save_json, SharedStore, StorageKeys, StorageResult};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Callback notified with the new state, or `None` once signed out.
pub type AuthStateCallback = Arc<dyn Fn(Option<&AuthState>) + Send + Sync>;

#[derive(Default)]
struct CallbackRegistry {
    next_id: u64,
    entries: Vec<(u64, AuthStateCallback)>,
}

/// Handle returned by [`AuthStateSynchronizer::on_state_change`].
///
/// Dropping the handle keeps the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<CallbackRegistry>>,
    id: u64,
}

impl Subscription {
    /// Remove the callback. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PollSettings {
    base: Duration,
    multiplier: f64,
    max: Duration,
    max_consecutive_errors: u32,
}

struct PollerData {
    machine: PollerMachine,
    consecutive_errors: u32,
    current_interval: Duration,
    timer: Option<TimerHandle>,
    /// Bumped on start/stop/reset so timers from an earlier run become no-ops.
    generation: u64,
}

impl PollerData {
    fn transition(&mut self, input: PollerInput) {
        if self.machine.consume(&input).is_err() {
            warn!(input = ?input, state = ?self.machine.state(), "Ignoring invalid poller transition");
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

struct Inner {
    context_id: String,
    storage: SharedStore,
    clock: SharedClock,
    scheduler: SharedScheduler,
    observer: SharedObserver,
    max_age_ms: u64,
    poll: PollSettings,
    last_known: Mutex<Option<AuthState>>,
    callbacks: Arc<Mutex<CallbackRegistry>>,
    poller: Mutex<PollerData>,
}

/// Keeps auth state consistent across execution contexts that share one
/// key-value store.
#[derive(Clone)]
pub struct AuthStateSynchronizer {
    inner: Arc<Inner>,
}

impl AuthStateSynchronizer {
    /// Create a synchronizer and seed its last-known state from storage.
    pub fn new(
        config: &SessionSyncConfig,
        storage: SharedStore,
        clock: SharedClock,
        scheduler: SharedScheduler,
        observer: SharedObserver,
    ) -> Self {
        let inner = Arc::new(Inner {
            context_id: Uuid::new_v4().to_string(),
            storage,
            clock,
            scheduler,
            observer,
            max_age_ms: config.max_age_ms,
            poll: PollSettings {
                base: config.polling_interval(),
                multiplier: config.retry_backoff_multiplier,
                max: config.max_retry_delay(),
                max_consecutive_errors: config.max_consecutive_errors.max(1),
            },
            last_known: Mutex::new(None),
            callbacks: Arc::new(Mutex::new(CallbackRegistry::default())),
            poller: Mutex::new(PollerData {
                machine: PollerMachine::new(),
                consecutive_errors: 0,
                current_interval: config.polling_interval(),
                timer: None,
                generation: 0,
            }),
        });

        match inner.get_auth_state() {
            Ok(state) => *inner.last_known.lock() = state,
            Err(err) => warn!(context_id = %inner.context_id, error = %err, "Could not seed auth state"),
        }
        debug!(context_id = %inner.context_id, "Auth state synchronizer created");

        Self { inner }
    }

    /// Identifier of this execution context, used in logs.
    pub fn context_id(&self) -> &str {
        &self.inner.context_id
    }

    /// Write `state` to shared storage and notify callbacks.
    ///
    /// The in-memory state and callbacks are updated even when the write
    /// fails; the write error is reported to the observer and returned.
    pub fn set_auth_state(&self, state: AuthState) -> SyncResult<()> {
        self.inner.set_auth_state(state)
    }

    /// Current state from shared storage. An expired entry is removed and
    /// reported as absent.
    pub fn get_auth_state(&self) -> SyncResult<Option<AuthState>> {
        self.inner.get_auth_state()
    }

    /// Remove the shared state and notify callbacks with `None`.
    pub fn clear_auth_state(&self) -> SyncResult<()> {
        self.inner.clear_auth_state()
    }

    /// State as of the last write, clear or detected change.
    pub fn last_known_state(&self) -> Option<AuthState> {
        self.inner.last_known.lock().clone()
    }

    /// Register a callback. It runs once right away with the current state.
    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<&AuthState>) + Send + Sync + 'static,
    {
        self.inner.subscribe(Arc::new(callback))
    }

    pub fn callback_count(&self) -> usize {
        self.inner.callbacks.lock().entries.len()
    }

    /// Poll once: read shared storage and notify callbacks if the state
    /// differs from the last one seen. Returns whether it changed.
    pub fn check_for_state_changes(&self) -> SyncResult<bool> {
        self.inner.check_for_state_changes()
    }

    /// Start periodic polling. Returns `false` if already polling.
    pub fn start(&self) -> bool {
        let mut poller = self.inner.poller.lock();
        if *poller.machine.state() != PollerState::Stopped {
            return false;
        }
        poller.transition(PollerInput::Start);
        poller.consecutive_errors = 0;
        poller.generation += 1;
        poller.current_interval = self.inner.poll.base;
        poller.timer = Some(Inner::schedule_tick(
            &self.inner,
            poller.generation,
            self.inner.poll.base,
        ));
        info!(
            context_id = %self.inner.context_id,
            interval_ms = self.inner.poll.base.as_millis() as u64,
            "Auth state polling started"
        );
        true
    }

    /// Stop polling and cancel the pending tick. Safe when already stopped.
    pub fn stop(&self) {
        let mut poller = self.inner.poller.lock();
        poller.cancel_timer();
        if *poller.machine.state() == PollerState::Stopped {
            return;
        }
        poller.transition(PollerInput::Stop);
        poller.generation += 1;
        poller.consecutive_errors = 0;
        info!(context_id = %self.inner.context_id, "Auth state polling stopped");
    }

    /// Forget accumulated errors and, if polling, restart at the base interval.
    pub fn reset(&self) {
        let mut poller = self.inner.poller.lock();
        poller.consecutive_errors = 0;
        poller.current_interval = self.inner.poll.base;
        if *poller.machine.state() == PollerState::Stopped {
            return;
        }
        poller.cancel_timer();
        poller.transition(PollerInput::Reset);
        poller.generation += 1;
        poller.timer = Some(Inner::schedule_tick(
            &self.inner,
            poller.generation,
            self.inner.poll.base,
        ));
    }

    pub fn poller_state(&self) -> PollerState {
        *self.inner.poller.lock().machine.state()
    }

    pub fn is_polling(&self) -> bool {
        self.poller_state() != PollerState::Stopped
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.inner.poller.lock().consecutive_errors
    }

    /// Delay before the next scheduled poll.
    pub fn current_interval(&self) -> Duration {
        self.inner.poller.lock().current_interval
    }
}

impl Inner {
    fn set_auth_state(&self, state: AuthState) -> SyncResult<()> {
        let previous = self.read_envelope().ok().flatten();
        let envelope = StoredAuthState::wrap(state.clone(), previous.as_ref(), self.clock.now());
        let write = save_json(self.storage.as_ref(), StorageKeys::AUTH_STATE, &envelope);
        self.report_storage(StorageOperation::Write, &write);

        *self.last_known.lock() = Some(state.clone());
        self.notify(Some(&state), ChangeSource::LocalWrite);
        write.map_err(SyncError::from)
    }

    fn get_auth_state(&self) -> SyncResult<Option<AuthState>> {
        let Some(stored) = self.read_envelope()? else {
            return Ok(None);
        };
        if stored.is_expired(self.clock.now(), self.max_age_ms) {
            info!(
                context_id = %self.context_id,
                updated_at = %stored.metadata.updated_at,
                "Stored auth state expired"
            );
            let removed = self.storage.delete(StorageKeys::AUTH_STATE);
            self.report_storage(StorageOperation::Delete, &removed);
            return Ok(None);
        }
        Ok(Some(stored.state))
    }

    fn clear_auth_state(&self) -> SyncResult<()> {
        let removed = self.storage.delete(StorageKeys::AUTH_STATE);
        self.report_storage(StorageOperation::Delete, &removed);

        *self.last_known.lock() = None;
        self.notify(None, ChangeSource::LocalClear);
        removed.map(|_| ()).map_err(SyncError::from)
    }

    fn check_for_state_changes(&self) -> SyncResult<bool> {
        let current = self.get_auth_state()?;
        let changed = {
            let mut last_known = self.last_known.lock();
            if states_differ(last_known.as_ref(), current.as_ref()) {
                *last_known = current.clone();
                true
            } else {
                false
            }
        };
        if changed {
            debug!(context_id = %self.context_id, "Detected auth state change from another context");
            self.notify(current.as_ref(), ChangeSource::RemotePoll);
        }
        Ok(changed)
    }

    /// Versioned envelope from storage. Unknown versions and unparseable
    /// documents read as absent.
    fn read_envelope(&self) -> SyncResult<Option<StoredAuthState>> {
        let loaded = load_json::<StoredAuthState>(self.storage.as_ref(), StorageKeys::AUTH_STATE);
        self.report_storage(StorageOperation::Read, &loaded);
        match loaded? {
            Some(stored) if stored.version == AUTH_STATE_VERSION => Ok(Some(stored)),
            Some(stored) => {
                warn!(
                    version = stored.version,
                    expected = AUTH_STATE_VERSION,
                    "Ignoring auth state with unknown version"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn report_storage<T>(&self, operation: StorageOperation, result: &StorageResult<T>) {
        match result {
            Ok(_) => self.observer.on_storage_event(true, operation, None),
            Err(err) => {
                warn!(
                    context_id = %self.context_id,
                    operation = ?operation,
                    error = %err,
                    "Auth state storage operation failed"
                );
                let message = err.to_string();
                self.observer
                    .on_storage_event(false, operation, Some(message.as_str()));
            }
        }
    }

    /// Register `callback` and hand it the current state. Storage is read
    /// first so an expired entry is dropped and existing subscribers hear
    /// about any change before the newcomer is added.
    fn subscribe(&self, callback: AuthStateCallback) -> Subscription {
        if let Err(err) = self.check_for_state_changes() {
            debug!(context_id = %self.context_id, error = %err, "Using cached auth state for new subscriber");
        }

        let (id, count) = {
            let mut registry = self.callbacks.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, callback.clone()));
            (id, registry.entries.len())
        };

        let current = self.last_known.lock().clone();
        if panic::catch_unwind(AssertUnwindSafe(|| callback(current.as_ref()))).is_err() {
            warn!(context_id = %self.context_id, "Auth state callback panicked on registration");
            self.observer
                .on_callback_event(false, count, Some("callback panicked on registration"));
        }

        Subscription {
            registry: Arc::downgrade(&self.callbacks),
            id,
        }
    }

    /// Run every callback outside the registry lock. A panicking callback is
    /// reported and does not stop the others.
    fn notify(&self, state: Option<&AuthState>, source: ChangeSource) {
        let callbacks: Vec<AuthStateCallback> = self
            .callbacks
            .lock()
            .entries
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        let count = callbacks.len();
        let mut failures = 0usize;
        for callback in &callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(state))).is_err() {
                failures += 1;
            }
        }

        if failures > 0 {
            warn!(context_id = %self.context_id, failures, count, "Auth state callbacks panicked");
            let message = format!("{failures} of {count} callbacks panicked");
            self.observer
                .on_callback_event(false, count, Some(message.as_str()));
        } else if count > 0 {
            self.observer.on_callback_event(true, count, None);
        }
        self.observer.on_state_change(state, source);
    }

    fn schedule_tick(inner: &Arc<Inner>, generation: u64, delay: Duration) -> TimerHandle {
        let weak = Arc::downgrade(inner);
        inner.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Inner::run_tick(&inner, generation, delay);
                }
            }),
        )
    }

    fn run_tick(inner: &Arc<Inner>, generation: u64, interval: Duration) {
        {
            let poller = inner.poller.lock();
            if poller.generation != generation || *poller.machine.state() == PollerState::Stopped {
                return;
            }
        }

        let outcome = inner.check_for_state_changes();
        let error = outcome.as_ref().err().map(ToString::to_string);
        inner
            .observer
            .on_polling_event(outcome.is_ok(), interval, error.as_deref());

        let mut poller = inner.poller.lock();
        if poller.generation != generation || *poller.machine.state() == PollerState::Stopped {
            return;
        }

        let next = match outcome {
            Ok(_) => {
                poller.consecutive_errors = 0;
                poller.transition(PollerInput::PollSucceeded);
                inner.poll.base
            }
            Err(err) => {
                poller.consecutive_errors += 1;
                poller.transition(PollerInput::PollFailed);
                if poller.consecutive_errors >= inner.poll.max_consecutive_errors {
                    warn!(
                        context_id = %inner.context_id,
                        errors = poller.consecutive_errors,
                        error = %err,
                        "Polling error budget exhausted, restarting from base interval"
                    );
                    poller.consecutive_errors = 0;
                    poller.transition(PollerInput::ErrorBudgetExhausted);
                    inner.poll.base
                } else {
                    let next = compute_interval(
                        poller.consecutive_errors,
                        inner.poll.base,
                        inner.poll.multiplier,
                        inner.poll.max,
                    );
                    debug!(
                        context_id = %inner.context_id,
                        errors = poller.consecutive_errors,
                        next_ms = next.as_millis() as u64,
                        transient = err.is_transient(),
                        "Polling failed, backing off"
                    );
                    next
                }
            }
        };

        poller.current_interval = next;
        poller.timer = Some(Inner::schedule_tick(inner, generation, next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::SyncObserver;
    use backoff_scheduler::ManualScheduler;
    use session_config_and_utils::{AuthStatus, ManualClock};
    use session_storage::{KeyValueStore, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingObserver {
        polls: Mutex<Vec<(bool, Duration)>>,
        storage_failures: Mutex<Vec<StorageOperation>>,
        callback_failures: AtomicUsize,
        changes: Mutex<Vec<ChangeSource>>,
    }

    impl SyncObserver for RecordingObserver {
        fn on_polling_event(&self, success: bool, interval: Duration, _error: Option<&str>) {
            self.polls.lock().push((success, interval));
        }

        fn on_storage_event(&self, success: bool, operation: StorageOperation, _error: Option<&str>) {
            if !success {
                self.storage_failures.lock().push(operation);
            }
        }

        fn on_callback_event(&self, success: bool, _callback_count: usize, _error: Option<&str>) {
            if !success {
                self.callback_failures.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_state_change(&self, _state: Option<&AuthState>, source: ChangeSource) {
            self.changes.lock().push(source);
        }
    }

    struct Harness {
        storage: MemoryStore,
        clock: Arc<ManualClock>,
        scheduler: Arc<ManualScheduler>,
        observer: Arc<RecordingObserver>,
        config: SessionSyncConfig,
    }

    impl Harness {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::default());
            Self {
                storage: MemoryStore::new(),
                scheduler: Arc::new(ManualScheduler::new(clock.clone())),
                clock,
                observer: Arc::new(RecordingObserver::default()),
                config: SessionSyncConfig::default(),
            }
        }

        fn synchronizer(&self) -> AuthStateSynchronizer {
            AuthStateSynchronizer::new(
                &self.config,
                Arc::new(self.storage.clone()),
                self.clock.clone(),
                self.scheduler.clone(),
                self.observer.clone(),
            )
        }

        fn signed_in(&self, token: &str) -> AuthState {
            AuthState::authenticated("user-1", token, "sign_in", self.clock.now())
        }
    }

    fn collector() -> (Arc<Mutex<Vec<Option<String>>>>, impl Fn(Option<&AuthState>) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback = move |state: Option<&AuthState>| {
            sink.lock()
                .push(state.and_then(|s| s.session_token.clone()));
        };
        (seen, callback)
    }

    #[test]
    fn test_set_then_get_round_trips_through_storage() {
        let h = Harness::new();
        let sync = h.synchronizer();
        sync.set_auth_state(h.signed_in("t1")).unwrap();

        let state = sync.get_auth_state().unwrap().unwrap();
        assert_eq!(state.session_token.as_deref(), Some("t1"));
        assert_eq!(state.status, AuthStatus::Authenticated);
    }

    #[test]
    fn test_subscriber_sees_current_state_immediately_and_every_change() {
        let h = Harness::new();
        let sync = h.synchronizer();
        sync.set_auth_state(h.signed_in("t1")).unwrap();

        let (seen, callback) = collector();
        let subscription = sync.on_state_change(callback);
        sync.set_auth_state(h.signed_in("t2")).unwrap();
        sync.clear_auth_state().unwrap();

        assert_eq!(
            *seen.lock(),
            vec![Some("t1".to_string()), Some("t2".to_string()), None]
        );

        subscription.unsubscribe();
        subscription.unsubscribe();
        sync.set_auth_state(h.signed_in("t3")).unwrap();
        assert_eq!(seen.lock().len(), 3);
        assert_eq!(sync.callback_count(), 0);
    }

    #[test]
    fn test_new_subscriber_never_sees_expired_state() {
        let h = Harness::new();
        let sync = h.synchronizer();
        sync.set_auth_state(h.signed_in("t1")).unwrap();
        let (existing, callback) = collector();
        let _existing = sync.on_state_change(callback);

        h.clock.advance(Duration::from_secs(25 * 60 * 60));
        let (seen, callback) = collector();
        let _subscription = sync.on_state_change(callback);

        assert_eq!(*seen.lock(), vec![None]);
        assert_eq!(*existing.lock(), vec![Some("t1".to_string()), None]);
        assert!(sync.last_known_state().is_none());
        assert!(sync.get_auth_state().unwrap().is_none());
    }

    #[test]
    fn test_new_subscriber_falls_back_to_cache_when_storage_fails() {
        let h = Harness::new();
        let sync = h.synchronizer();
        sync.set_auth_state(h.signed_in("t1")).unwrap();

        h.storage.fail_reads(true);
        let (seen, callback) = collector();
        let _subscription = sync.on_state_change(callback);
        assert_eq!(*seen.lock(), vec![Some("t1".to_string())]);
    }

    #[test]
    fn test_expired_state_is_removed_on_read() {
        let h = Harness::new();
        let sync = h.synchronizer();
        sync.set_auth_state(h.signed_in("t1")).unwrap();

        h.clock.advance(h.config.max_age() + Duration::from_millis(1));
        assert!(sync.get_auth_state().unwrap().is_none());
        assert!(!h.storage.has(StorageKeys::AUTH_STATE).unwrap());
    }

    #[test]
    fn test_unbounded_max_age_keeps_fresh_writes() {
        let mut h = Harness::new();
        h.config.max_age_ms = u64::MAX;
        let sync = h.synchronizer();
        sync.set_auth_state(h.signed_in("t1")).unwrap();
        assert!(sync.get_auth_state().unwrap().is_some());
    }

    #[test]
    fn test_state_at_exactly_max_age_is_still_valid() {
        let h = Harness::new();
        let sync = h.synchronizer();
        sync.set_auth_state(h.signed_in("t1")).unwrap();

        h.clock.advance(h.config.max_age());
        assert!(sync.get_auth_state().unwrap().is_some());
    }

    #[test]
    fn test_corrupt_or_foreign_version_reads_as_absent() {
        let h = Harness::new();
        let sync = h.synchronizer();

        h.storage.set(StorageKeys::AUTH_STATE, "not json").unwrap();
        assert!(sync.get_auth_state().unwrap().is_none());

        let mut stored = StoredAuthState::wrap(h.signed_in("t1"), None, h.clock.now());
        stored.version = 2;
        h.storage
            .set(StorageKeys::AUTH_STATE, &serde_json::to_string(&stored).unwrap())
            .unwrap();
        assert!(sync.get_auth_state().unwrap().is_none());
    }

    #[test]
    fn test_polling_picks_up_changes_from_another_context() {
        let h = Harness::new();
        let tab_a = h.synchronizer();
        let tab_b = h.synchronizer();
        let (seen, callback) = collector();
        let _subscription = tab_b.on_state_change(callback);
        assert!(tab_b.start());

        tab_a.set_auth_state(h.signed_in("t1")).unwrap();
        h.scheduler.advance(h.config.polling_interval());
        assert_eq!(*seen.lock(), vec![None, Some("t1".to_string())]);

        // Unchanged state is not re-notified.
        h.scheduler.advance(h.config.polling_interval());
        assert_eq!(seen.lock().len(), 2);

        tab_a.clear_auth_state().unwrap();
        h.scheduler.advance(h.config.polling_interval());
        assert_eq!(seen.lock().last(), Some(&None));
        assert!(h.observer.changes.lock().contains(&ChangeSource::RemotePoll));
    }

    #[test]
    fn test_start_is_idempotent_and_stop_is_safe_twice() {
        let h = Harness::new();
        let sync = h.synchronizer();
        assert!(sync.start());
        assert!(!sync.start());
        assert_eq!(h.scheduler.pending_count(), 1);

        sync.stop();
        sync.stop();
        assert!(!sync.is_polling());
        assert_eq!(h.scheduler.pending_count(), 0);
        assert_eq!(h.scheduler.advance(Duration::from_secs(60)), 0);
    }

    #[test]
    fn test_polling_errors_back_off_then_restart_from_base() {
        let mut h = Harness::new();
        h.config.max_consecutive_errors = 3;
        let sync = h.synchronizer();
        sync.start();
        h.storage.fail_reads(true);

        h.scheduler.advance(Duration::from_millis(1000));
        assert_eq!(sync.poller_state(), PollerState::BackingOff);
        assert_eq!(sync.current_interval(), Duration::from_millis(2000));

        h.scheduler.advance(Duration::from_millis(2000));
        assert_eq!(sync.consecutive_errors(), 2);
        assert_eq!(sync.current_interval(), Duration::from_millis(4000));

        h.scheduler.advance(Duration::from_millis(4000));
        assert_eq!(sync.consecutive_errors(), 0);
        assert_eq!(sync.poller_state(), PollerState::Polling);
        assert_eq!(sync.current_interval(), Duration::from_millis(1000));

        let polls = h.observer.polls.lock().clone();
        assert_eq!(
            polls,
            vec![
                (false, Duration::from_millis(1000)),
                (false, Duration::from_millis(2000)),
                (false, Duration::from_millis(4000)),
            ]
        );
    }

    #[test]
    fn test_successful_poll_after_errors_returns_to_base() {
        let h = Harness::new();
        let sync = h.synchronizer();
        sync.start();
        h.storage.fail_reads(true);
        h.scheduler.advance(Duration::from_millis(1000));
        assert_eq!(sync.current_interval(), Duration::from_millis(2000));

        h.storage.fail_reads(false);
        h.scheduler.advance(Duration::from_millis(2000));
        assert_eq!(sync.poller_state(), PollerState::Polling);
        assert_eq!(sync.current_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_reset_rearms_at_base_interval() {
        let h = Harness::new();
        let sync = h.synchronizer();
        sync.start();
        h.storage.fail_reads(true);
        h.scheduler.advance(Duration::from_millis(1000));
        h.storage.fail_reads(false);

        sync.reset();
        assert_eq!(sync.poller_state(), PollerState::Polling);
        assert_eq!(h.scheduler.pending_count(), 1);
        assert_eq!(h.scheduler.next_due_in(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_write_failure_is_reported_but_state_still_propagates_locally() {
        let h = Harness::new();
        let sync = h.synchronizer();
        let (seen, callback) = collector();
        let _subscription = sync.on_state_change(callback);

        h.storage.fail_writes(true);
        let result = sync.set_auth_state(h.signed_in("t1"));
        assert!(matches!(result, Err(SyncError::Storage(_))));
        assert_eq!(
            sync.last_known_state().and_then(|s| s.session_token),
            Some("t1".to_string())
        );
        assert_eq!(seen.lock().last(), Some(&Some("t1".to_string())));
        assert_eq!(*h.observer.storage_failures.lock(), vec![StorageOperation::Write]);
    }

    #[test]
    fn test_panicking_callback_does_not_block_others() {
        let h = Harness::new();
        let sync = h.synchronizer();
        let calls = Arc::new(AtomicUsize::new(0));

        let _bad = sync.on_state_change(|state: Option<&AuthState>| {
            if state.is_some() {
                panic!("subscriber bug");
            }
        });
        let counter = calls.clone();
        let _good = sync.on_state_change(move |_: Option<&AuthState>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sync.set_auth_state(h.signed_in("t1")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.observer.callback_failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_envelope_keeps_created_at_across_rewrites() {
        let h = Harness::new();
        let sync = h.synchronizer();
        sync.set_auth_state(h.signed_in("t1")).unwrap();
        let created = h.clock.now();

        h.clock.advance(Duration::from_secs(5));
        sync.set_auth_state(h.signed_in("t2")).unwrap();

        let raw = h.storage.get(StorageKeys::AUTH_STATE).unwrap().unwrap();
        let stored: StoredAuthState = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.metadata.created_at, created);
        assert_eq!(stored.metadata.updated_at, h.clock.now());
        assert_eq!(stored.metadata.source, "sign_in");
    }

    #[test]
    fn test_new_synchronizer_seeds_last_known_from_storage() {
        let h = Harness::new();
        h.synchronizer().set_auth_state(h.signed_in("t1")).unwrap();

        let fresh = h.synchronizer();
        assert_eq!(
            fresh.last_known_state().and_then(|s| s.session_token),
            Some("t1".to_string())
        );
        assert!(!fresh.check_for_state_changes().unwrap());
    }
}
