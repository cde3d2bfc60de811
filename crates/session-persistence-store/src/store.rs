//! The session persistence state store service.

use crate::metrics::{MetricCategory, PerformanceSummary};
use crate::state::{
    CookieOperation, CookieStatus, MiddlewareTestResult, PersistedSessionState,
    PersistenceStatus, SessionPersistenceState, SessionSyncError, STATE_VERSION,
};
use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use session_config_and_utils::{Clock, PerformanceThresholds, SessionSyncConfig, SharedClock};
use session_error_classifier::{
    ErrorContext, RecommendationPriority, RecoveryAction, RecoveryRecommendation,
};
use session_storage::{load_json, save_json, SharedStore, StorageKeys};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default age after which history entries are dropped by `cleanup`.
pub const DEFAULT_CLEANUP_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Tracks session, cookie, middleware and sync status for one execution
/// context and persists the full state to shared storage after every change.
///
/// A failed write is logged and the in-memory state stays authoritative, so
/// callers never see storage errors from mutations.
pub struct SessionPersistenceStore {
    storage: SharedStore,
    clock: SharedClock,
    max_retry_attempts: u32,
    enable_performance_tracking: bool,
    performance_thresholds: PerformanceThresholds,
    state: Mutex<SessionPersistenceState>,
}

impl SessionPersistenceStore {
    /// Create the store, loading any state a previous context persisted.
    pub fn new(config: &SessionSyncConfig, storage: SharedStore, clock: SharedClock) -> Self {
        let state = load_state(&storage);
        Self {
            storage,
            clock,
            max_retry_attempts: config.max_retry_attempts,
            enable_performance_tracking: config.enable_performance_tracking,
            performance_thresholds: config.performance_thresholds.clone(),
            state: Mutex::new(state),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionPersistenceState {
        self.state.lock().clone()
    }

    pub fn update_session(&self, session_id: impl Into<String>, status: PersistenceStatus) {
        let session_id = session_id.into();
        self.mutate(|state| {
            state.session_id = Some(session_id);
            state.persistence_status = status;
        });
    }

    /// Set the cookie status. `is_corrupted` overrides `status` with
    /// [`CookieStatus::Corrupted`].
    pub fn update_cookie_status(&self, status: CookieStatus, is_corrupted: bool) {
        let status = if is_corrupted {
            CookieStatus::Corrupted
        } else {
            status
        };
        self.mutate(|state| state.cookie_status = status);
    }

    pub fn update_middleware_compatibility(&self, compatible: bool) {
        self.mutate(|state| state.middleware_compatible = compatible);
    }

    /// Mark a sync as in flight. The next successful sync returns the status
    /// to active.
    pub fn mark_syncing(&self) {
        self.mutate(|state| state.persistence_status = PersistenceStatus::Syncing);
    }

    pub fn record_cookie_operation(&self, operation: CookieOperation, duration_ms: u64, success: bool) {
        let track = self.enable_performance_tracking;
        self.mutate(|state| {
            let category = match operation {
                CookieOperation::Generation => MetricCategory::CookieGeneration,
                CookieOperation::Validation => MetricCategory::CookieValidation,
            };
            state
                .performance_metrics
                .record(category, duration_ms, success, track);
            if !success {
                match operation {
                    CookieOperation::Generation => state.cookie_generation_attempts += 1,
                    CookieOperation::Validation => state.cookie_validation_attempts += 1,
                }
            }
        });
    }

    pub fn record_session_sync(&self, duration_ms: u64, success: bool) {
        let track = self.enable_performance_tracking;
        self.mutate(|state| {
            let metrics = &mut state.performance_metrics;
            metrics.record(MetricCategory::SessionSync, duration_ms, success, track);
            metrics.record_sync(success);
            if success && state.persistence_status == PersistenceStatus::Syncing {
                state.persistence_status = PersistenceStatus::Active;
            }
        });
    }

    /// Append a sync error. The persistence status is left alone.
    pub fn add_sync_error(&self, error: SessionSyncError) {
        debug!(error_type = ?error.error_type, message = %error.message, "Recording sync error");
        self.mutate(|state| {
            state.sync_errors.push(error);
        });
    }

    pub fn add_middleware_test_result(&self, result: MiddlewareTestResult) {
        let track = self.enable_performance_tracking;
        self.mutate(|state| {
            state.performance_metrics.record(
                MetricCategory::MiddlewareTest,
                result.duration_ms,
                result.success,
                track,
            );
            state.middleware_test_results.push(result);
        });
    }

    pub fn record_recovery_attempt(&self) {
        self.mutate(|state| state.recovery_attempts += 1);
    }

    /// Drop history entries older than `max_age`, always keeping the newest
    /// entry of each list. Returns how many entries were removed; storage is
    /// only written when something changed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let Some(cutoff) = ChronoDuration::try_milliseconds(duration_ms(max_age))
            .and_then(|age| now.checked_sub_signed(age))
        else {
            debug!(?max_age, "Cleanup age reaches past the earliest time, nothing to remove");
            return 0;
        };

        let mut state = self.state.lock();
        let before = state.sync_errors.len() + state.middleware_test_results.len();

        let newest_error = state.sync_errors.latest().cloned();
        state.sync_errors.retain(|error| error.timestamp >= cutoff);
        if let (true, Some(error)) = (state.sync_errors.is_empty(), newest_error) {
            state.sync_errors.push(error);
        }

        let newest_result = state.middleware_test_results.latest().cloned();
        state
            .middleware_test_results
            .retain(|result| result.timestamp >= cutoff);
        if let (true, Some(result)) = (state.middleware_test_results.is_empty(), newest_result) {
            state.middleware_test_results.push(result);
        }

        let removed = before - (state.sync_errors.len() + state.middleware_test_results.len());
        if removed > 0 {
            state.last_updated = Some(now);
            info!(removed, "Cleaned up stale session history");
            self.persist(&state);
        }
        removed
    }

    /// Return to the initial empty state and remove the persisted copy.
    pub fn reset_state(&self) {
        let mut state = self.state.lock();
        *state = SessionPersistenceState::default();
        if let Err(err) = self.storage.delete(StorageKeys::SESSION_PERSISTENCE) {
            warn!(error = %err, "Failed to remove persisted session state");
        }
        info!("Session persistence state reset");
    }

    pub fn get_performance_summary(&self) -> PerformanceSummary {
        let state = self.state.lock();
        state
            .performance_metrics
            .summary(state.sync_errors.to_vec(), &self.performance_thresholds)
    }

    /// What the application should do about the session right now, or `None`
    /// when nothing needs remediation.
    ///
    /// Exhausted recovery attempts always win. Otherwise the most urgent of
    /// the cookie, middleware and latest-error signals is returned.
    pub fn get_recovery_recommendation(&self) -> Option<RecoveryRecommendation> {
        let state = self.state.lock();

        if state.recovery_attempts >= self.max_retry_attempts {
            return Some(RecoveryRecommendation::new(
                RecoveryAction::Reauth,
                RecommendationPriority::Critical,
            ));
        }

        let mut candidates = Vec::new();
        if state.cookie_status == CookieStatus::Corrupted {
            candidates.push(RecoveryRecommendation::new(
                RecoveryAction::Regenerate,
                RecommendationPriority::Medium,
            ));
        }
        if !state.middleware_compatible && !state.sync_errors.is_empty() {
            candidates.push(RecoveryRecommendation::new(
                RecoveryAction::Clear,
                RecommendationPriority::High,
            ));
        }
        if let Some(error) = state.sync_errors.latest() {
            let context = ErrorContext::with_retry_attempt(state.recovery_attempts);
            candidates.push(RecoveryRecommendation::for_error(
                error.error_type.classified_as(),
                &context,
            ));
        }

        candidates.into_iter().reduce(RecoveryRecommendation::max)
    }

    fn mutate<F>(&self, apply: F)
    where
        F: FnOnce(&mut SessionPersistenceState),
    {
        let mut state = self.state.lock();
        apply(&mut state);
        state.last_updated = Some(self.clock.now());
        self.persist(&state);
    }

    fn persist(&self, state: &SessionPersistenceState) {
        let envelope = PersistedSessionState {
            version: STATE_VERSION,
            state: state.clone(),
        };
        if let Err(err) = save_json(
            self.storage.as_ref(),
            StorageKeys::SESSION_PERSISTENCE,
            &envelope,
        ) {
            warn!(error = %err, transient = err.is_transient(), "Failed to persist session state");
        }
    }
}

fn load_state(storage: &SharedStore) -> SessionPersistenceState {
    match load_json::<PersistedSessionState>(storage.as_ref(), StorageKeys::SESSION_PERSISTENCE) {
        Ok(Some(persisted)) if persisted.version == STATE_VERSION => {
            debug!("Loaded persisted session state");
            persisted.state
        }
        Ok(Some(persisted)) => {
            warn!(
                version = persisted.version,
                expected = STATE_VERSION,
                "Ignoring session state with unknown version"
            );
            SessionPersistenceState::default()
        }
        Ok(None) => SessionPersistenceState::default(),
        Err(err) => {
            warn!(error = %err, "Failed to load session state, starting fresh");
            SessionPersistenceState::default()
        }
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
