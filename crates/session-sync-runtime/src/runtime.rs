//! One runtime per execution context.

use crate::error::{RuntimeError, RuntimeResult};
use auth_health_monitor::{
    AlertLevel, AlertSubscription, AuthHealthAlert, AuthHealthMonitor, HealthMetric, HealthStatus,
    WebhookNotifier,
};
use auth_state_synchronizer::{AuthState, AuthStateSynchronizer, Subscription};
use backoff_scheduler::{AuthPoller, Debouncer, SharedScheduler, TokioScheduler};
use session_config_and_utils::{
    AuthStatus, DebounceScenario, SessionSyncConfig, SharedClock, SystemClock,
};
use session_error_classifier::{
    create_session_persistence_error, ErrorContext, ErrorSeverity, ErrorType,
    RecoveryRecommendation, SessionPersistenceError,
};
use session_persistence_store::{
    SessionPersistenceStore, SessionSyncError, SyncErrorType, DEFAULT_CLEANUP_MAX_AGE,
};
use session_storage::SharedStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Wires the persistence store, the auth state synchronizer, the health
/// monitor and the timers of one execution context around shared storage.
///
/// The health monitor is installed as the synchronizer's observer, so every
/// storage, polling and callback outcome feeds health metrics. Dropping the
/// runtime stops its timers.
pub struct SessionSyncRuntime {
    config: SessionSyncConfig,
    clock: SharedClock,
    persistence: SessionPersistenceStore,
    synchronizer: AuthStateSynchronizer,
    health: Arc<AuthHealthMonitor>,
    debouncer: Debouncer,
    auth_poller: AuthPoller,
}

impl SessionSyncRuntime {
    /// Build a runtime from explicit collaborators.
    ///
    /// Fails if the configuration does not validate or the alert webhook
    /// cannot be set up.
    pub fn new(
        config: SessionSyncConfig,
        storage: SharedStore,
        clock: SharedClock,
        scheduler: SharedScheduler,
    ) -> RuntimeResult<Self> {
        config.validate()?;

        let mut health = AuthHealthMonitor::new(&config, storage.clone(), clock.clone());
        if let Some(url) = config.alert_webhook_url()? {
            info!(url = %url, "Critical alerts will be posted to webhook");
            health = health.with_notifier(Arc::new(WebhookNotifier::new(url)?));
        }
        let health = Arc::new(health);

        let persistence = SessionPersistenceStore::new(&config, storage.clone(), clock.clone());
        let synchronizer = AuthStateSynchronizer::new(
            &config,
            storage,
            clock.clone(),
            scheduler.clone(),
            health.clone(),
        );
        let debouncer = Debouncer::from_config(&config, scheduler.clone());
        let auth_poller = AuthPoller::new(&config.auth_polling, scheduler);

        info!(context_id = %synchronizer.context_id(), "Session sync runtime ready");

        Ok(Self {
            config,
            clock,
            persistence,
            synchronizer,
            health,
            debouncer,
            auth_poller,
        })
    }

    /// Build a runtime on the system clock and the current tokio runtime.
    pub fn with_tokio(config: SessionSyncConfig, storage: SharedStore) -> RuntimeResult<Self> {
        let scheduler = TokioScheduler::try_current().ok_or(RuntimeError::NoAsyncRuntime)?;
        Self::new(config, storage, Arc::new(SystemClock), Arc::new(scheduler))
    }

    pub fn config(&self) -> &SessionSyncConfig {
        &self.config
    }

    pub fn persistence(&self) -> &SessionPersistenceStore {
        &self.persistence
    }

    pub fn synchronizer(&self) -> &AuthStateSynchronizer {
        &self.synchronizer
    }

    pub fn health(&self) -> &AuthHealthMonitor {
        &self.health
    }

    pub fn set_auth_state(&self, state: AuthState) -> RuntimeResult<()> {
        Ok(self.synchronizer.set_auth_state(state)?)
    }

    pub fn get_auth_state(&self) -> RuntimeResult<Option<AuthState>> {
        Ok(self.synchronizer.get_auth_state()?)
    }

    pub fn clear_auth_state(&self) -> RuntimeResult<()> {
        Ok(self.synchronizer.clear_auth_state()?)
    }

    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<&AuthState>) + Send + Sync + 'static,
    {
        self.synchronizer.on_state_change(callback)
    }

    /// Start cross-context polling. Returns `false` if already running.
    pub fn start(&self) -> bool {
        self.synchronizer.start()
    }

    /// Stop polling, sign-in polling and pending debounced triggers.
    /// Safe to call repeatedly.
    pub fn stop(&self) {
        self.synchronizer.stop();
        self.auth_poller.stop();
        self.debouncer.cancel_all();
    }

    pub fn reset(&self) {
        self.synchronizer.reset();
        self.auth_poller.reset();
    }

    /// Poll for a sign-in landing in shared storage while the user sits on
    /// an auth page. `current_path` is consulted before every check.
    ///
    /// Polling stops by itself once the user is authenticated or leaves the
    /// allow-listed paths.
    pub fn start_sign_in_polling<P>(&self, current_path: P) -> bool
    where
        P: Fn() -> String + Send + Sync + 'static,
    {
        let observed = self.synchronizer.clone();
        let checker = self.synchronizer.clone();
        let max_retries = self.config.auth_polling.max_retries;
        self.auth_poller.start(
            move || {
                let status = observed
                    .last_known_state()
                    .map(|state| state.status)
                    .unwrap_or(AuthStatus::Unauthenticated);
                (current_path(), status)
            },
            move |retry_count| {
                if let Err(err) = checker.check_for_state_changes() {
                    debug!(retry_count, error = %err, "Sign-in check failed");
                }
                if retry_count + 1 >= max_retries {
                    warn!(retry_count, "Sign-in still pending after max retries");
                }
            },
        )
    }

    pub fn sign_in_polling_active(&self) -> bool {
        self.auth_poller.is_active()
    }

    /// Run `action` once `scenario` has been quiet for its debounce delay.
    pub fn debounce<F>(&self, scenario: DebounceScenario, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.debouncer.trigger(scenario, action);
    }

    pub fn get_recovery_recommendation(&self) -> Option<RecoveryRecommendation> {
        self.persistence.get_recovery_recommendation()
    }

    /// Classify a failure without recording it.
    pub fn create_session_persistence_error(
        &self,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> SessionPersistenceError {
        create_session_persistence_error(message, context, self.clock.as_ref())
    }

    /// Classify a failure, append it to the session error history and, for
    /// high and critical severities, raise a health alert.
    pub fn report_error(
        &self,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> SessionPersistenceError {
        let record = self.create_session_persistence_error(message, context);

        self.persistence.add_sync_error(SessionSyncError::new(
            sync_error_type(record.error_type),
            record.message.clone(),
            record.recoverable,
            record.timestamp,
        ));

        if record.triggers_alert() {
            let level = match record.severity {
                ErrorSeverity::Critical => AlertLevel::Critical,
                _ => AlertLevel::Error,
            };
            self.health.raise_alert(
                AuthHealthAlert::new(level, record.to_string(), record.timestamp).with_metric(
                    HealthMetric::SessionError,
                    f64::from(record.context.retry_attempt),
                ),
            );
        } else {
            info!(
                error_type = %record.error_type,
                severity = ?record.severity,
                action = ?record.recovery_action,
                "Session error recorded"
            );
        }
        record
    }

    pub fn get_health_status(&self) -> HealthStatus {
        self.health.get_health_status()
    }

    pub fn on_alert<F>(&self, callback: F) -> AlertSubscription
    where
        F: Fn(&AuthHealthAlert) + Send + Sync + 'static,
    {
        self.health.on_alert(callback)
    }

    /// Drop error and test history older than an hour.
    pub fn cleanup(&self) -> usize {
        self.persistence.cleanup(DEFAULT_CLEANUP_MAX_AGE)
    }
}

impl Drop for SessionSyncRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}

/// History kind for a classified error. Parsing and compatibility failures
/// share the middleware kind; everything outside cookies and middleware is
/// recorded as a session validation failure.
fn sync_error_type(error_type: ErrorType) -> SyncErrorType {
    match error_type {
        ErrorType::CookieGenerationFailed => SyncErrorType::CookieGeneration,
        ErrorType::CookieValidationFailed => SyncErrorType::CookieValidation,
        ErrorType::MiddlewareCompatibilityFailed | ErrorType::MiddlewareParsingFailed => {
            SyncErrorType::MiddlewareCompatibility
        }
        _ => SyncErrorType::SessionValidation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_and_middleware_errors_keep_their_kind() {
        assert_eq!(
            sync_error_type(ErrorType::CookieValidationFailed),
            SyncErrorType::CookieValidation
        );
        assert_eq!(
            sync_error_type(ErrorType::CookieGenerationFailed),
            SyncErrorType::CookieGeneration
        );
        assert_eq!(
            sync_error_type(ErrorType::MiddlewareParsingFailed),
            SyncErrorType::MiddlewareCompatibility
        );
        assert_eq!(
            sync_error_type(ErrorType::NetworkError),
            SyncErrorType::SessionValidation
        );
    }
}
