//! The health monitor service.

use crate::alert::{AlertLevel, AuthHealthAlert, HealthMetric};
use crate::metrics::{evaluate, HealthMetrics, HealthStatus, PersistedHealthCounters};
use crate::notifier::AlertNotifier;
use auth_state_synchronizer::{AuthState, ChangeSource, StorageOperation, SyncObserver};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use session_config_and_utils::{elapsed_ms, Clock, HealthThresholds, SessionSyncConfig, SharedClock};
use session_storage::{load_json, save_json, SharedStore, StorageKeys};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub type AlertCallback = Arc<dyn Fn(&AuthHealthAlert) + Send + Sync>;

#[derive(Default)]
struct AlertRegistry {
    next_id: u64,
    entries: Vec<(u64, AlertCallback)>,
}

/// Handle returned by [`AuthHealthMonitor::on_alert`].
#[derive(Debug)]
pub struct AlertSubscription {
    registry: Weak<Mutex<AlertRegistry>>,
    id: u64,
}

impl AlertSubscription {
    /// Stop receiving alerts. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Point-in-time view of the monitor, including per-instance uptime.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub metrics: HealthMetrics,
    pub average_polling_interval_ms: Option<f64>,
    pub success_rate: f64,
    pub time_since_last_success_ms: Option<u64>,
    pub uptime: Duration,
}

/// Watches synchronizer activity, keeps rolling metrics and raises alerts
/// when thresholds are crossed.
///
/// Counter thresholds alert once, when the counter reaches the threshold.
/// Interval, staleness and callback-count checks alert on every offending
/// sample.
pub struct AuthHealthMonitor {
    thresholds: HealthThresholds,
    storage: SharedStore,
    clock: SharedClock,
    started_at: DateTime<Utc>,
    metrics: Mutex<HealthMetrics>,
    subscribers: Arc<Mutex<AlertRegistry>>,
    notifier: Option<Arc<dyn AlertNotifier>>,
}

impl AuthHealthMonitor {
    /// Create a monitor, restoring persisted counters if present.
    pub fn new(config: &SessionSyncConfig, storage: SharedStore, clock: SharedClock) -> Self {
        let metrics = match load_json::<PersistedHealthCounters>(
            storage.as_ref(),
            StorageKeys::HEALTH_METRICS,
        ) {
            Ok(Some(counters)) => HealthMetrics::from_persisted(counters),
            Ok(None) => HealthMetrics::default(),
            Err(err) => {
                warn!(error = %err, "Failed to load health counters, starting fresh");
                HealthMetrics::default()
            }
        };
        let started_at = clock.now();
        Self {
            thresholds: config.health_thresholds.clone(),
            storage,
            clock,
            started_at,
            metrics: Mutex::new(metrics),
            subscribers: Arc::new(Mutex::new(AlertRegistry::default())),
            notifier: None,
        }
    }

    /// Forward alerts to an outbound notifier as well as to subscribers.
    pub fn with_notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    pub fn record_polling_event(&self, success: bool, interval_ms: u64, error: Option<&str>) {
        let now = self.clock.now();
        let mut alerts = Vec::new();
        {
            let mut metrics = self.metrics.lock();
            metrics.total_polls += 1;
            metrics.polling_intervals.push(interval_ms);
            if success {
                metrics.successful_polls += 1;
                metrics.last_successful_poll = Some(now);
            } else {
                metrics.polling_errors += 1;
                metrics.last_error = error.map(str::to_string);
                if metrics.polling_errors == self.thresholds.max_polling_errors {
                    alerts.push(
                        AuthHealthAlert::new(
                            AlertLevel::Error,
                            format!("{} polling errors", metrics.polling_errors),
                            now,
                        )
                        .with_metric(HealthMetric::PollingErrors, metrics.polling_errors as f64),
                    );
                }
                let since = metrics.last_successful_poll.unwrap_or(self.started_at);
                let stale_ms = elapsed_ms(since, now);
                if stale_ms > self.thresholds.max_time_since_success_ms {
                    alerts.push(
                        AuthHealthAlert::new(
                            AlertLevel::Error,
                            format!("no successful poll for {stale_ms}ms"),
                            now,
                        )
                        .with_metric(HealthMetric::TimeSinceLastSuccess, stale_ms as f64),
                    );
                }
            }
            if interval_ms > self.thresholds.max_polling_interval_ms {
                alerts.push(
                    AuthHealthAlert::new(
                        AlertLevel::Warning,
                        format!("polling interval {interval_ms}ms"),
                        now,
                    )
                    .with_metric(HealthMetric::PollingInterval, interval_ms as f64),
                );
            }
            self.persist(&metrics);
        }
        self.dispatch(alerts);
    }

    pub fn record_storage_event(&self, success: bool, operation: StorageOperation, error: Option<&str>) {
        if success {
            return;
        }
        let now = self.clock.now();
        let mut alerts = Vec::new();
        {
            let mut metrics = self.metrics.lock();
            metrics.storage_errors += 1;
            metrics.last_error = error.map(str::to_string);
            debug!(operation = ?operation, errors = metrics.storage_errors, "Storage error recorded");
            if metrics.storage_errors == self.thresholds.max_storage_errors {
                alerts.push(
                    AuthHealthAlert::new(
                        AlertLevel::Critical,
                        format!(
                            "{} storage errors, last during {:?}",
                            metrics.storage_errors, operation
                        ),
                        now,
                    )
                    .with_metric(HealthMetric::StorageErrors, metrics.storage_errors as f64),
                );
            }
            self.persist(&metrics);
        }
        self.dispatch(alerts);
    }

    pub fn record_callback_event(&self, success: bool, callback_count: usize, error: Option<&str>) {
        let now = self.clock.now();
        let mut alerts = Vec::new();
        {
            let mut metrics = self.metrics.lock();
            metrics.active_callbacks = callback_count;
            if !success {
                metrics.callback_errors += 1;
                metrics.last_error = error.map(str::to_string);
            }
            if callback_count > self.thresholds.max_callback_count {
                alerts.push(
                    AuthHealthAlert::new(
                        AlertLevel::Warning,
                        format!("{callback_count} active callbacks"),
                        now,
                    )
                    .with_metric(HealthMetric::CallbackCount, callback_count as f64),
                );
            }
            if !success {
                self.persist(&metrics);
            }
        }
        self.dispatch(alerts);
    }

    pub fn record_state_change(&self, state: Option<&AuthState>, source: ChangeSource) {
        let mut metrics = self.metrics.lock();
        metrics.state_changes += 1;
        metrics.last_state_change = Some(self.clock.now());
        metrics.last_change_source = Some(source);
        metrics.last_status = state.map(|state| state.status);
        self.persist(&metrics);
    }

    /// Raise an alert that did not come from a threshold, such as a high
    /// severity session error.
    pub fn raise_alert(&self, alert: AuthHealthAlert) {
        self.dispatch(vec![alert]);
    }

    /// Register an alert callback.
    pub fn on_alert<F>(&self, callback: F) -> AlertSubscription
    where
        F: Fn(&AuthHealthAlert) + Send + Sync + 'static,
    {
        let mut registry = self.subscribers.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, Arc::new(callback)));
        AlertSubscription {
            registry: Arc::downgrade(&self.subscribers),
            id,
        }
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let metrics = self.metrics.lock();
        evaluate(&metrics, &self.thresholds, self.started_at, self.clock.now())
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let now = self.clock.now();
        let metrics = self.metrics.lock().clone();
        HealthSnapshot {
            average_polling_interval_ms: metrics.average_polling_interval_ms(),
            success_rate: metrics.success_rate(),
            time_since_last_success_ms: metrics.time_since_last_success_ms(self.started_at, now),
            uptime: Duration::from_millis(elapsed_ms(self.started_at, now)),
            metrics,
        }
    }

    /// Uptime of this monitor instance.
    pub fn uptime(&self) -> Duration {
        Duration::from_millis(elapsed_ms(self.started_at, self.clock.now()))
    }

    /// Zero every counter and sample, including the persisted copy.
    pub fn reset_metrics(&self) {
        let mut metrics = self.metrics.lock();
        let active_callbacks = metrics.active_callbacks;
        *metrics = HealthMetrics {
            active_callbacks,
            ..HealthMetrics::default()
        };
        self.persist(&metrics);
        info!("Health metrics reset");
    }

    /// Persist counters. Failures are only logged: routing them back through
    /// `record_storage_event` would feed the monitor its own errors.
    fn persist(&self, metrics: &HealthMetrics) {
        if let Err(err) = save_json(
            self.storage.as_ref(),
            StorageKeys::HEALTH_METRICS,
            &metrics.to_persisted(),
        ) {
            debug!(error = %err, "Failed to persist health counters");
        }
    }

    fn dispatch(&self, alerts: Vec<AuthHealthAlert>) {
        if alerts.is_empty() {
            return;
        }
        let subscribers: Vec<AlertCallback> = self
            .subscribers
            .lock()
            .entries
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for alert in &alerts {
            match alert.level {
                AlertLevel::Critical | AlertLevel::Error => {
                    error!(level = %alert.level, metric = ?alert.metric, value = ?alert.value, "{}", alert.message)
                }
                AlertLevel::Warning => {
                    warn!(metric = ?alert.metric, value = ?alert.value, "{}", alert.message)
                }
                AlertLevel::Info => info!(metric = ?alert.metric, "{}", alert.message),
            }
            for callback in &subscribers {
                if panic::catch_unwind(AssertUnwindSafe(|| callback(alert))).is_err() {
                    warn!("Alert subscriber panicked");
                }
            }
            if let Some(notifier) = &self.notifier {
                notifier.notify(alert);
            }
        }
    }
}

impl SyncObserver for AuthHealthMonitor {
    fn on_polling_event(&self, success: bool, interval: Duration, error: Option<&str>) {
        self.record_polling_event(success, interval.as_millis() as u64, error);
    }

    fn on_storage_event(&self, success: bool, operation: StorageOperation, error: Option<&str>) {
        self.record_storage_event(success, operation, error);
    }

    fn on_callback_event(&self, success: bool, callback_count: usize, error: Option<&str>) {
        self.record_callback_event(success, callback_count, error);
    }

    fn on_state_change(&self, state: Option<&AuthState>, source: ChangeSource) {
        self.record_state_change(state, source);
    }
}
