//! Rolling health metrics and the derived health status.

use auth_state_synchronizer::ChangeSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use session_config_and_utils::{elapsed_ms, AuthStatus, BoundedHistory, HealthThresholds};

/// Polling interval samples kept for the rolling average.
pub const POLLING_INTERVAL_SAMPLES: usize = 10;

/// Counters and samples collected from synchronizer events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub polling_errors: u64,
    pub storage_errors: u64,
    pub callback_errors: u64,
    pub state_changes: u64,
    /// Polls run by this instance; not persisted.
    pub total_polls: u64,
    pub successful_polls: u64,
    pub polling_intervals: BoundedHistory<u64, POLLING_INTERVAL_SAMPLES>,
    /// Not persisted, so staleness is measured from this instance's polls.
    pub last_successful_poll: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_state_change: Option<DateTime<Utc>>,
    pub last_change_source: Option<ChangeSource>,
    pub last_status: Option<AuthStatus>,
    /// Runtime only; never persisted.
    pub active_callbacks: usize,
}

impl HealthMetrics {
    /// Mean of the last polling interval samples.
    pub fn average_polling_interval_ms(&self) -> Option<f64> {
        self.polling_intervals.average()
    }

    /// Share of successful polls. No polls yet counts as fully successful.
    pub fn success_rate(&self) -> f64 {
        if self.total_polls == 0 {
            1.0
        } else {
            self.successful_polls as f64 / self.total_polls as f64
        }
    }

    /// Milliseconds since polling last succeeded, measured from `started_at`
    /// when no poll has succeeded yet. `None` until polling has run.
    pub fn time_since_last_success_ms(
        &self,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<u64> {
        if self.total_polls == 0 {
            return None;
        }
        Some(elapsed_ms(self.last_successful_poll.unwrap_or(started_at), now))
    }

    pub(crate) fn to_persisted(&self) -> PersistedHealthCounters {
        PersistedHealthCounters {
            polling_errors: self.polling_errors,
            storage_errors: self.storage_errors,
            callback_errors: self.callback_errors,
            state_changes: self.state_changes,
            last_error: self.last_error.clone(),
        }
    }

    pub(crate) fn from_persisted(counters: PersistedHealthCounters) -> Self {
        Self {
            polling_errors: counters.polling_errors,
            storage_errors: counters.storage_errors,
            callback_errors: counters.callback_errors,
            state_changes: counters.state_changes,
            last_error: counters.last_error,
            ..Self::default()
        }
    }
}

/// Counters that survive reloads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct PersistedHealthCounters {
    pub polling_errors: u64,
    pub storage_errors: u64,
    pub callback_errors: u64,
    pub state_changes: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Healthy,
    Warning,
    Error,
    Critical,
}

/// Result of `get_health_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthLevel,
    pub issues: Vec<String>,
    /// 0 to 100.
    pub score: u8,
}

const STORAGE_PENALTY: u8 = 40;
const STALE_POLLING_PENALTY: u8 = 30;
const POLLING_ERRORS_PENALTY: u8 = 20;
const SLOW_POLLING_PENALTY: u8 = 10;
const CALLBACK_COUNT_PENALTY: u8 = 10;
const CALLBACK_ERRORS_PENALTY: u8 = 5;

/// Score the metrics against the thresholds. Storage problems weigh the
/// most and make the status critical; stale polling makes it an error.
pub fn evaluate(
    metrics: &HealthMetrics,
    thresholds: &HealthThresholds,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> HealthStatus {
    let mut score: u8 = 100;
    let mut issues = Vec::new();
    let mut status = HealthLevel::Healthy;
    let mut penalize = |penalty: u8, level: HealthLevel, issue: String| {
        score = score.saturating_sub(penalty);
        status = status.max(level);
        issues.push(issue);
    };

    if metrics.storage_errors >= thresholds.max_storage_errors {
        penalize(
            STORAGE_PENALTY,
            HealthLevel::Critical,
            format!("{} storage errors", metrics.storage_errors),
        );
    }
    if let Some(stale_ms) = metrics
        .time_since_last_success_ms(started_at, now)
        .filter(|ms| *ms > thresholds.max_time_since_success_ms)
    {
        penalize(
            STALE_POLLING_PENALTY,
            HealthLevel::Error,
            format!("no successful poll for {stale_ms}ms"),
        );
    }
    if metrics.polling_errors >= thresholds.max_polling_errors {
        penalize(
            POLLING_ERRORS_PENALTY,
            HealthLevel::Warning,
            format!("{} polling errors", metrics.polling_errors),
        );
    }
    if let Some(average) = metrics
        .average_polling_interval_ms()
        .filter(|avg| *avg > thresholds.max_polling_interval_ms as f64)
    {
        penalize(
            SLOW_POLLING_PENALTY,
            HealthLevel::Warning,
            format!("average polling interval {average:.0}ms"),
        );
    }
    if metrics.active_callbacks > thresholds.max_callback_count {
        penalize(
            CALLBACK_COUNT_PENALTY,
            HealthLevel::Warning,
            format!("{} active callbacks", metrics.active_callbacks),
        );
    }
    if metrics.callback_errors > 0 {
        penalize(
            CALLBACK_ERRORS_PENALTY,
            HealthLevel::Warning,
            format!("{} callback errors", metrics.callback_errors),
        );
    }

    HealthStatus {
        status,
        issues,
        score,
    }
}
