//! Persisted session state and its component records.

use crate::metrics::PerformanceMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use session_config_and_utils::BoundedHistory;
use session_error_classifier::ErrorType;

/// Most recent middleware test results kept.
pub const MIDDLEWARE_RESULT_HISTORY: usize = 10;
/// Most recent sync errors kept.
pub const SYNC_ERROR_HISTORY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceStatus {
    #[default]
    Active,
    Expired,
    Invalid,
    Syncing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieStatus {
    Valid,
    Invalid,
    #[default]
    Missing,
    Corrupted,
}

/// Cookie operations whose durations are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieOperation {
    Generation,
    Validation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorType {
    CookieGeneration,
    CookieValidation,
    MiddlewareCompatibility,
    SessionValidation,
}

impl SyncErrorType {
    /// Classifier type used when this error feeds a recommendation.
    pub fn classified_as(self) -> ErrorType {
        match self {
            SyncErrorType::CookieGeneration => ErrorType::CookieGenerationFailed,
            SyncErrorType::CookieValidation => ErrorType::CookieValidationFailed,
            SyncErrorType::MiddlewareCompatibility => ErrorType::MiddlewareCompatibilityFailed,
            SyncErrorType::SessionValidation => ErrorType::InvalidSessionData,
        }
    }
}

/// A recorded sync failure. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSyncError {
    #[serde(rename = "type")]
    pub error_type: SyncErrorType,
    pub message: String,
    pub recoverable: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl SessionSyncError {
    pub fn new(
        error_type: SyncErrorType,
        message: impl Into<String>,
        recoverable: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            error_type,
            message: message.into(),
            recoverable,
            timestamp,
            retry_after_ms: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after_ms: u64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }
}

/// Outcome of a middleware cookie-parsing compatibility test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareTestResult {
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Everything the store tracks about the current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPersistenceState {
    pub session_id: Option<String>,
    pub persistence_status: PersistenceStatus,
    pub cookie_status: CookieStatus,
    pub cookie_generation_attempts: u32,
    pub cookie_validation_attempts: u32,
    pub middleware_compatible: bool,
    pub middleware_test_results: BoundedHistory<MiddlewareTestResult, MIDDLEWARE_RESULT_HISTORY>,
    pub sync_errors: BoundedHistory<SessionSyncError, SYNC_ERROR_HISTORY>,
    pub recovery_attempts: u32,
    pub performance_metrics: PerformanceMetrics,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for SessionPersistenceState {
    fn default() -> Self {
        Self {
            session_id: None,
            persistence_status: PersistenceStatus::default(),
            cookie_status: CookieStatus::default(),
            cookie_generation_attempts: 0,
            cookie_validation_attempts: 0,
            middleware_compatible: true,
            middleware_test_results: BoundedHistory::new(),
            sync_errors: BoundedHistory::new(),
            recovery_attempts: 0,
            performance_metrics: PerformanceMetrics::default(),
            last_updated: None,
        }
    }
}

/// Versioned envelope written to shared storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PersistedSessionState {
    pub version: u32,
    pub state: SessionPersistenceState,
}

pub(crate) const STATE_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_serializes_type_field() {
        let error = SessionSyncError::new(
            SyncErrorType::CookieGeneration,
            "quota",
            true,
            DateTime::<Utc>::default(),
        );
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["type"], "cookie_generation");
        assert!(json.get("retry_after_ms").is_none());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let state: SessionPersistenceState =
            serde_json::from_str(r#"{"session_id":"abc","recovery_attempts":2}"#).unwrap();
        assert_eq!(state.session_id.as_deref(), Some("abc"));
        assert_eq!(state.recovery_attempts, 2);
        assert!(state.middleware_compatible);
        assert_eq!(state.cookie_status, CookieStatus::Missing);
    }
}
