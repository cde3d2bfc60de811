//! # Session Persistence Store
//!
//! Aggregate state for the current session: persistence and cookie status,
//! middleware compatibility, bounded error and test histories, performance
//! metrics and recovery attempts. The whole state is written to shared
//! storage under one key after every change and loaded on construction.
//!
//! [`SessionPersistenceStore::get_recovery_recommendation`] turns the current
//! state into the remediation the application should apply next.

mod metrics;
mod state;
mod store;

pub use metrics::{
    CategoryAverage, MetricCategory, PerformanceMetrics, PerformanceSummary, ThresholdViolation,
    DURATION_HISTORY,
};
pub use state::{
    CookieOperation, CookieStatus, MiddlewareTestResult, PersistenceStatus,
    SessionPersistenceState, SessionSyncError, SyncErrorType, MIDDLEWARE_RESULT_HISTORY,
    SYNC_ERROR_HISTORY,
};
pub use store::{SessionPersistenceStore, DEFAULT_CLEANUP_MAX_AGE};
