//! Classified error records.

use crate::classifier::{categorize, is_recoverable, recovery_action, recovery_priority, severity};
use crate::types::{
    ErrorCategory, ErrorContext, ErrorSeverity, ErrorType, RecoveryAction, RecoveryPriority,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use session_config_and_utils::Clock;
use thiserror::Error;

/// A failure with its classification already attached.
///
/// Records are immutable once built; every field is derived from the error
/// type and the context at construction time.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{error_type}: {message}")]
pub struct SessionPersistenceError {
    pub error_type: ErrorType,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub recoverable: bool,
    pub recovery_action: RecoveryAction,
    pub recovery_priority: RecoveryPriority,
    /// Technical message for logs.
    pub message: String,
    /// Message safe to show to the user.
    pub user_message: String,
    pub context: ErrorContext,
    pub timestamp: DateTime<Utc>,
}

impl SessionPersistenceError {
    /// Build a record for an error whose type is already known.
    pub fn from_type(
        error_type: ErrorType,
        message: impl Into<String>,
        context: ErrorContext,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let severity = severity(error_type, &context);
        Self {
            error_type,
            category: error_type.category(),
            severity,
            recoverable: is_recoverable(error_type, &context),
            recovery_action: recovery_action(error_type, &context),
            recovery_priority: recovery_priority(severity),
            message: message.into(),
            user_message: user_message(error_type).to_string(),
            context,
            timestamp,
        }
    }

    /// Whether this error should also go through the health alert path.
    pub fn triggers_alert(&self) -> bool {
        self.severity.triggers_alert()
    }
}

/// Classify a raw failure message into a [`SessionPersistenceError`].
pub fn create_session_persistence_error(
    message: impl Into<String>,
    context: ErrorContext,
    clock: &dyn Clock,
) -> SessionPersistenceError {
    let message = message.into();
    let error_type = categorize(&message);
    SessionPersistenceError::from_type(error_type, message, context, clock.now())
}

fn user_message(error_type: ErrorType) -> &'static str {
    match error_type {
        ErrorType::CookieGenerationFailed => {
            "We couldn't save your session. Please try again."
        }
        ErrorType::CookieValidationFailed => {
            "Your session data looks invalid. We'll refresh it for you."
        }
        ErrorType::MiddlewareCompatibilityFailed | ErrorType::MiddlewareParsingFailed => {
            "Your session couldn't be verified. Please refresh the page."
        }
        ErrorType::SessionSyncTimeout => "Syncing your session is taking longer than usual.",
        ErrorType::InvalidSessionData => "Your session is no longer valid. Please sign in again.",
        ErrorType::NetworkError => "Connection problem. Check your network and try again.",
        ErrorType::RecoveryExhausted => "Your session could not be restored. Please sign in again.",
        ErrorType::PersistentSyncFailure => {
            "Something went wrong keeping you signed in. Please try again."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_config_and_utils::ManualClock;

    #[test]
    fn test_record_carries_classification() {
        let clock = ManualClock::default();
        let error = create_session_persistence_error(
            "Cookie generation failed: quota",
            ErrorContext::with_retry_attempt(1),
            &clock,
        );

        assert_eq!(error.error_type, ErrorType::CookieGenerationFailed);
        assert_eq!(error.category, ErrorCategory::Cookie);
        assert_eq!(error.severity, ErrorSeverity::Medium);
        assert!(error.recoverable);
        assert_eq!(error.recovery_action, RecoveryAction::Regenerate);
        assert_eq!(error.recovery_priority, RecoveryPriority::Medium);
        assert_eq!(error.timestamp, clock.now());
        assert!(!error.user_message.is_empty());
        assert!(!error.triggers_alert());
    }

    #[test]
    fn test_exhausted_recovery_is_critical_and_alerts() {
        let clock = ManualClock::default();
        let error = create_session_persistence_error(
            "recovery attempts exhausted",
            ErrorContext::default(),
            &clock,
        );
        assert_eq!(error.severity, ErrorSeverity::Critical);
        assert_eq!(error.recovery_priority, RecoveryPriority::Immediate);
        assert!(!error.recoverable);
        assert!(error.triggers_alert());
    }

    #[test]
    fn test_display_includes_type_and_message() {
        let clock = ManualClock::default();
        let error =
            create_session_persistence_error("Failed to fetch", ErrorContext::default(), &clock);
        assert_eq!(error.to_string(), "NETWORK_ERROR: Failed to fetch");
    }

    #[test]
    fn test_same_input_gives_same_record() {
        let clock = ManualClock::default();
        let context = ErrorContext::with_retry_attempt(3);
        let a = create_session_persistence_error("timeout", context.clone(), &clock);
        let b = create_session_persistence_error("timeout", context, &clock);
        assert_eq!(a, b);
    }
}
