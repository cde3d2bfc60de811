//! Error taxonomy: type, category, severity and recovery vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    CookieGenerationFailed,
    CookieValidationFailed,
    MiddlewareCompatibilityFailed,
    MiddlewareParsingFailed,
    SessionSyncTimeout,
    InvalidSessionData,
    NetworkError,
    RecoveryExhausted,
    /// Fallback for failures no other type matches.
    PersistentSyncFailure,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::CookieGenerationFailed => "COOKIE_GENERATION_FAILED",
            ErrorType::CookieValidationFailed => "COOKIE_VALIDATION_FAILED",
            ErrorType::MiddlewareCompatibilityFailed => "MIDDLEWARE_COMPATIBILITY_FAILED",
            ErrorType::MiddlewareParsingFailed => "MIDDLEWARE_PARSING_FAILED",
            ErrorType::SessionSyncTimeout => "SESSION_SYNC_TIMEOUT",
            ErrorType::InvalidSessionData => "INVALID_SESSION_DATA",
            ErrorType::NetworkError => "NETWORK_ERROR",
            ErrorType::RecoveryExhausted => "RECOVERY_EXHAUSTED",
            ErrorType::PersistentSyncFailure => "PERSISTENT_SYNC_FAILURE",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorType::CookieGenerationFailed | ErrorType::CookieValidationFailed => {
                ErrorCategory::Cookie
            }
            ErrorType::MiddlewareCompatibilityFailed | ErrorType::MiddlewareParsingFailed => {
                ErrorCategory::Middleware
            }
            ErrorType::SessionSyncTimeout | ErrorType::PersistentSyncFailure => ErrorCategory::Sync,
            ErrorType::InvalidSessionData => ErrorCategory::Session,
            ErrorType::NetworkError => ErrorCategory::Network,
            ErrorType::RecoveryExhausted => ErrorCategory::Recovery,
        }
    }

    pub fn is_cookie_or_middleware(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Cookie | ErrorCategory::Middleware
        )
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Cookie,
    Middleware,
    Sync,
    Session,
    Network,
    Recovery,
}

/// How bad a failure is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// High and critical errors go through the health monitor's alert path.
    pub fn triggers_alert(&self) -> bool {
        *self >= ErrorSeverity::High
    }
}

/// Remediation, ordered by escalating intrusiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Try the same operation again.
    Retry,
    /// Regenerate the session cookie from the live session.
    Regenerate,
    /// Clear persisted session state and start fresh.
    Clear,
    /// Force the user through sign-in again. Always succeeds.
    Reauth,
}

/// Urgency attached to a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPriority {
    Low,
    Medium,
    High,
    Immediate,
}

/// Urgency of a state-level recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl From<ErrorSeverity> for RecommendationPriority {
    fn from(severity: ErrorSeverity) -> Self {
        match severity {
            ErrorSeverity::Low => RecommendationPriority::Low,
            ErrorSeverity::Medium => RecommendationPriority::Medium,
            ErrorSeverity::High => RecommendationPriority::High,
            ErrorSeverity::Critical => RecommendationPriority::Critical,
        }
    }
}

/// Circumstances of a failure that influence classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Recovery attempts already made for this failure.
    pub retry_attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ErrorContext {
    pub fn with_retry_attempt(retry_attempt: u32) -> Self {
        Self {
            retry_attempt,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_actions_escalate_in_order() {
        assert!(RecoveryAction::Retry < RecoveryAction::Regenerate);
        assert!(RecoveryAction::Regenerate < RecoveryAction::Clear);
        assert!(RecoveryAction::Clear < RecoveryAction::Reauth);
    }

    #[test]
    fn test_only_high_and_critical_trigger_alerts() {
        assert!(!ErrorSeverity::Low.triggers_alert());
        assert!(!ErrorSeverity::Medium.triggers_alert());
        assert!(ErrorSeverity::High.triggers_alert());
        assert!(ErrorSeverity::Critical.triggers_alert());
    }

    #[test]
    fn test_error_type_wire_format_matches_display() {
        for error_type in [
            ErrorType::CookieGenerationFailed,
            ErrorType::MiddlewareParsingFailed,
            ErrorType::RecoveryExhausted,
        ] {
            let json = serde_json::to_string(&error_type).unwrap();
            assert_eq!(json, format!("\"{error_type}\""));
        }
    }

    #[test]
    fn test_categories_group_types() {
        assert_eq!(ErrorType::CookieValidationFailed.category(), ErrorCategory::Cookie);
        assert_eq!(ErrorType::SessionSyncTimeout.category(), ErrorCategory::Sync);
        assert!(ErrorType::MiddlewareParsingFailed.is_cookie_or_middleware());
        assert!(!ErrorType::NetworkError.is_cookie_or_middleware());
    }
}
