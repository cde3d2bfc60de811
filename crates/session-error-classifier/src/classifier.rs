//! Classification rules.
//!
//! The four rule functions are independent so each can be tested with the
//! same inputs, but together they form one decision table:
//!
//! | condition                     | severity | recoverable | action     |
//! |-------------------------------|----------|-------------|------------|
//! | `RecoveryExhausted`           | critical | no          | reauth     |
//! | `retry_attempt >= 5`          | high     | no          | clear      |
//! | `retry_attempt >= 3`          | high     | yes         | clear      |
//! | cookie / middleware failure   | medium   | yes         | regenerate |
//! | network failure               | low      | yes         | retry      |
//! | anything else                 | low      | yes         | retry      |

use crate::types::{ErrorContext, ErrorSeverity, ErrorType, RecoveryAction, RecoveryPriority};

/// Retry attempts after which severity escalates and the action becomes `clear`.
pub const ESCALATION_RETRY_ATTEMPTS: u32 = 3;

/// Retry attempts after which a failure is no longer considered recoverable.
pub const MAX_RECOVERABLE_RETRY_ATTEMPTS: u32 = 5;

/// Map a raw failure message to an error type by substring inspection.
pub fn categorize(message: &str) -> ErrorType {
    let message = message.to_lowercase();
    let has = |fragment: &str| message.contains(fragment);

    if has("recovery") && has("exhausted") {
        ErrorType::RecoveryExhausted
    } else if has("cookie") && has("generat") {
        ErrorType::CookieGenerationFailed
    } else if has("cookie") && (has("validat") || has("invalid") || has("corrupt")) {
        ErrorType::CookieValidationFailed
    } else if has("middleware") && has("compatib") {
        ErrorType::MiddlewareCompatibilityFailed
    } else if has("middleware") && has("pars") {
        ErrorType::MiddlewareParsingFailed
    } else if has("timeout") || has("timed out") {
        ErrorType::SessionSyncTimeout
    } else if has("network") || has("fetch") {
        ErrorType::NetworkError
    } else if has("session") && (has("invalid") || has("malformed")) {
        ErrorType::InvalidSessionData
    } else {
        ErrorType::PersistentSyncFailure
    }
}

pub fn severity(error_type: ErrorType, context: &ErrorContext) -> ErrorSeverity {
    if error_type == ErrorType::RecoveryExhausted {
        ErrorSeverity::Critical
    } else if context.retry_attempt >= ESCALATION_RETRY_ATTEMPTS {
        ErrorSeverity::High
    } else if error_type.is_cookie_or_middleware() {
        ErrorSeverity::Medium
    } else {
        ErrorSeverity::Low
    }
}

pub fn is_recoverable(error_type: ErrorType, context: &ErrorContext) -> bool {
    error_type != ErrorType::RecoveryExhausted
        && context.retry_attempt < MAX_RECOVERABLE_RETRY_ATTEMPTS
}

pub fn recovery_action(error_type: ErrorType, context: &ErrorContext) -> RecoveryAction {
    if error_type == ErrorType::RecoveryExhausted {
        RecoveryAction::Reauth
    } else if context.retry_attempt >= ESCALATION_RETRY_ATTEMPTS {
        RecoveryAction::Clear
    } else if error_type.is_cookie_or_middleware() {
        RecoveryAction::Regenerate
    } else {
        // Network failures and everything unclassified are retried as-is.
        RecoveryAction::Retry
    }
}

pub fn recovery_priority(severity: ErrorSeverity) -> RecoveryPriority {
    match severity {
        ErrorSeverity::Critical => RecoveryPriority::Immediate,
        ErrorSeverity::High => RecoveryPriority::High,
        ErrorSeverity::Medium => RecoveryPriority::Medium,
        ErrorSeverity::Low => RecoveryPriority::Low,
    }
}
