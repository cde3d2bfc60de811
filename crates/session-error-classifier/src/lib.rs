//! # Session Error Classifier
//!
//! Turns raw session persistence failures into structured records with a
//! pre-computed recovery action, and defines the recommendation type the
//! state store hands back to the application.
//!
//! Recovery actions escalate `retry` → `regenerate` → `clear` → `reauth`,
//! gated by how many attempts have already been made.

mod classifier;
mod recommendation;
mod record;
mod types;

pub use classifier::{
    categorize, is_recoverable, recovery_action, recovery_priority, severity,
    ESCALATION_RETRY_ATTEMPTS, MAX_RECOVERABLE_RETRY_ATTEMPTS,
};
pub use recommendation::RecoveryRecommendation;
pub use record::{create_session_persistence_error, SessionPersistenceError};
pub use types::{
    ErrorCategory, ErrorContext, ErrorSeverity, ErrorType, RecommendationPriority,
    RecoveryAction, RecoveryPriority,
};
