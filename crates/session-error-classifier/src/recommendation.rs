use crate::classifier::{recovery_action, severity};
use crate::types::{ErrorContext, ErrorType, RecommendationPriority, RecoveryAction};
use serde::{Deserialize, Serialize};

/// What the application should do next about the session. Derived from
/// current state on demand and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRecommendation {
    pub action: RecoveryAction,
    pub priority: RecommendationPriority,
}

impl RecoveryRecommendation {
    pub const fn new(action: RecoveryAction, priority: RecommendationPriority) -> Self {
        Self { action, priority }
    }

    /// Recommendation for a single classified failure.
    pub fn for_error(error_type: ErrorType, context: &ErrorContext) -> Self {
        Self {
            action: recovery_action(error_type, context),
            priority: severity(error_type, context).into(),
        }
    }

    /// The more urgent of two recommendations, preferring the more intrusive
    /// action when priorities tie.
    pub fn max(self, other: Self) -> Self {
        if (other.priority, other.action) > (self.priority, self.action) {
            other
        } else {
            self
        }
    }
}
