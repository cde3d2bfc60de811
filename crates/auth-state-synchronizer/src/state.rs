//! Shared auth state and its stored envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use session_config_and_utils::AuthStatus;
use std::fmt;

/// Envelope version written by this build.
pub const AUTH_STATE_VERSION: u32 = 1;

/// Authentication snapshot shared across execution contexts.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub status: AuthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// Who produced the snapshot, e.g. `sign_in` or `token_refresh`.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl AuthState {
    pub fn authenticated(
        user_id: impl Into<String>,
        session_token: impl Into<String>,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            status: AuthStatus::Authenticated,
            user_id: Some(user_id.into()),
            session_token: Some(session_token.into()),
            source: source.into(),
            timestamp,
        }
    }

    pub fn unauthenticated(source: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            status: AuthStatus::Unauthenticated,
            user_id: None,
            session_token: None,
            source: source.into(),
            timestamp,
        }
    }

    /// Field-wise comparison used for change detection. The timestamp is
    /// ignored so a rewrite of identical state is not a change.
    pub fn same_as(&self, other: &AuthState) -> bool {
        self.status == other.status
            && self.user_id == other.user_id
            && self.session_token == other.session_token
            && self.source == other.source
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("status", &self.status)
            .field("user_id", &self.user_id)
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("source", &self.source)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Whether two optional snapshots differ for change detection.
pub fn states_differ(a: Option<&AuthState>, b: Option<&AuthState>) -> bool {
    match (a, b) {
        (None, None) => false,
        (Some(a), Some(b)) => !a.same_as(b),
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAuthMetadata {
    pub created_at: DateTime<Utc>,
    /// Never moves backwards across rewrites of the envelope.
    pub updated_at: DateTime<Utc>,
    pub source: String,
}

/// Versioned envelope persisted under the auth state key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAuthState {
    pub version: u32,
    pub state: AuthState,
    pub metadata: StoredAuthMetadata,
}

impl StoredAuthState {
    /// Wrap `state` for writing at `now`, carrying over the creation time of
    /// the envelope it replaces.
    pub fn wrap(state: AuthState, previous: Option<&StoredAuthState>, now: DateTime<Utc>) -> Self {
        let (created_at, updated_at) = match previous {
            Some(prev) => (prev.metadata.created_at, now.max(prev.metadata.updated_at)),
            None => (now, now),
        };
        Self {
            version: AUTH_STATE_VERSION,
            metadata: StoredAuthMetadata {
                created_at,
                updated_at,
                source: state.source.clone(),
            },
            state,
        }
    }

    /// Expired once more than `max_age_ms` has passed since the last update.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age_ms: u64) -> bool {
        let max_age_ms = i64::try_from(max_age_ms).unwrap_or(i64::MAX);
        (now - self.metadata.updated_at).num_milliseconds() > max_age_ms
    }
}
