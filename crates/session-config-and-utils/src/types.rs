//! Domain types shared across crates.

use serde::{Deserialize, Serialize};

/// Coarse authentication status shared across execution contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    /// Signed in with a live session.
    Authenticated,
    /// Signed out, or the session was rejected.
    Unauthenticated,
    /// Sign-in or session validation still in flight.
    Loading,
}

impl AuthStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthStatus::Authenticated)
    }
}
