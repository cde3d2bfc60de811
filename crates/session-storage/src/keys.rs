//! Storage key constants.

/// Keys of the documents kept in shared storage.
pub struct StorageKeys;

impl StorageKeys {
    /// Versioned auth state envelope (JSON)
    pub const AUTH_STATE: &'static str = "session_sync.auth_state";

    /// Session persistence state (JSON)
    pub const SESSION_PERSISTENCE: &'static str = "session_sync.persistence_state";

    /// Persisted health counters (JSON)
    pub const HEALTH_METRICS: &'static str = "session_sync.health_metrics";

    pub const ALL: [&'static str; 3] = [
        Self::AUTH_STATE,
        Self::SESSION_PERSISTENCE,
        Self::HEALTH_METRICS,
    ];
}
