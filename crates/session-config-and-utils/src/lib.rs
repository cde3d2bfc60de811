//! Core types, configuration, and utilities for the session sync engine.

mod bounded_history;
mod clock;
mod config;
mod error;
mod logging;
mod types;

pub use bounded_history::BoundedHistory;
pub use clock::{elapsed_ms, Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    AuthPollingConfig, DebounceScenario, HealthThresholds, PerformanceThresholds,
    SessionSyncConfig, DEFAULT_LOG_LEVEL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use types::AuthStatus;
