//! # Session Sync Runtime
//!
//! Entry point for hosts. A [`SessionSyncRuntime`] is built once per
//! execution context (tab, window, webview) around a shared
//! [`KeyValueStore`](session_storage::KeyValueStore) and exposes the whole
//! programmatic surface:
//!
//! - auth state: `set_auth_state`, `get_auth_state`, `clear_auth_state`,
//!   `on_state_change`, polling via `start` / `stop` / `reset`
//! - recovery: `report_error`, `create_session_persistence_error`,
//!   `get_recovery_recommendation`
//! - health: `get_health_status`, `on_alert`
//!
//! ```ignore
//! let runtime = SessionSyncRuntime::with_tokio(SessionSyncConfig::new(), storage)?;
//! runtime.on_state_change(|state| tracing::info!(?state, "auth changed"));
//! runtime.start();
//! ```

mod error;
mod runtime;

#[cfg(test)]
mod tests;

pub use error::{RuntimeError, RuntimeResult};
pub use runtime::SessionSyncRuntime;
