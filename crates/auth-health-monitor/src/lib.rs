//! # Auth Health Monitor
//!
//! Observes the auth state synchronizer through its [`SyncObserver`] hooks:
//! - counts polling, storage and callback errors and state changes
//! - keeps the last 10 polling intervals for a rolling average
//! - scores overall health from 0 to 100 ([`AuthHealthMonitor::get_health_status`])
//! - raises [`AuthHealthAlert`]s to `on_alert` subscribers when thresholds
//!   are crossed, and forwards critical ones to an optional webhook
//!
//! Selected counters persist to shared storage so they survive reloads.
//!
//! [`SyncObserver`]: auth_state_synchronizer::SyncObserver

mod alert;
mod metrics;
mod monitor;
mod notifier;

pub use alert::{AlertLevel, AuthHealthAlert, HealthMetric};
pub use metrics::{evaluate, HealthLevel, HealthMetrics, HealthStatus, POLLING_INTERVAL_SAMPLES};
pub use monitor::{AlertCallback, AlertSubscription, AuthHealthMonitor, HealthSnapshot};
pub use notifier::{AlertDeliveryError, AlertNotifier, WebhookNotifier};
