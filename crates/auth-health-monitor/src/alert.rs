//! Alert records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
            AlertLevel::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Metric a threshold alert was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthMetric {
    PollingErrors,
    StorageErrors,
    CallbackErrors,
    PollingInterval,
    TimeSinceLastSuccess,
    CallbackCount,
    /// Raised from a classified session persistence error.
    SessionError,
}

/// A transient alert delivered to `on_alert` subscribers. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthHealthAlert {
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<HealthMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl AuthHealthAlert {
    pub fn new(level: AlertLevel, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp,
            metric: None,
            value: None,
        }
    }

    pub fn with_metric(mut self, metric: HealthMetric, value: f64) -> Self {
        self.metric = Some(metric);
        self.value = Some(value);
        self
    }
}
