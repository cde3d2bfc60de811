//! Configuration for the session sync engine.
//!
//! Every field carries a default and can be overridden on its own: a config
//! file only needs the keys it wants to change.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVEL_ENV: &str = "SESSION_SYNC_LOG_LEVEL";
const ALERT_WEBHOOK_ENV: &str = "SESSION_SYNC_ALERT_WEBHOOK_URL";

/// A named high-frequency trigger with its own coalescing delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceScenario {
    /// Browser tab gained or lost visibility.
    TabSwitch,
    /// App returned to the foreground.
    AppForeground,
    /// App moved to the background.
    AppBackground,
    /// Burst of auth events from the identity provider.
    AuthEventBurst,
    /// Client-side route navigation.
    RouteNavigation,
}

impl DebounceScenario {
    pub const ALL: [DebounceScenario; 5] = [
        DebounceScenario::TabSwitch,
        DebounceScenario::AppForeground,
        DebounceScenario::AppBackground,
        DebounceScenario::AuthEventBurst,
        DebounceScenario::RouteNavigation,
    ];

    /// Built-in coalescing delay for this scenario.
    pub fn default_delay_ms(self) -> u64 {
        match self {
            DebounceScenario::TabSwitch => 100,
            DebounceScenario::AppForeground => 300,
            DebounceScenario::AppBackground => 500,
            DebounceScenario::AuthEventBurst => 50,
            DebounceScenario::RouteNavigation => 150,
        }
    }
}

/// Maximum acceptable operation durations and minimum success rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceThresholds {
    pub max_cookie_generation_ms: u64,
    pub max_cookie_validation_ms: u64,
    pub max_middleware_test_ms: u64,
    pub max_session_sync_ms: u64,
    /// Lowest acceptable session sync success rate, 0.0..=1.0.
    pub min_success_rate: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            max_cookie_generation_ms: 100,
            max_cookie_validation_ms: 50,
            max_middleware_test_ms: 200,
            max_session_sync_ms: 500,
            min_success_rate: 0.95,
        }
    }
}

/// Alert thresholds for the health monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub max_polling_errors: u64,
    pub max_storage_errors: u64,
    pub max_polling_interval_ms: u64,
    pub max_time_since_success_ms: u64,
    pub max_callback_count: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_polling_errors: 5,
            max_storage_errors: 3,
            max_polling_interval_ms: 2_000,
            max_time_since_success_ms: 30_000,
            max_callback_count: 50,
        }
    }
}

/// Backoff polling used while a sign-in is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthPollingConfig {
    pub base_interval_ms: u64,
    pub multiplier: f64,
    pub max_interval_ms: u64,
    /// Check count after which downstream logic escalates.
    pub max_retries: u32,
    /// Route paths on which polling is allowed at all.
    pub enabled_paths: Vec<String>,
}

impl Default for AuthPollingConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 2_000,
            multiplier: 2.0,
            max_interval_ms: 30_000,
            max_retries: 10,
            enabled_paths: vec![
                "/login".to_string(),
                "/signup".to_string(),
                "/auth/callback".to_string(),
            ],
        }
    }
}

/// Main session sync configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSyncConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Recovery attempts before the recommendation escalates to re-auth.
    pub max_retry_attempts: u32,
    pub retry_backoff_multiplier: f64,
    pub max_retry_delay_ms: u64,
    /// Base interval of the cross-context polling loop.
    pub polling_interval_ms: u64,
    /// Staleness window for the shared auth state.
    pub max_age_ms: u64,
    /// Consecutive polling errors before the loop restarts from the base interval.
    pub max_consecutive_errors: u32,
    /// Per-trigger debounce delays; missing scenarios use built-in delays.
    pub debounce_scenarios: BTreeMap<DebounceScenario, u64>,
    pub performance_thresholds: PerformanceThresholds,
    pub enable_performance_tracking: bool,
    pub health_thresholds: HealthThresholds,
    pub auth_polling: AuthPollingConfig,
    /// Optional chat-ops webhook for critical alerts.
    pub alert_webhook_url: Option<String>,
}

impl Default for SessionSyncConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            max_retry_attempts: 3,
            retry_backoff_multiplier: 2.0,
            max_retry_delay_ms: 30_000,
            polling_interval_ms: 1_000,
            max_age_ms: 24 * 60 * 60 * 1_000,
            max_consecutive_errors: 5,
            debounce_scenarios: DebounceScenario::ALL
                .iter()
                .map(|scenario| (*scenario, scenario.default_delay_ms()))
                .collect(),
            performance_thresholds: PerformanceThresholds::default(),
            enable_performance_tracking: true,
            health_thresholds: HealthThresholds::default(),
            auth_polling: AuthPollingConfig::default(),
            alert_webhook_url: None,
        }
    }
}

impl SessionSyncConfig {
    /// Create a config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from a file if it exists, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific JSON file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionSyncConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Some(level) = non_empty_env(LOG_LEVEL_ENV) {
            self.log_level = level;
        }
        if let Some(url) = non_empty_env(ALERT_WEBHOOK_ENV) {
            self.alert_webhook_url = Some(url);
        }
    }

    /// Reject values that would make the backoff arithmetic meaningless.
    pub fn validate(&self) -> CoreResult<()> {
        if self.polling_interval_ms == 0 {
            return Err(CoreError::Config(
                "polling_interval_ms must be positive".to_string(),
            ));
        }
        if self.retry_backoff_multiplier < 1.0 || !self.retry_backoff_multiplier.is_finite() {
            return Err(CoreError::Config(format!(
                "retry_backoff_multiplier must be >= 1.0, got {}",
                self.retry_backoff_multiplier
            )));
        }
        if self.polling_interval_ms > self.max_retry_delay_ms {
            return Err(CoreError::Config(format!(
                "polling_interval_ms ({}) exceeds max_retry_delay_ms ({})",
                self.polling_interval_ms, self.max_retry_delay_ms
            )));
        }
        if self.auth_polling.base_interval_ms == 0 {
            return Err(CoreError::Config(
                "auth_polling.base_interval_ms must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.performance_thresholds.min_success_rate) {
            return Err(CoreError::Config(
                "performance_thresholds.min_success_rate must be within 0.0..=1.0".to_string(),
            ));
        }
        self.alert_webhook_url()?;
        Ok(())
    }

    /// Debounce delay for a scenario.
    pub fn debounce_delay(&self, scenario: DebounceScenario) -> Duration {
        let ms = self
            .debounce_scenarios
            .get(&scenario)
            .copied()
            .unwrap_or_else(|| scenario.default_delay_ms());
        Duration::from_millis(ms)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    /// The alert webhook as a parsed URL, if configured.
    pub fn alert_webhook_url(&self) -> CoreResult<Option<Url>> {
        self.alert_webhook_url
            .as_deref()
            .map(|raw| Url::parse(raw).map_err(CoreError::from))
            .transpose()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    let raw = std::env::var(name).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
