//! Operation durations, sync counters and the derived performance summary.

use serde::{Deserialize, Serialize};
use session_config_and_utils::{BoundedHistory, PerformanceThresholds};

use crate::state::SessionSyncError;

/// Most recent duration samples kept per category.
pub const DURATION_HISTORY: usize = 20;

type Durations = BoundedHistory<u64, DURATION_HISTORY>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    CookieGeneration,
    CookieValidation,
    MiddlewareTest,
    SessionSync,
}

impl MetricCategory {
    pub const ALL: [MetricCategory; 4] = [
        MetricCategory::CookieGeneration,
        MetricCategory::CookieValidation,
        MetricCategory::MiddlewareTest,
        MetricCategory::SessionSync,
    ];

    fn threshold_ms(self, thresholds: &PerformanceThresholds) -> u64 {
        match self {
            MetricCategory::CookieGeneration => thresholds.max_cookie_generation_ms,
            MetricCategory::CookieValidation => thresholds.max_cookie_validation_ms,
            MetricCategory::MiddlewareTest => thresholds.max_middleware_test_ms,
            MetricCategory::SessionSync => thresholds.max_session_sync_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceMetrics {
    pub cookie_generation_times: Durations,
    pub cookie_validation_times: Durations,
    pub middleware_test_times: Durations,
    pub session_sync_times: Durations,
    /// Every recorded cookie, middleware and sync operation.
    pub total_operations: u64,
    pub successful_operations: u64,
    pub total_sync_attempts: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub session_sync_success_rate: f64,
}

impl PerformanceMetrics {
    pub fn durations(&self, category: MetricCategory) -> &Durations {
        match category {
            MetricCategory::CookieGeneration => &self.cookie_generation_times,
            MetricCategory::CookieValidation => &self.cookie_validation_times,
            MetricCategory::MiddlewareTest => &self.middleware_test_times,
            MetricCategory::SessionSync => &self.session_sync_times,
        }
    }

    fn durations_mut(&mut self, category: MetricCategory) -> &mut Durations {
        match category {
            MetricCategory::CookieGeneration => &mut self.cookie_generation_times,
            MetricCategory::CookieValidation => &mut self.cookie_validation_times,
            MetricCategory::MiddlewareTest => &mut self.middleware_test_times,
            MetricCategory::SessionSync => &mut self.session_sync_times,
        }
    }

    /// Count an operation and, when tracking is on, keep its duration.
    pub(crate) fn record(
        &mut self,
        category: MetricCategory,
        duration_ms: u64,
        success: bool,
        track_duration: bool,
    ) {
        self.total_operations += 1;
        if success {
            self.successful_operations += 1;
        }
        if track_duration {
            self.durations_mut(category).push(duration_ms);
        }
    }

    pub(crate) fn record_sync(&mut self, success: bool) {
        self.total_sync_attempts += 1;
        if success {
            self.successful_syncs += 1;
        } else {
            self.failed_syncs += 1;
        }
        self.session_sync_success_rate = self.successful_syncs as f64 / self.total_sync_attempts as f64;
    }

    /// Share of successful sync attempts. No attempts yet counts as fully
    /// successful.
    pub fn sync_success_rate(&self) -> f64 {
        if self.total_sync_attempts == 0 {
            1.0
        } else {
            self.session_sync_success_rate
        }
    }

    /// Share of successful operations across every category. An empty record
    /// counts as fully successful.
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            1.0
        } else {
            self.successful_operations as f64 / self.total_operations as f64
        }
    }

    pub(crate) fn summary(
        &self,
        recent_errors: Vec<SessionSyncError>,
        thresholds: &PerformanceThresholds,
    ) -> PerformanceSummary {
        let operations_success_rate = self.success_rate();
        let averages = MetricCategory::ALL
            .iter()
            .filter_map(|category| {
                self.durations(*category)
                    .average()
                    .map(|average_ms| CategoryAverage {
                        category: *category,
                        average_ms,
                        samples: self.durations(*category).len(),
                    })
            })
            .collect::<Vec<_>>();

        let mut violations: Vec<ThresholdViolation> = averages
            .iter()
            .filter_map(|avg| {
                let threshold_ms = avg.category.threshold_ms(thresholds);
                (avg.average_ms > threshold_ms as f64).then(|| ThresholdViolation::SlowOperation {
                    category: avg.category,
                    average_ms: avg.average_ms,
                    threshold_ms,
                })
            })
            .collect();
        if self.total_operations > 0 && operations_success_rate < thresholds.min_success_rate {
            violations.push(ThresholdViolation::LowSuccessRate {
                success_rate: operations_success_rate,
                minimum: thresholds.min_success_rate,
            });
        }

        PerformanceSummary {
            total_operations: self.total_sync_attempts,
            success_rate: self.sync_success_rate(),
            recent_errors,
            all_operations: self.total_operations,
            operations_success_rate,
            averages,
            violations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAverage {
    pub category: MetricCategory,
    pub average_ms: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdViolation {
    SlowOperation {
        category: MetricCategory,
        average_ms: f64,
        threshold_ms: u64,
    },
    LowSuccessRate {
        success_rate: f64,
        minimum: f64,
    },
}

/// Snapshot returned by `get_performance_summary`.
///
/// `total_operations` and `success_rate` cover session sync attempts only.
/// Cookie and middleware operations are folded into `all_operations` and
/// `operations_success_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_operations: u64,
    pub success_rate: f64,
    pub recent_errors: Vec<SessionSyncError>,
    pub all_operations: u64,
    pub operations_success_rate: f64,
    pub averages: Vec<CategoryAverage>,
    pub violations: Vec<ThresholdViolation>,
}
