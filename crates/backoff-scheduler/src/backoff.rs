//! Exponential backoff arithmetic and a self-rescheduling backoff timer.
//!
//! # Interval Calculation
//!
//! `interval = min(base * multiplier^retry_count, max)`. With the default
//! auth polling config (base 2s, multiplier 2):
//! - check 0: 2s
//! - check 1: 4s
//! - check 2: 8s
//! - ... up to the max

use crate::scheduler::{SharedScheduler, TimerHandle};
use parking_lot::Mutex;
use session_config_and_utils::AuthPollingConfig;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

/// Backoff interval for a retry count: `base * multiplier^retry_count`,
/// capped at `max`.
pub fn compute_interval(retry_count: u32, base: Duration, multiplier: f64, max: Duration) -> Duration {
    let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
    let interval_ms = base.as_millis() as f64 * multiplier.powi(exponent);
    if !interval_ms.is_finite() || interval_ms >= max.as_millis() as f64 {
        return max;
    }
    Duration::from_millis(interval_ms.round() as u64)
}

/// Parameters of a backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl BackoffConfig {
    pub fn interval_for(&self, retry_count: u32) -> Duration {
        compute_interval(retry_count, self.base, self.multiplier, self.max)
    }
}

impl From<&AuthPollingConfig> for BackoffConfig {
    fn from(config: &AuthPollingConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_interval_ms),
            multiplier: config.multiplier,
            max: Duration::from_millis(config.max_interval_ms),
        }
    }
}

/// What a backoff task wants after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    /// Schedule the next tick at the next backoff interval.
    Continue,
    /// Stop the scheduler.
    Stop,
}

/// Task run on every tick; receives the retry count of this tick.
pub type BackoffTask = Arc<dyn Fn(u32) -> TickDecision + Send + Sync>;

struct BackoffState {
    active: bool,
    retry_count: u32,
    /// Bumped on every start/stop/reset so stale timers become no-ops.
    generation: u64,
    pending: Option<TimerHandle>,
    task: Option<BackoffTask>,
}

struct BackoffShared {
    config: BackoffConfig,
    scheduler: SharedScheduler,
    state: Mutex<BackoffState>,
}

/// Timer that runs a task repeatedly with exponentially growing gaps.
///
/// At most one timer is pending at any time. `retry_count` increments by one
/// after every tick whatever the task did; it is a liveness counter, not an
/// error counter.
#[derive(Clone)]
pub struct BackoffScheduler {
    shared: Arc<BackoffShared>,
}

impl BackoffScheduler {
    pub fn new(config: BackoffConfig, scheduler: SharedScheduler) -> Self {
        Self {
            shared: Arc::new(BackoffShared {
                config,
                scheduler,
                state: Mutex::new(BackoffState {
                    active: false,
                    retry_count: 0,
                    generation: 0,
                    pending: None,
                    task: None,
                }),
            }),
        }
    }

    pub fn config(&self) -> BackoffConfig {
        self.shared.config
    }

    /// Start ticking. Returns `false` (and does nothing) if already active.
    pub fn start<F>(&self, task: F) -> bool
    where
        F: Fn(u32) -> TickDecision + Send + Sync + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.active {
            return false;
        }
        state.active = true;
        state.task = Some(Arc::new(task));
        state.generation += 1;
        arm(&self.shared, &mut state);
        debug!(retry_count = state.retry_count, "Backoff scheduler started");
        true
    }

    /// Cancel the pending tick. Safe to call when inactive.
    pub fn stop(&self) {
        let pending = {
            let mut state = self.shared.state.lock();
            if !state.active && state.pending.is_none() {
                return;
            }
            state.active = false;
            state.task = None;
            state.generation += 1;
            state.pending.take()
        };
        if let Some(pending) = pending {
            pending.cancel();
        }
        debug!("Backoff scheduler stopped");
    }

    /// Return to the base interval with a zero retry count.
    ///
    /// An active scheduler keeps running and re-arms at the base interval.
    pub fn reset(&self) {
        let pending = {
            let mut state = self.shared.state.lock();
            state.retry_count = 0;
            state.generation += 1;
            let pending = state.pending.take();
            if state.active {
                arm(&self.shared, &mut state);
            }
            pending
        };
        if let Some(pending) = pending {
            pending.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.state.lock().active
    }

    pub fn retry_count(&self) -> u32 {
        self.shared.state.lock().retry_count
    }

    /// Interval the next tick will be scheduled at.
    pub fn current_interval(&self) -> Duration {
        let retry_count = self.shared.state.lock().retry_count;
        self.shared.config.interval_for(retry_count)
    }
}

fn arm(shared: &Arc<BackoffShared>, state: &mut BackoffState) {
    let delay = shared.config.interval_for(state.retry_count);
    let generation = state.generation;
    let weak = Arc::downgrade(shared);
    let handle = shared
        .scheduler
        .schedule(delay, Box::new(move || fire(weak, generation)));
    state.pending = Some(handle);
}

fn fire(shared: Weak<BackoffShared>, generation: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let (task, retry_count) = {
        let mut state = shared.state.lock();
        if !state.active || state.generation != generation {
            return;
        }
        state.pending = None;
        match state.task.clone() {
            Some(task) => (task, state.retry_count),
            None => return,
        }
    };

    let decision = task(retry_count);

    let mut state = shared.state.lock();
    if state.generation != generation {
        // The task stopped or reset the scheduler itself.
        return;
    }
    state.retry_count = state.retry_count.saturating_add(1);
    match decision {
        TickDecision::Continue => arm(&shared, &mut state),
        TickDecision::Stop => {
            state.active = false;
            state.task = None;
            state.generation += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use session_config_and_utils::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn setup(max_ms: u64) -> (Arc<ManualScheduler>, BackoffScheduler) {
        let manual = Arc::new(ManualScheduler::new(Arc::new(ManualClock::default())));
        let config = BackoffConfig {
            base: Duration::from_millis(2000),
            multiplier: 2.0,
            max: Duration::from_millis(max_ms),
        };
        let backoff = BackoffScheduler::new(config, manual.clone());
        (manual, backoff)
    }

    #[test]
    fn test_compute_interval_doubles_from_base() {
        let base = Duration::from_millis(2000);
        let max = Duration::from_secs(60);
        let intervals: Vec<u128> = (0..3)
            .map(|n| compute_interval(n, base, 2.0, max).as_millis())
            .collect();
        assert_eq!(intervals, vec![2000, 4000, 8000]);
    }

    #[test]
    fn test_compute_interval_caps_at_max() {
        let interval = compute_interval(2, Duration::from_millis(2000), 2.0, Duration::from_millis(5000));
        assert_eq!(interval, Duration::from_millis(5000));
    }

    #[test]
    fn test_compute_interval_matches_closed_form() {
        let base = Duration::from_millis(2000);
        let max = Duration::from_millis(100_000);
        for n in 0..12u32 {
            let expected = (2000u64 * 2u64.pow(n)).min(100_000);
            assert_eq!(
                compute_interval(n, base, 2.0, max),
                Duration::from_millis(expected),
                "retry_count {n}"
            );
        }
    }

    #[test]
    fn test_compute_interval_huge_retry_count_saturates() {
        let max = Duration::from_secs(30);
        assert_eq!(compute_interval(u32::MAX, Duration::from_secs(1), 2.0, max), max);
    }

    #[test]
    fn test_ticks_follow_backoff_schedule() {
        let (manual, backoff) = setup(60_000);
        let ticks = Arc::new(AtomicU32::new(0));
        let ticks_inner = ticks.clone();
        assert!(backoff.start(move |_| {
            ticks_inner.fetch_add(1, Ordering::SeqCst);
            TickDecision::Continue
        }));

        manual.advance(Duration::from_millis(2000));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert_eq!(backoff.retry_count(), 1);
        assert_eq!(backoff.current_interval(), Duration::from_millis(4000));

        manual.advance(Duration::from_millis(3999));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        manual.advance(Duration::from_millis(1));
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert_eq!(manual.pending_count(), 1);
    }

    #[test]
    fn test_start_twice_keeps_single_timer() {
        let (manual, backoff) = setup(60_000);
        assert!(backoff.start(|_| TickDecision::Continue));
        assert!(!backoff.start(|_| TickDecision::Continue));
        assert_eq!(manual.pending_count(), 1);
    }

    #[test]
    fn test_stop_is_idempotent_and_cancels() {
        let (manual, backoff) = setup(60_000);
        backoff.stop();
        backoff.start(|_| TickDecision::Continue);
        backoff.stop();
        backoff.stop();

        assert!(!backoff.is_active());
        assert_eq!(manual.pending_count(), 0);
        assert_eq!(manual.advance(Duration::from_secs(10)), 0);
    }

    #[test]
    fn test_reset_returns_to_base_interval() {
        let (manual, backoff) = setup(60_000);
        backoff.start(|_| TickDecision::Continue);
        manual.advance(Duration::from_millis(2000));
        manual.advance(Duration::from_millis(4000));
        assert_eq!(backoff.retry_count(), 2);

        backoff.reset();
        assert_eq!(backoff.retry_count(), 0);
        assert_eq!(backoff.current_interval(), Duration::from_millis(2000));
        assert_eq!(manual.pending_count(), 1);
        assert_eq!(manual.next_due_in(), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn test_retry_count_increments_even_when_task_stops() {
        let (manual, backoff) = setup(60_000);
        backoff.start(|_| TickDecision::Stop);
        manual.advance(Duration::from_millis(2000));

        assert!(!backoff.is_active());
        assert_eq!(backoff.retry_count(), 1);
        assert_eq!(manual.pending_count(), 0);
    }
}
