//! One-shot timer abstraction.
//!
//! Components never touch a runtime timer directly. They ask a [`Scheduler`]
//! for a one-shot callback and keep the returned [`TimerHandle`] to cancel it.
//! [`TokioScheduler`] backs production use; [`ManualScheduler`] fires timers
//! only when virtual time is advanced, which keeps tests free of sleeps.

use parking_lot::Mutex;
use session_config_and_utils::{Clock, ManualClock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Schedules one-shot callbacks.
pub trait Scheduler: Send + Sync {
    /// Run `callback` once after `delay`.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

/// Shared scheduler handle injected into services.
pub type SharedScheduler = Arc<dyn Scheduler>;

/// Cancellation handle for a scheduled callback.
///
/// Dropping the handle does not cancel the timer.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel the callback if it has not run yet.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// Scheduler backed by tokio timers.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the ambient runtime, if called from inside one.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        TimerHandle::new(move || task.abort())
    }
}

struct PendingTimer {
    id: u64,
    due: chrono::DateTime<chrono::Utc>,
    callback: TimerCallback,
}

#[derive(Default)]
struct ManualTimers {
    next_id: u64,
    pending: Vec<PendingTimer>,
}

/// Scheduler driven by a [`ManualClock`].
///
/// Timers fire in due order (ties in scheduling order) when the clock is
/// advanced through [`ManualScheduler::advance`]. Callbacks may schedule new
/// timers; those fire within the same advance if they fall due in the window.
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    timers: Arc<Mutex<ManualTimers>>,
}

impl ManualScheduler {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            timers: Arc::new(Mutex::new(ManualTimers::default())),
        }
    }

    pub fn clock(&self) -> &Arc<ManualClock> {
        &self.clock
    }

    /// Number of timers waiting to fire.
    pub fn pending_count(&self) -> usize {
        self.timers.lock().pending.len()
    }

    /// Time until the next timer falls due.
    pub fn next_due_in(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.timers
            .lock()
            .pending
            .iter()
            .map(|timer| timer.due)
            .min()
            .map(|due| Duration::from_millis((due - now).num_milliseconds().max(0) as u64))
    }

    /// Advance virtual time, firing every timer that falls due on the way.
    ///
    /// Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.clock.now() + chrono::Duration::milliseconds(by.as_millis() as i64);
        let mut fired = 0;

        loop {
            let next = {
                let mut timers = self.timers.lock();
                let index = timers
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by_key(|(_, timer)| (timer.due, timer.id))
                    .map(|(index, _)| index);
                index.map(|index| timers.pending.remove(index))
            };

            let Some(timer) = next else {
                break;
            };
            if timer.due > self.clock.now() {
                self.clock.set(timer.due);
            }
            (timer.callback)();
            fired += 1;
        }

        if target > self.clock.now() {
            self.clock.set(target);
        }
        fired
    }

    /// Fire timers that are already due without moving the clock.
    pub fn run_due(&self) -> usize {
        self.advance(Duration::ZERO)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let due = self.clock.now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        let id = {
            let mut timers = self.timers.lock();
            let id = timers.next_id;
            timers.next_id += 1;
            timers.pending.push(PendingTimer { id, due, callback });
            id
        };

        let timers: Weak<Mutex<ManualTimers>> = Arc::downgrade(&self.timers);
        TimerHandle::new(move || {
            if let Some(timers) = timers.upgrade() {
                timers.lock().pending.retain(|timer| timer.id != id);
            }
        })
    }
}
