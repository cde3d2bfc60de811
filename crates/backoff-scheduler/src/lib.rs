//! # Backoff Scheduler
//!
//! Timer plumbing shared by the session sync engine:
//!
//! - **[`Scheduler`]**: one-shot timers with explicit cancellation, backed by
//!   tokio ([`TokioScheduler`]) or by virtual time ([`ManualScheduler`]).
//! - **[`compute_interval`] / [`BackoffScheduler`]**: exponential backoff
//!   arithmetic and a timer that re-arms itself on that schedule.
//! - **[`AuthPoller`] / [`PollingPolicy`]**: backoff polling while a sign-in
//!   is in flight.
//! - **[`Debouncer`]**: per-scenario coalescing of rapid triggers.

mod backoff;
mod debounce;
mod polling;
mod scheduler;

pub use backoff::{compute_interval, BackoffConfig, BackoffScheduler, BackoffTask, TickDecision};
pub use debounce::Debouncer;
pub use polling::{AuthPoller, PollingPolicy};
pub use scheduler::{
    ManualScheduler, Scheduler, SharedScheduler, TimerCallback, TimerHandle, TokioScheduler,
};
