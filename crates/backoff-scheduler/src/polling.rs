//! Backoff polling while a sign-in is in flight.
//!
//! After an OAuth redirect or magic-link click the session may land in shared
//! storage a little later than the page that is waiting for it. [`AuthPoller`]
//! re-checks on a backoff schedule until the user is authenticated or leaves
//! the pages where waiting makes sense.

use crate::backoff::{BackoffConfig, BackoffScheduler, TickDecision};
use crate::scheduler::SharedScheduler;
use session_config_and_utils::{AuthPollingConfig, AuthStatus};
use std::time::Duration;
use tracing::{debug, info};

/// Decides whether polling should run for a path and auth status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingPolicy {
    enabled_paths: Vec<String>,
}

impl PollingPolicy {
    pub fn new<I, S>(enabled_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled_paths: enabled_paths
                .into_iter()
                .map(|path| normalize_path(&path.into()).to_string())
                .collect(),
        }
    }

    /// Polling only makes sense on allow-listed paths and only until the
    /// user is authenticated.
    pub fn should_poll(&self, path: &str, status: AuthStatus) -> bool {
        if status.is_authenticated() {
            return false;
        }
        let path = normalize_path(path);
        if !self.enabled_paths.iter().any(|enabled| enabled == path) {
            return false;
        }
        matches!(status, AuthStatus::Loading | AuthStatus::Unauthenticated)
    }
}

/// Strip the query string, fragment and trailing slash.
fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// Runs an auth check on a backoff schedule while the policy allows it.
#[derive(Clone)]
pub struct AuthPoller {
    backoff: BackoffScheduler,
    policy: PollingPolicy,
    max_retries: u32,
}

impl AuthPoller {
    pub fn new(config: &AuthPollingConfig, scheduler: SharedScheduler) -> Self {
        Self {
            backoff: BackoffScheduler::new(BackoffConfig::from(config), scheduler),
            policy: PollingPolicy::new(config.enabled_paths.iter().cloned()),
            max_retries: config.max_retries,
        }
    }

    pub fn policy(&self) -> &PollingPolicy {
        &self.policy
    }

    /// Start polling.
    ///
    /// `context` reports the current path and auth status; it is consulted
    /// before starting and before every check. `check` receives the retry
    /// count of the tick. Returns `false` if polling was not started, either
    /// because it already runs or because the policy rejects it.
    pub fn start<C, F>(&self, context: C, check: F) -> bool
    where
        C: Fn() -> (String, AuthStatus) + Send + Sync + 'static,
        F: Fn(u32) + Send + Sync + 'static,
    {
        let (path, status) = context();
        if !self.policy.should_poll(&path, status) {
            debug!(path = %path, status = ?status, "Auth polling not applicable");
            return false;
        }

        let policy = self.policy.clone();
        let started = self.backoff.start(move |retry_count| {
            let (path, status) = context();
            if !policy.should_poll(&path, status) {
                info!(path = %path, status = ?status, retry_count, "Auth polling finished");
                return TickDecision::Stop;
            }
            check(retry_count);
            TickDecision::Continue
        });
        if started {
            info!(path = %path, "Auth polling started");
        }
        started
    }

    pub fn stop(&self) {
        self.backoff.stop();
    }

    pub fn reset(&self) {
        self.backoff.reset();
    }

    pub fn is_active(&self) -> bool {
        self.backoff.is_active()
    }

    pub fn retry_count(&self) -> u32 {
        self.backoff.retry_count()
    }

    pub fn current_interval(&self) -> Duration {
        self.backoff.current_interval()
    }

    /// True once `max_retries` checks have run. Polling continues; callers
    /// use this to pick an escalation path.
    pub fn retries_exhausted(&self) -> bool {
        self.backoff.retry_count() >= self.max_retries
    }
}
