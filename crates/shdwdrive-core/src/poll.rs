//! Cancellable poll/retry loop
//!
//! A [`Poller`] repeatedly invokes an async request until a stop predicate
//! accepts the result, the consecutive-failure budget is exhausted, an
//! overall deadline passes, or its [`CancellationToken`] fires.
//!
//! ```text
//!   Idle ──► Probing ──(stop)──────────────► Stopped(value)
//!               │  ▲
//!     (no stop) │  │ sleep(interval)
//!     (error)   ▼  │
//!             Waiting ──(budget spent)────► Exhausted
//!                     ──(deadline)────────► DeadlineElapsed
//!   any await point ──(token cancelled)───► Cancelled
//! ```
//!
//! Probes are strictly sequential; there is never more than one request in
//! flight per poller. Probe errors are logged and counted, never returned.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default delay between probes
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);
/// Default consecutive-failure budget
pub const DEFAULT_MAX_FAILURES: u32 = 5;
/// Default overall deadline
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

// ============================================================================
// Configuration and outcome
// ============================================================================

/// Tuning for one poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between the end of one probe and the start of the next
    pub interval: Duration,
    /// Consecutive probe errors tolerated before giving up (0 = unbounded)
    pub max_failures: u32,
    /// Maximum time spent probing, measured from the first attempt
    pub deadline: Option<Duration>,
    /// Whether a successful probe resets the consecutive-failure counter
    pub reset_failures_on_success: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_failures: DEFAULT_MAX_FAILURES,
            deadline: Some(DEFAULT_DEADLINE),
            reset_failures_on_success: true,
        }
    }
}

/// Terminal state of a poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The stop predicate accepted this probe result
    Stopped(T),
    /// The failure budget was spent
    Exhausted,
    /// The overall deadline passed before the predicate was satisfied
    DeadlineElapsed,
    /// The cancellation token fired
    Cancelled,
}

/// Optional callbacks invoked once when the loop ends
///
/// `on_stop` runs with the accepted value. `on_failure` runs when the loop
/// gives up (budget exhausted or deadline elapsed). Neither runs on
/// cancellation.
pub struct PollCallbacks<T> {
    on_stop: Option<Box<dyn FnOnce(&T) + Send>>,
    on_failure: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> PollCallbacks<T> {
    #[must_use]
    pub fn none() -> Self {
        Self {
            on_stop: None,
            on_failure: None,
        }
    }

    #[must_use]
    pub fn on_stop(mut self, callback: impl FnOnce(&T) + Send + 'static) -> Self {
        self.on_stop = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_failure(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(callback));
        self
    }

    fn stopped(self, value: &T) {
        if let Some(callback) = self.on_stop {
            callback(value);
        }
    }

    fn failed(self) {
        if let Some(callback) = self.on_failure {
            callback();
        }
    }
}

impl<T> Default for PollCallbacks<T> {
    fn default() -> Self {
        Self::none()
    }
}

// ============================================================================
// Poller
// ============================================================================

/// Runs poll loops with a fixed [`PollConfig`]
#[derive(Debug, Clone)]
pub struct Poller {
    config: PollConfig,
    label: String,
}

impl Poller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            label: "poll".to_string(),
        }
    }

    /// Sets the name attached to this poller's log events
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Polls `request` until `should_stop` accepts a result
    ///
    /// The first probe starts immediately.
    pub async fn run<T, F, Fut, P>(
        &self,
        request: F,
        should_stop: P,
        cancel: &CancellationToken,
    ) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        P: Fn(&T) -> bool,
    {
        self.run_with(request, should_stop, PollCallbacks::none(), cancel)
            .await
    }

    /// Like [`Poller::run`], invoking `callbacks` at the terminal state
    pub async fn run_with<T, F, Fut, P>(
        &self,
        mut request: F,
        should_stop: P,
        callbacks: PollCallbacks<T>,
        cancel: &CancellationToken,
    ) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        P: Fn(&T) -> bool,
    {
        let label = self.label.as_str();
        let started = Instant::now();
        let deadline_at = self.config.deadline.map(|d| started + d);
        let mut attempts: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            attempts += 1;
            tracing::debug!(poller = label, attempt = attempts, "Probing");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(poller = label, attempt = attempts, "Poll cancelled");
                    return PollOutcome::Cancelled;
                }
                _ = sleep_until_deadline(deadline_at) => {
                    tracing::warn!(poller = label, attempts, "Poll deadline elapsed during probe");
                    callbacks.failed();
                    return PollOutcome::DeadlineElapsed;
                }
                result = request() => result,
            };

            match result {
                Ok(value) if should_stop(&value) => {
                    tracing::debug!(poller = label, attempts, "Poll stop condition met");
                    callbacks.stopped(&value);
                    return PollOutcome::Stopped(value);
                }
                Ok(_) => {
                    if self.config.reset_failures_on_success {
                        failures = 0;
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        poller = label,
                        attempt = attempts,
                        failures,
                        max_failures = self.config.max_failures,
                        error = %e,
                        "Probe failed"
                    );
                    if self.config.max_failures > 0 && failures >= self.config.max_failures {
                        callbacks.failed();
                        return PollOutcome::Exhausted;
                    }
                }
            }

            if let Some(at) = deadline_at {
                if Instant::now() + self.config.interval > at {
                    tracing::warn!(poller = label, attempts, "Poll deadline elapsed");
                    callbacks.failed();
                    return PollOutcome::DeadlineElapsed;
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(poller = label, attempt = attempts, "Poll cancelled");
                    return PollOutcome::Cancelled;
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    /// Runs the loop on a new task and returns immediately
    ///
    /// The loop observes a child of `parent`, so cancelling either the
    /// parent or the returned handle stops it.
    pub fn spawn<T, F, Fut, P>(
        &self,
        request: F,
        should_stop: P,
        callbacks: PollCallbacks<T>,
        parent: &CancellationToken,
    ) -> PollHandle<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        P: Fn(&T) -> bool + Send + 'static,
    {
        let cancel = parent.child_token();
        let task_cancel = cancel.clone();
        let poller = self.clone();
        let join = tokio::spawn(async move {
            poller
                .run_with(request, should_stop, callbacks, &task_cancel)
                .await
        });
        PollHandle { cancel, join }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(PollConfig::default())
    }
}

async fn sleep_until_deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to a spawned poll loop
#[derive(Debug)]
pub struct PollHandle<T> {
    cancel: CancellationToken,
    join: JoinHandle<PollOutcome<T>>,
}

impl<T> PollHandle<T> {
    /// Stops the loop at its next await point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Token observed by the loop
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Waits for the terminal outcome
    ///
    /// A task aborted by runtime shutdown resolves to `Cancelled`; a
    /// panic inside the probe is resumed on the caller.
    pub async fn outcome(self) -> PollOutcome<T> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => PollOutcome::Cancelled,
        }
    }
}
