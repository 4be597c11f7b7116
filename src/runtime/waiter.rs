// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded polling of eventually-true conditions.
//!
//! A [`Waiter`] hands out [`Attempt`]s until a check passes or the budget
//! runs out. Before every attempt the bound [`Refresh`] source re-reads its
//! external state, so each check sees fresh data. Soft failures
//! ([`WaitError::Assertion`] and [`WaitError::Failed`]) are swallowed and
//! retried; when the budget expires the last one is returned. Any other
//! error aborts the wait at once.
//!
//! # Example
//!
//! ```
//! use waitkit::runtime::{poll_fn, Waiter};
//! use waitkit::ensure;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> waitkit::Result<()> {
//! let mut calls = 0;
//! let mut waiter = Waiter::new(poll_fn(move || { calls += 1; calls }), Duration::from_secs(2))
//!     .with_step(Duration::from_millis(10));
//!
//! while let Some(attempt) = waiter.next_attempt().await? {
//!     let done = attempt.check(|calls| {
//!         ensure!(*calls >= 3, "only {calls} calls so far");
//!         Ok(())
//!     })?;
//!     if done.is_some() {
//!         break;
//!     }
//! }
//! assert!(waiter.is_done());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::{Settings, DEFAULT_STEP};
use crate::error::{Result, WaitError};

/// A source of external state that is re-read before every attempt.
#[async_trait]
pub trait Refresh: Send {
    /// Snapshot handed to each attempt.
    type Context: Send;

    /// Re-fetch state from the source of truth. No-op by default.
    async fn refresh(&mut self) -> Result<()> {
        Ok(())
    }

    /// Build the snapshot the attempt inspects.
    async fn context(&mut self) -> Result<Self::Context>;
}

/// Closure-backed [`Refresh`] source; see [`poll_fn`].
pub struct PollFn<F> {
    f: F,
}

/// Poll an arbitrary value: every attempt inspects a fresh `f()`.
pub fn poll_fn<F, T>(f: F) -> PollFn<F>
where
    F: FnMut() -> T + Send,
    T: Send,
{
    PollFn { f }
}

#[async_trait]
impl<F, T> Refresh for PollFn<F>
where
    F: FnMut() -> T + Send,
    T: Send,
{
    type Context = T;

    async fn context(&mut self) -> Result<T> {
        Ok((self.f)())
    }
}

/// What to do when a waiter is built with a zero budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyBudget {
    /// Hand out no attempts and report nothing.
    #[default]
    Allow,
    /// Treat the zero budget as a configuration error.
    Reject,
}

/// Timeout-bounded sequence of attempts against a [`Refresh`] source.
pub struct Waiter<R: Refresh> {
    source: R,
    start: Instant,
    timeout: Duration,
    remaining: Duration,
    step: Duration,
    done: bool,
    /// Set after a fatal error or once the budget ran out.
    stopped: bool,
    failure: Option<WaitError>,
    iteration: u32,
    attempts: u32,
    empty_budget: EmptyBudget,
}

impl<R: Refresh> Waiter<R> {
    /// Create a waiter with the given budget and the default step.
    pub fn new(source: R, timeout: Duration) -> Self {
        Self {
            source,
            start: Instant::now(),
            timeout,
            remaining: timeout,
            step: DEFAULT_STEP,
            done: false,
            stopped: false,
            failure: None,
            iteration: 0,
            attempts: 0,
            empty_budget: EmptyBudget::default(),
        }
    }

    /// Create a waiter using `WAITKIT_TIMEOUT` (or 20 seconds) as budget.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Config`] if `WAITKIT_TIMEOUT` is not a number.
    pub fn with_default_timeout(source: R) -> Result<Self> {
        Ok(Self::new(source, Settings::default_timeout()?))
    }

    /// Create a waiter from resolved settings.
    pub fn from_settings(source: R, settings: &Settings) -> Self {
        Self::new(source, settings.timeout).with_step(settings.step)
    }

    /// Set the pause between attempts.
    #[must_use]
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Choose how a zero budget is handled.
    #[must_use]
    pub fn with_empty_budget(mut self, policy: EmptyBudget) -> Self {
        self.empty_budget = policy;
        self
    }

    /// Number of completed sleep cycles between attempts.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Number of attempts handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether a check has passed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Remaining budget of the countdown.
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Wall-clock time since the waiter was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn source(&self) -> &R {
        &self.source
    }

    pub fn into_source(self) -> R {
        self.source
    }

    fn has_budget(&self) -> bool {
        !self.remaining.is_zero() && self.start.elapsed() < self.timeout
    }

    /// Advance to the next attempt.
    ///
    /// Returns `Ok(None)` once a check has passed, or when the budget ran out
    /// without any soft failure being recorded. Returns the last soft failure
    /// when the budget ran out after one. Refresh errors are fatal.
    pub async fn next_attempt(&mut self) -> Result<Option<Attempt<'_, R>>> {
        if self.attempts > 0 {
            if self.done || self.stopped {
                return Ok(None);
            }
            tokio::time::sleep(self.step).await;
            self.remaining = self.remaining.saturating_sub(self.step);
            self.iteration += 1;
        } else if self.timeout.is_zero() && self.empty_budget == EmptyBudget::Reject {
            return Err(WaitError::Config(
                "wait budget must be positive, got 0 seconds".to_string(),
            ));
        }

        if !self.done && !self.stopped && self.has_budget() {
            trace!(iteration = self.iteration, remaining = ?self.remaining, "refreshing");
            let context = match self.refresh_context().await {
                Ok(context) => context,
                Err(e) => {
                    self.stopped = true;
                    return Err(e);
                }
            };
            self.failure = None;
            self.attempts += 1;
            return Ok(Some(Attempt {
                waiter: self,
                context,
            }));
        }

        if self.done || self.stopped {
            return Ok(None);
        }

        self.stopped = true;
        match self.failure.take() {
            Some(failure) => {
                warn!(
                    attempts = self.attempts(),
                    elapsed = ?self.start.elapsed(),
                    error = %failure,
                    "wait budget exhausted"
                );
                Err(failure)
            }
            None => {
                debug!(attempts = self.attempts(), "wait budget exhausted without a check");
                Ok(None)
            }
        }
    }

    async fn refresh_context(&mut self) -> Result<R::Context> {
        self.source.refresh().await?;
        self.source.context().await
    }

    fn record<T>(&mut self, outcome: Result<T>) -> Result<Option<T>> {
        match outcome {
            Ok(value) => {
                debug!(attempts = self.attempts(), "check passed");
                self.done = true;
                self.failure = None;
                Ok(Some(value))
            }
            Err(e) if e.is_recoverable() => {
                trace!(iteration = self.iteration, error = %e, "check not satisfied yet");
                self.failure = Some(e);
                Ok(None)
            }
            Err(e) => {
                debug!(iteration = self.iteration, error = %e, "check aborted the wait");
                self.stopped = true;
                Err(e)
            }
        }
    }

    /// Run an async check until it passes or the budget runs out.
    ///
    /// Returns `Ok(Some(value))` when a check passed, `Ok(None)` when no
    /// attempt was made at all, and the last soft failure otherwise.
    pub async fn until<T, F, Fut>(&mut self, mut check: F) -> Result<Option<T>>
    where
        F: FnMut(R::Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        while let Some(attempt) = self.next_attempt().await? {
            if let Some(value) = attempt.run(&mut check).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// One refresh plus check cycle.
///
/// Consuming the attempt with [`finish`](Attempt::finish),
/// [`check`](Attempt::check) or [`run`](Attempt::run) records its outcome.
/// Dropping it unfinished records nothing.
pub struct Attempt<'a, R: Refresh> {
    waiter: &'a mut Waiter<R>,
    context: R::Context,
}

impl<'a, R: Refresh> Attempt<'a, R> {
    /// The snapshot taken for this attempt.
    pub fn context(&self) -> &R::Context {
        &self.context
    }

    /// Zero-based index of this attempt.
    pub fn iteration(&self) -> u32 {
        self.waiter.iteration
    }

    /// Record the outcome of the check.
    ///
    /// `Ok(Some(v))` stops the waiter. A soft failure is captured and gives
    /// `Ok(None)`. Any other error aborts the waiter and is returned as is.
    pub fn finish<T>(self, outcome: Result<T>) -> Result<Option<T>> {
        self.waiter.record(outcome)
    }

    /// Run a synchronous check against the snapshot.
    pub fn check<T, F>(self, check: F) -> Result<Option<T>>
    where
        F: FnOnce(&R::Context) -> Result<T>,
    {
        let outcome = check(&self.context);
        self.finish(outcome)
    }

    /// Run an async check that takes the snapshot by value.
    pub async fn run<T, F, Fut>(self, check: F) -> Result<Option<T>>
    where
        F: FnOnce(R::Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Attempt { waiter, context } = self;
        let outcome = check(context).await;
        waiter.record(outcome)
    }
}
