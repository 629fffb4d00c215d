//! Blocking-retry acquire driver (§4.5): poll an acquire attempt at a fixed
//! interval until it succeeds or a deadline elapses.
//!
//! Each failed attempt already publishes `UNAVAILABLE` through the
//! [`Provider`] it drives (§6.2), so a caller watching that event stream sees
//! one event per retry. [`Sleeper`] mirrors the [`Clock`](crate::clock::Clock)
//! split: production code sleeps for real, tests inject a no-op or
//! instrumented sleeper to run a bounded-deadline loop without waiting on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::handle::Handle;
use crate::provider::Provider;

/// Abstraction over sleeping between poll attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Default sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A flag a caller can set from another task to stop a blocking-retry loop
/// before its deadline. Checked once per attempt; responsiveness is bounded
/// by the polling interval.
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Requests cancellation of any loop observing this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a blocking-retry loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The attempt succeeded.
    Acquired,
    /// The deadline elapsed with no successful attempt.
    DeadlineElapsed,
    /// A [`CancelFlag`] was set before a successful attempt.
    Cancelled,
}

impl RetryOutcome {
    /// Whether the loop ended in acquisition.
    #[must_use]
    pub fn acquired(self) -> bool {
        matches!(self, RetryOutcome::Acquired)
    }
}

/// Polls `attempt` at `interval` (via `sleeper`) until it returns `true`, the
/// elapsed time since the first attempt (per `clock`) reaches `deadline`, or
/// `cancel` is set.
pub async fn poll_until<F, Fut>(
    clock: &dyn Clock,
    sleeper: &dyn Sleeper,
    interval: Duration,
    deadline: Duration,
    cancel: Option<&CancelFlag>,
    mut attempt: F,
) -> anyhow::Result<RetryOutcome>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<bool>>,
{
    let start = clock.now();
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    let deadline_millis = deadline.as_millis() as i64;

    loop {
        if cancel.is_some_and(CancelFlag::is_cancelled) {
            return Ok(RetryOutcome::Cancelled);
        }
        if attempt().await? {
            return Ok(RetryOutcome::Acquired);
        }
        if clock.now().saturating_sub(start) >= deadline_millis {
            tracing::debug!(?deadline, "blocking acquire gave up at deadline");
            return Ok(RetryOutcome::DeadlineElapsed);
        }
        sleeper.sleep(interval).await;
    }
}

impl Provider {
    /// Repeatedly attempts a writer acquire for `handle` until it succeeds or
    /// `deadline` elapses, sleeping `interval` between attempts.
    pub async fn acquire_writer_blocking(
        &self,
        handle: &Handle,
        interval: Duration,
        deadline: Duration,
    ) -> anyhow::Result<RetryOutcome> {
        self.acquire_writer_blocking_with(handle, interval, deadline, &TokioSleeper, None).await
    }

    /// As [`Provider::acquire_writer_blocking`], with an injectable sleeper
    /// and an optional cooperative cancellation flag.
    pub async fn acquire_writer_blocking_with(
        &self,
        handle: &Handle,
        interval: Duration,
        deadline: Duration,
        sleeper: &dyn Sleeper,
        cancel: Option<&CancelFlag>,
    ) -> anyhow::Result<RetryOutcome> {
        let clock: Arc<dyn Clock> = self.clock();
        poll_until(&*clock, sleeper, interval, deadline, cancel, || self.acquire_writer(handle)).await
    }

    /// Repeatedly attempts a reader-slot acquire for `handle` until it
    /// succeeds or `deadline` elapses, sleeping `interval` between attempts.
    pub async fn acquire_reader_blocking(
        &self,
        handle: &Handle,
        interval: Duration,
        deadline: Duration,
    ) -> anyhow::Result<RetryOutcome> {
        self.acquire_reader_blocking_with(handle, interval, deadline, &TokioSleeper, None).await
    }

    /// As [`Provider::acquire_reader_blocking`], with an injectable sleeper
    /// and an optional cooperative cancellation flag.
    pub async fn acquire_reader_blocking_with(
        &self,
        handle: &Handle,
        interval: Duration,
        deadline: Duration,
        sleeper: &dyn Sleeper,
        cancel: Option<&CancelFlag>,
    ) -> anyhow::Result<RetryOutcome> {
        let clock: Arc<dyn Clock> = self.clock();
        poll_until(&*clock, sleeper, interval, deadline, cancel, || self.acquire_reader(handle)).await
    }
}
