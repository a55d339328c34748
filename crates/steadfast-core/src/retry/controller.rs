//! Retry controller
//!
//! Drives the attempt loop for every policy variant:
//!
//! ```text
//! ATTEMPTING ──ok──────────────────────────────► SUCCESS
//!     │
//!     ├─err, cancellation signal ───────────────► CANCELLED
//!     ├─err, last permitted attempt ────────────► EXHAUSTED
//!     └─err ─► BACKOFF ──elapsed──► ATTEMPTING
//!                 └────shutdown───► CANCELLED
//! ```
//!
//! ## Rules
//! - Attempts of one call run strictly in sequence
//! - The backoff is computed once per failed attempt, before its wait
//! - The shutdown token is checked before every attempt and during every wait;
//!   an attempt in flight is never interrupted
//! - Observer callbacks cannot change the outcome

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::adapter::{Adapter, Pause};
use super::backoff::{calculate_delay, Backoff};
use super::context::{Correlation, InvocationContext, Labels};
use super::error::RetryError;
use super::observer::{notify, RetryObserver};
use super::predicate::CancelPredicate;

/// Loop configuration shared by every call of one wrapped operation
pub(crate) struct Controller {
    /// `None` retries until success or cancellation
    pub(crate) max_attempts: Option<u32>,
    pub(crate) backoff: Backoff,
    pub(crate) labels: Labels,
    pub(crate) correlation: Correlation,
    pub(crate) observer: Arc<dyn RetryObserver>,
    pub(crate) shutdown: CancellationToken,
}

impl Controller {
    /// Run one logical invocation to completion
    pub(crate) async fn run<A, Ad, P>(
        &self,
        adapter: &Ad,
        predicate: &P,
        args: A,
    ) -> Result<Ad::Output, RetryError<Ad::Error>>
    where
        A: Clone,
        Ad: Adapter<A>,
        Ad::Error: Display,
        P: CancelPredicate<Ad::Error> + ?Sized,
    {
        let start = Instant::now();
        let mut ctx = InvocationContext::new(self.labels.clone(), self.correlation.next_id());
        self.emit(|o| o.on_started(&ctx));

        loop {
            if self.shutdown.is_cancelled() {
                self.emit(|o| o.on_cancelled(&ctx, None));
                return Err(RetryError::cancelled(ctx.attempt(), None));
            }

            let attempt = ctx.begin_attempt();
            self.emit(|o| o.on_attempt_start(&ctx));

            let delay = match adapter.attempt(args.clone()).await {
                Ok(value) => {
                    let elapsed = start.elapsed();
                    self.emit(|o| o.on_completed(&ctx, elapsed));
                    return Ok(value);
                }
                Err(err) => match self.settle_failure(&ctx, predicate, err, start) {
                    Ok(delay) => delay,
                    Err(terminal) => return Err(terminal),
                },
            };

            if adapter.pause(delay, &self.shutdown).await == Pause::Cancelled {
                self.emit(|o| o.on_cancelled(&ctx, None));
                return Err(RetryError::cancelled(attempt, None));
            }
        }
    }

    /// Classify a failed attempt: the wait before the next attempt, or the
    /// error that ends the call
    fn settle_failure<E, P>(
        &self,
        ctx: &InvocationContext,
        predicate: &P,
        err: E,
        start: Instant,
    ) -> Result<Duration, RetryError<E>>
    where
        E: Display,
        P: CancelPredicate<E> + ?Sized,
    {
        let attempt = ctx.attempt();

        if predicate.is_cancellation(&err) {
            self.emit(|o| o.on_cancelled(ctx, Some(&err as &dyn Display)));
            return Err(RetryError::cancelled(attempt, Some(err)));
        }

        if self.max_attempts.is_some_and(|max| attempt >= max) {
            self.emit(|o| o.on_exhausted(ctx, &err));
            return Err(RetryError::exhausted(attempt, err, start.elapsed()));
        }

        let delay = calculate_delay(&self.backoff, attempt);
        self.emit(|o| o.on_retrying(ctx, &err, delay));
        Ok(delay)
    }

    fn emit<F>(&self, f: F)
    where
        F: FnOnce(&dyn RetryObserver),
    {
        notify(self.observer.as_ref(), f);
    }
}
