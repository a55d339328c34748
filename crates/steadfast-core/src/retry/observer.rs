//! Retry lifecycle observation and logging
//!
//! This module provides the `RetryObserver` trait for monitoring a call's
//! lifecycle and a `TracingObserver` implementation that logs using the
//! `tracing` crate. Every callback receives the call's
//! [`InvocationContext`].
//!
//! Observers cannot affect control flow: the controller dispatches every
//! callback through [`notify`], which discards panics.

use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use uuid::Uuid;

use super::context::InvocationContext;

/// Observer trait for retry lifecycle events
///
/// # Example
///
/// ```rust
/// use std::fmt::Display;
/// use std::time::Duration;
/// use steadfast_core::retry::{InvocationContext, RetryObserver};
///
/// struct MetricsObserver;
///
/// impl RetryObserver for MetricsObserver {
///     fn on_started(&self, ctx: &InvocationContext) {}
///
///     fn on_retrying(&self, ctx: &InvocationContext, error: &dyn Display, delay: Duration) {}
///
///     fn on_completed(&self, ctx: &InvocationContext, total_duration: Duration) {}
///
///     fn on_exhausted(&self, ctx: &InvocationContext, final_error: &dyn Display) {}
/// }
/// ```
pub trait RetryObserver: Send + Sync {
    /// Called once per call, before the first attempt
    fn on_started(&self, ctx: &InvocationContext);

    /// Called before every attempt; `ctx.attempt()` is the attempt number
    fn on_attempt_start(&self, ctx: &InvocationContext) {
        let _ = ctx;
    }

    /// Called when an attempt failed and the controller is about to wait
    ///
    /// # Arguments
    ///
    /// * `ctx` - The call's context; `ctx.attempt()` is the failed attempt
    /// * `error` - The failure
    /// * `delay` - The wait before the next attempt
    fn on_retrying(&self, ctx: &InvocationContext, error: &dyn Display, delay: Duration);

    /// Called when an attempt succeeds
    fn on_completed(&self, ctx: &InvocationContext, total_duration: Duration);

    /// Called when the final permitted attempt fails
    fn on_exhausted(&self, ctx: &InvocationContext, final_error: &dyn Display);

    /// Called when the loop stops on a cancellation signal
    ///
    /// `error` is the operation's failure when the operation itself reported
    /// cancellation.
    fn on_cancelled(&self, ctx: &InvocationContext, error: Option<&dyn Display>) {
        let _ = (ctx, error);
    }
}

/// Dispatch one callback, discarding any panic it raises
pub(crate) fn notify<F>(observer: &dyn RetryObserver, f: F)
where
    F: FnOnce(&dyn RetryObserver),
{
    if catch_unwind(AssertUnwindSafe(|| f(observer))).is_err() {
        // The sink is unusable; stderr is the only place left to say so.
        eprintln!("steadfast: retry observer panicked; event dropped");
    }
}

/// A no-op observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_started(&self, _ctx: &InvocationContext) {}

    fn on_retrying(&self, _ctx: &InvocationContext, _error: &dyn Display, _delay: Duration) {}

    fn on_completed(&self, _ctx: &InvocationContext, _total_duration: Duration) {}

    fn on_exhausted(&self, _ctx: &InvocationContext, _final_error: &dyn Display) {}
}

/// An observer that logs lifecycle events using the `tracing` crate
///
/// # Log Levels
///
/// - `on_started`: INFO
/// - `on_attempt_start`: DEBUG
/// - `on_retrying`: WARN
/// - `on_completed`: INFO
/// - `on_exhausted`: ERROR
/// - `on_cancelled`: WARN
///
/// Every event carries `correlation_id`, `pid`, `worker`, `service`,
/// `resource`, `action` and `attempt` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TracingObserver {
    /// Create a new tracing observer
    pub fn new() -> Self {
        Self
    }
}

impl RetryObserver for TracingObserver {
    fn on_started(&self, ctx: &InvocationContext) {
        tracing::info!(
            correlation_id = %ctx.correlation_id(),
            pid = ctx.pid(),
            worker = ctx.worker(),
            service = ctx.service(),
            resource = ctx.resource(),
            action = ctx.action(),
            attempt = ctx.attempt(),
            "{} {} started",
            ctx,
            ctx.action()
        );
    }

    fn on_attempt_start(&self, ctx: &InvocationContext) {
        tracing::debug!(
            correlation_id = %ctx.correlation_id(),
            resource = ctx.resource(),
            action = ctx.action(),
            attempt = ctx.attempt(),
            "{} starting attempt",
            ctx
        );
    }

    fn on_retrying(&self, ctx: &InvocationContext, error: &dyn Display, delay: Duration) {
        tracing::warn!(
            correlation_id = %ctx.correlation_id(),
            pid = ctx.pid(),
            worker = ctx.worker(),
            service = ctx.service(),
            resource = ctx.resource(),
            action = ctx.action(),
            attempt = ctx.attempt(),
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "{} {} failed: {}. Retrying in {:.2}s",
            ctx,
            ctx.action(),
            error,
            delay.as_secs_f64()
        );
    }

    fn on_completed(&self, ctx: &InvocationContext, total_duration: Duration) {
        tracing::info!(
            correlation_id = %ctx.correlation_id(),
            pid = ctx.pid(),
            worker = ctx.worker(),
            service = ctx.service(),
            resource = ctx.resource(),
            action = ctx.action(),
            attempt = ctx.attempt(),
            total_duration_ms = total_duration.as_millis() as u64,
            "{} {} completed successfully",
            ctx,
            ctx.action()
        );
    }

    fn on_exhausted(&self, ctx: &InvocationContext, final_error: &dyn Display) {
        tracing::error!(
            correlation_id = %ctx.correlation_id(),
            pid = ctx.pid(),
            worker = ctx.worker(),
            service = ctx.service(),
            resource = ctx.resource(),
            action = ctx.action(),
            attempt = ctx.attempt(),
            error = %final_error,
            "{} {} failed after retries: {}",
            ctx,
            ctx.action(),
            final_error
        );
    }

    fn on_cancelled(&self, ctx: &InvocationContext, error: Option<&dyn Display>) {
        if let Some(err) = error {
            tracing::warn!(
                correlation_id = %ctx.correlation_id(),
                resource = ctx.resource(),
                action = ctx.action(),
                attempt = ctx.attempt(),
                error = %err,
                "{} {} cancelled: {}",
                ctx,
                ctx.action(),
                err
            );
        } else {
            tracing::warn!(
                correlation_id = %ctx.correlation_id(),
                resource = ctx.resource(),
                action = ctx.action(),
                attempt = ctx.attempt(),
                "{} {} cancelled by shutdown request",
                ctx,
                ctx.action()
            );
        }
    }
}

/// An observer that counts lifecycle events
///
/// Useful for testing and metrics collection.
#[derive(Debug, Default)]
pub struct StatsObserver {
    /// Call start events
    pub starts: AtomicU32,
    /// Attempt start events
    pub attempt_starts: AtomicU32,
    /// Retry (failed, will wait) events
    pub retries: AtomicU32,
    /// Success events
    pub completions: AtomicU32,
    /// Exhaustion events
    pub exhaustions: AtomicU32,
    /// Cancellation events
    pub cancellations: AtomicU32,
}

impl StatsObserver {
    /// Create a new stats observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of call starts
    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    /// Get the number of attempt starts
    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    /// Get the number of retries
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// Get the number of completions
    pub fn completions(&self) -> u32 {
        self.completions.load(Ordering::SeqCst)
    }

    /// Get the number of exhaustions
    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    /// Get the number of cancellations
    pub fn cancellations(&self) -> u32 {
        self.cancellations.load(Ordering::SeqCst)
    }
}

impl RetryObserver for StatsObserver {
    fn on_started(&self, _ctx: &InvocationContext) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_attempt_start(&self, _ctx: &InvocationContext) {
        self.attempt_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_retrying(&self, _ctx: &InvocationContext, _error: &dyn Display, _delay: Duration) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    fn on_completed(&self, _ctx: &InvocationContext, _total_duration: Duration) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exhausted(&self, _ctx: &InvocationContext, _final_error: &dyn Display) {
        self.exhaustions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cancelled(&self, _ctx: &InvocationContext, _error: Option<&dyn Display>) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Kind of a recorded lifecycle event
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// The call began
    Started,
    /// An attempt is about to run
    AttemptStarted,
    /// An attempt failed and the controller will wait `delay`
    Retrying { error: String, delay: Duration },
    /// An attempt succeeded
    Completed,
    /// The last permitted attempt failed with `error`
    Exhausted { error: String },
    /// The call stopped on a cancellation signal, with the operation's
    /// error when the operation reported it
    Cancelled { error: Option<String> },
}

/// One recorded lifecycle event
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Correlation identifier of the call
    pub correlation_id: Uuid,
    /// Attempt number at the time of the event
    pub attempt: u32,
    /// What happened
    pub kind: EventKind,
}

/// An observer that keeps every event in memory, in order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingObserver {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Waits reported by `on_retrying`, in order
    pub fn delays(&self) -> Vec<Duration> {
        self.events()
            .into_iter()
            .filter_map(|event| match event.kind {
                EventKind::Retrying { delay, .. } => Some(delay),
                _ => None,
            })
            .collect()
    }

    fn push(&self, ctx: &InvocationContext, kind: EventKind) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedEvent {
                correlation_id: ctx.correlation_id(),
                attempt: ctx.attempt(),
                kind,
            });
    }
}

impl RetryObserver for RecordingObserver {
    fn on_started(&self, ctx: &InvocationContext) {
        self.push(ctx, EventKind::Started);
    }

    fn on_attempt_start(&self, ctx: &InvocationContext) {
        self.push(ctx, EventKind::AttemptStarted);
    }

    fn on_retrying(&self, ctx: &InvocationContext, error: &dyn Display, delay: Duration) {
        self.push(
            ctx,
            EventKind::Retrying {
                error: error.to_string(),
                delay,
            },
        );
    }

    fn on_completed(&self, ctx: &InvocationContext, _total_duration: Duration) {
        self.push(ctx, EventKind::Completed);
    }

    fn on_exhausted(&self, ctx: &InvocationContext, final_error: &dyn Display) {
        self.push(
            ctx,
            EventKind::Exhausted {
                error: final_error.to_string(),
            },
        );
    }

    fn on_cancelled(&self, ctx: &InvocationContext, error: Option<&dyn Display>) {
        self.push(
            ctx,
            EventKind::Cancelled {
                error: error.map(|e| e.to_string()),
            },
        );
    }
}

/// Implement RetryObserver for Arc<T> where T: RetryObserver
impl<T: RetryObserver + ?Sized> RetryObserver for std::sync::Arc<T> {
    fn on_started(&self, ctx: &InvocationContext) {
        (**self).on_started(ctx)
    }

    fn on_attempt_start(&self, ctx: &InvocationContext) {
        (**self).on_attempt_start(ctx)
    }

    fn on_retrying(&self, ctx: &InvocationContext, error: &dyn Display, delay: Duration) {
        (**self).on_retrying(ctx, error, delay)
    }

    fn on_completed(&self, ctx: &InvocationContext, total_duration: Duration) {
        (**self).on_completed(ctx, total_duration)
    }

    fn on_exhausted(&self, ctx: &InvocationContext, final_error: &dyn Display) {
        (**self).on_exhausted(ctx, final_error)
    }

    fn on_cancelled(&self, ctx: &InvocationContext, error: Option<&dyn Display>) {
        (**self).on_cancelled(ctx, error)
    }
}

/// Implement RetryObserver for Box<T> where T: RetryObserver
impl<T: RetryObserver + ?Sized> RetryObserver for Box<T> {
    fn on_started(&self, ctx: &InvocationContext) {
        (**self).on_started(ctx)
    }

    fn on_attempt_start(&self, ctx: &InvocationContext) {
        (**self).on_attempt_start(ctx)
    }

    fn on_retrying(&self, ctx: &InvocationContext, error: &dyn Display, delay: Duration) {
        (**self).on_retrying(ctx, error, delay)
    }

    fn on_completed(&self, ctx: &InvocationContext, total_duration: Duration) {
        (**self).on_completed(ctx, total_duration)
    }

    fn on_exhausted(&self, ctx: &InvocationContext, final_error: &dyn Display) {
        (**self).on_exhausted(ctx, final_error)
    }

    fn on_cancelled(&self, ctx: &InvocationContext, error: Option<&dyn Display>) {
        (**self).on_cancelled(ctx, error)
    }
}
