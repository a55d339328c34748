//! Retry and backoff for blocking and async operations
//!
//! This module wraps an operation in a retry policy and returns an operation
//! with the same call shape. One controller drives every policy variant and
//! both execution models.
//!
//! # Features
//!
//! - Three variants: bounded-propagating ([`conn_retry`]), bounded-absorbing
//!   ([`func_retry`]) and unbounded ([`continuous_retry`])
//! - Deterministic exponential backoff clamped to `[min, max]`, or a fixed delay
//! - Blocking ([`Retry::wrap`]) and async ([`Retry::wrap_async`]) operations
//! - Cooperative shutdown through a `CancellationToken`; cancellation is
//!   never retried
//! - Lifecycle events with a per-call correlation context via the
//!   [`RetryObserver`] trait, logged by [`TracingObserver`] by default
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use steadfast_core::retry::{continuous_retry, RetryError};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn poll_once(queue: &'static str) -> Result<(), std::io::Error> {
//!     Ok(())
//! }
//!
//! async fn run(shutdown: CancellationToken) -> Result<(), RetryError<std::io::Error>> {
//!     let poller = continuous_retry(Duration::from_secs(1))
//!         .with_labels("queue", "poll")
//!         .with_shutdown(shutdown)
//!         .wrap_async(poll_once);
//!
//!     poller.call("jobs").await
//! }
//! ```

mod adapter;
mod backoff;
mod composer;
mod context;
mod controller;
mod error;
mod observer;
mod predicate;

pub use adapter::{
    sleep_blocking, sleep_suspending, Adapter, Blocking, Pause, Suspending, BLOCKING_PAUSE_SLICE,
};
pub use backoff::{calculate_delay, Backoff};
pub use composer::{
    compose, conn_retry, continuous_retry, func_retry, Absorbing, AbsorbingRetry, Composed,
    Outcome, Retry, Retrying,
};
pub use context::{process_name, CorrelationMode, InvocationContext, Labels};
pub use error::RetryError;
pub use observer::{
    EventKind, NoOpObserver, RecordedEvent, RecordingObserver, RetryObserver, StatsObserver,
    TracingObserver,
};
pub use predicate::{CancelPredicate, ClosurePredicate, IoInterrupted, JoinCancelled, NeverCancel};
