//! Cancellation classification
//!
//! Every failure of a wrapped operation is retryable except a cancellation
//! signal. A `CancelPredicate` tells the controller which errors of an
//! operation's error type are cancellation signals.

use std::io;

/// Decides whether an operation error is a cancellation signal
///
/// # Example
///
/// ```rust
/// use steadfast_core::retry::CancelPredicate;
///
/// enum PollError {
///     Transient(String),
///     Shutdown,
/// }
///
/// struct OnShutdown;
///
/// impl CancelPredicate<PollError> for OnShutdown {
///     fn is_cancellation(&self, error: &PollError) -> bool {
///         matches!(error, PollError::Shutdown)
///     }
/// }
/// ```
pub trait CancelPredicate<E: ?Sized>: Send + Sync {
    /// Whether `error` requests that the loop stop without another attempt
    fn is_cancellation(&self, error: &E) -> bool;
}

/// No error is a cancellation signal (the default)
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl<E: ?Sized> CancelPredicate<E> for NeverCancel {
    fn is_cancellation(&self, _error: &E) -> bool {
        false
    }
}

/// A predicate backed by a closure
pub struct ClosurePredicate<F> {
    predicate: F,
}

impl<F> ClosurePredicate<F> {
    /// Create a new closure-based predicate
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> CancelPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn is_cancellation(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}

/// Treats `io::ErrorKind::Interrupted` as a cancellation signal
#[derive(Debug, Clone, Copy, Default)]
pub struct IoInterrupted;

impl CancelPredicate<io::Error> for IoInterrupted {
    fn is_cancellation(&self, error: &io::Error) -> bool {
        error.kind() == io::ErrorKind::Interrupted
    }
}

/// Treats a cancelled tokio task as a cancellation signal
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinCancelled;

impl CancelPredicate<tokio::task::JoinError> for JoinCancelled {
    fn is_cancellation(&self, error: &tokio::task::JoinError) -> bool {
        error.is_cancelled()
    }
}
