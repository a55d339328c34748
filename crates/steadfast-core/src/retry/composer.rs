//! Policy composition
//!
//! Builders that turn a policy into a wrapped operation with the same call
//! shape as the original. Nothing runs until the wrapped operation is
//! called; each call is one logical invocation with its own
//! [`InvocationContext`](super::InvocationContext).
//!
//! | Builder | Variant | Exhaustion |
//! |---|---|---|
//! | [`conn_retry`] / [`Retry::bounded`] | bounded | propagates `RetryError::Exhausted` |
//! | [`func_retry`] / [`AbsorbingRetry`] | bounded | returns `Outcome::Exhausted` |
//! | [`continuous_retry`] / [`Retry::unbounded`] | unbounded | never exhausts |
//!
//! Cancellation is surfaced by every variant.

use std::any::type_name;
use std::borrow::Cow;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{CorrelationMode, RetryPolicy};

use super::adapter::{Blocking, Suspending};
use super::backoff::Backoff;
use super::context::{process_name, Correlation, Labels};
use super::controller::Controller;
use super::error::RetryError;
use super::observer::{RetryObserver, TracingObserver};
use super::predicate::{CancelPredicate, NeverCancel};

/// Bounded, propagating retry for resources the caller cannot proceed
/// without: 6 attempts (5 retries), exponential waits from 1s to 30s
///
/// # Example
///
/// ```rust,no_run
/// use steadfast_core::retry::conn_retry;
///
/// fn connect(url: &str) -> Result<(), std::io::Error> {
///     Ok(())
/// }
///
/// let connect_db = conn_retry("postgres", "connect").wrap(|url: &str| connect(url));
/// connect_db.call("postgres://localhost").expect("database unavailable");
/// ```
pub fn conn_retry(resource_name: impl Into<Arc<str>>, action_name: impl Into<Arc<str>>) -> Retry {
    Retry::bounded(
        6,
        Backoff::exponential(1.0, Duration::from_secs(1), Duration::from_secs(30)),
    )
    .with_labels(resource_name, action_name)
}

/// Bounded, absorbing retry: 5 attempts, exponential waits from 1s to 30s
///
/// Exhaustion under this policy is lossy: the caller receives
/// [`Outcome::Exhausted`] and no value.
pub fn func_retry() -> AbsorbingRetry {
    Retry::bounded(
        5,
        Backoff::exponential(1.0, Duration::from_secs(1), Duration::from_secs(30)),
    )
    .absorbing()
}

/// Unbounded retry with a fixed delay, for background loops that must
/// survive transient errors but still stop on shutdown
pub fn continuous_retry(retry_delay: Duration) -> Retry {
    Retry::unbounded(Backoff::fixed(retry_delay))
}

/// A policy validated and resolved to its variant
pub enum Composed {
    /// Bounded-propagating or unbounded
    Propagating(Retry),
    /// Bounded-absorbing
    Absorbing(AbsorbingRetry),
}

impl Composed {
    /// Set the service label
    pub fn with_service(self, service: impl Into<Arc<str>>) -> Self {
        match self {
            Composed::Propagating(retry) => Composed::Propagating(retry.with_service(service)),
            Composed::Absorbing(retry) => Composed::Absorbing(retry.with_service(service)),
        }
    }

    /// Set the observer
    pub fn with_observer<O: RetryObserver + 'static>(self, observer: O) -> Self {
        match self {
            Composed::Propagating(retry) => Composed::Propagating(retry.with_observer(observer)),
            Composed::Absorbing(retry) => Composed::Absorbing(retry.with_observer(observer)),
        }
    }

    /// Set the shutdown token
    pub fn with_shutdown(self, shutdown: CancellationToken) -> Self {
        match self {
            Composed::Propagating(retry) => Composed::Propagating(retry.with_shutdown(shutdown)),
            Composed::Absorbing(retry) => Composed::Absorbing(retry.with_shutdown(shutdown)),
        }
    }
}

/// Validate `policy` and build the builder for its variant
pub fn compose(policy: &RetryPolicy) -> Result<Composed> {
    policy.validate()?;

    let retry = match policy.max_attempts {
        Some(max_attempts) => Retry::bounded(max_attempts, policy.backoff()),
        None => Retry::unbounded(policy.backoff()),
    }
    .with_labels(policy.resource_name.as_str(), policy.action_name.as_str())
    .with_correlation(policy.correlation);

    if policy.propagate_on_exhaustion {
        Ok(Composed::Propagating(retry))
    } else {
        Ok(Composed::Absorbing(retry.absorbing()))
    }
}

/// Builder for propagating and unbounded retry
///
/// Defaults: logs through [`TracingObserver`], a shutdown token that is
/// never cancelled, the executable name as service label, and a fresh
/// correlation identifier per call.
#[derive(Clone)]
pub struct Retry {
    max_attempts: Option<u32>,
    backoff: Backoff,
    service: Arc<str>,
    resource: Arc<str>,
    action: Option<Arc<str>>,
    correlation: CorrelationMode,
    observer: Arc<dyn RetryObserver>,
    shutdown: CancellationToken,
}

impl Retry {
    /// At most `max_attempts` attempts (raised to 1 if zero)
    pub fn bounded(max_attempts: u32, backoff: Backoff) -> Self {
        Self::new(Some(max_attempts.max(1)), backoff)
    }

    /// Attempts until success or cancellation
    pub fn unbounded(backoff: Backoff) -> Self {
        Self::new(None, backoff)
    }

    /// Build from a propagating or unbounded policy
    ///
    /// Absorbing policies are rejected; use [`AbsorbingRetry::from_policy`]
    /// or [`compose`].
    pub fn from_policy(policy: &RetryPolicy) -> Result<Self> {
        match compose(policy)? {
            Composed::Propagating(retry) => Ok(retry),
            Composed::Absorbing(_) => Err(Error::invalid_policy(
                "propagate-on-exhaustion",
                "is false; build an absorbing retry instead",
            )),
        }
    }

    fn new(max_attempts: Option<u32>, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
            service: process_name().into(),
            resource: Arc::from("resource"),
            action: None,
            correlation: CorrelationMode::PerCall,
            observer: Arc::new(TracingObserver::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the resource and action labels
    pub fn with_labels(
        mut self,
        resource_name: impl Into<Arc<str>>,
        action_name: impl Into<Arc<str>>,
    ) -> Self {
        self.resource = resource_name.into();
        self.action = Some(action_name.into());
        self
    }

    /// Set the service label
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = service.into();
        self
    }

    /// Set the attempt bound; `None` makes the retry unbounded
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts.map(|n| n.max(1));
        self
    }

    /// Set the backoff
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the observer
    pub fn with_observer<O: RetryObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Set the shutdown token checked before attempts and during waits
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Set the correlation identifier lifetime
    pub fn with_correlation(mut self, correlation: CorrelationMode) -> Self {
        self.correlation = correlation;
        self
    }

    /// Absorb exhaustion instead of propagating it
    pub fn absorbing(self) -> AbsorbingRetry {
        AbsorbingRetry(self)
    }

    /// Attempt bound, `None` when unbounded
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Configured backoff
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Wrap a blocking operation
    pub fn wrap<F>(&self, op: F) -> Retrying<Blocking<F>> {
        self.retrying(Blocking::new(op), type_name::<F>())
    }

    /// Wrap an async operation
    pub fn wrap_async<F>(&self, op: F) -> Retrying<Suspending<F>> {
        self.retrying(Suspending::new(op), type_name::<F>())
    }

    fn retrying<Op>(&self, op: Op, op_name: &'static str) -> Retrying<Op> {
        let name: Cow<'static, str> = match &self.action {
            Some(action) => Cow::Owned(action.to_string()),
            None => Cow::Borrowed(op_name),
        };
        let action = self.action.clone().unwrap_or_else(|| Arc::from(op_name));

        let controller = Controller {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            labels: Labels {
                service: self.service.clone(),
                resource: self.resource.clone(),
                action,
            },
            correlation: Correlation::new(self.correlation),
            observer: self.observer.clone(),
            shutdown: self.shutdown.clone(),
        };

        Retrying {
            op,
            predicate: NeverCancel,
            controller: Arc::new(controller),
            name,
        }
    }
}

/// Builder for bounded retry that absorbs exhaustion
///
/// A call whose attempts are all exhausted returns
/// `Ok(Outcome::Exhausted { .. })`: the failure is logged but never reaches
/// the caller, and no value is produced. Cancellation still surfaces as
/// `Err(RetryError::Cancelled { .. })`.
#[derive(Clone)]
pub struct AbsorbingRetry(Retry);

impl AbsorbingRetry {
    /// Build from an absorbing policy
    pub fn from_policy(policy: &RetryPolicy) -> Result<Self> {
        match compose(policy)? {
            Composed::Absorbing(retry) => Ok(retry),
            Composed::Propagating(_) => Err(Error::invalid_policy(
                "propagate-on-exhaustion",
                "is true or the policy is unbounded; build a propagating retry instead",
            )),
        }
    }

    /// Set the resource and action labels
    pub fn with_labels(
        self,
        resource_name: impl Into<Arc<str>>,
        action_name: impl Into<Arc<str>>,
    ) -> Self {
        Self(self.0.with_labels(resource_name, action_name))
    }

    /// Set the service label
    pub fn with_service(self, service: impl Into<Arc<str>>) -> Self {
        Self(self.0.with_service(service))
    }

    /// Set the observer
    pub fn with_observer<O: RetryObserver + 'static>(self, observer: O) -> Self {
        Self(self.0.with_observer(observer))
    }

    /// Set the shutdown token
    pub fn with_shutdown(self, shutdown: CancellationToken) -> Self {
        Self(self.0.with_shutdown(shutdown))
    }

    /// Set the correlation identifier lifetime
    pub fn with_correlation(self, correlation: CorrelationMode) -> Self {
        Self(self.0.with_correlation(correlation))
    }

    /// Attempt bound
    pub fn max_attempts(&self) -> Option<u32> {
        self.0.max_attempts()
    }

    /// Wrap a blocking operation
    pub fn wrap<F>(&self, op: F) -> Absorbing<Blocking<F>> {
        Absorbing(self.0.wrap(op))
    }

    /// Wrap an async operation
    pub fn wrap_async<F>(&self, op: F) -> Absorbing<Suspending<F>> {
        Absorbing(self.0.wrap_async(op))
    }
}

/// Result of an absorbing call
#[must_use = "an absorbing call may have produced no value"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// An attempt succeeded
    Completed(T),
    /// Every attempt failed; the failure was logged and dropped
    Exhausted {
        /// Number of attempts made
        attempts: u32,
    },
}

impl<T> Outcome<T> {
    /// The value, if an attempt succeeded
    pub fn into_option(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Exhausted { .. } => None,
        }
    }

    /// Whether an attempt succeeded
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    /// Whether every attempt failed
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Outcome::Exhausted { .. })
    }
}

fn absorb<T, E>(
    result: std::result::Result<T, RetryError<E>>,
) -> std::result::Result<Outcome<T>, RetryError<E>> {
    match result {
        Ok(value) => Ok(Outcome::Completed(value)),
        Err(RetryError::Exhausted { attempts, .. }) => Ok(Outcome::Exhausted { attempts }),
        Err(cancelled) => Err(cancelled),
    }
}

/// An operation wrapped in a retry policy
///
/// Cloning shares the policy, including a per-wrap correlation identifier.
pub struct Retrying<Op, P = NeverCancel> {
    op: Op,
    predicate: P,
    controller: Arc<Controller>,
    name: Cow<'static, str>,
}

impl<Op: Clone, P: Clone> Clone for Retrying<Op, P> {
    fn clone(&self) -> Self {
        Self {
            op: self.op.clone(),
            predicate: self.predicate.clone(),
            controller: self.controller.clone(),
            name: self.name.clone(),
        }
    }
}

impl<Op, P> Retrying<Op, P> {
    /// Name of the wrapped operation: the action label, or the operation's
    /// type name when no label was configured
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Correlation identifier lifetime
    pub fn correlation(&self) -> CorrelationMode {
        self.controller.correlation.mode()
    }

    /// Classify some operation errors as cancellation signals
    pub fn cancel_when<P2>(self, predicate: P2) -> Retrying<Op, P2> {
        Retrying {
            op: self.op,
            predicate,
            controller: self.controller,
            name: self.name,
        }
    }
}

impl<F, P> Retrying<Blocking<F>, P> {
    /// Call the operation, blocking the thread through attempts and waits
    pub fn call<A, T, E>(&self, args: A) -> std::result::Result<T, RetryError<E>>
    where
        F: Fn(A) -> std::result::Result<T, E>,
        A: Clone,
        E: Display,
        P: CancelPredicate<E>,
    {
        futures::executor::block_on(self.controller.run(&self.op, &self.predicate, args))
    }
}

impl<F, P> Retrying<Suspending<F>, P> {
    /// Call the operation, suspending only the calling task during waits
    pub async fn call<A, Fut, T, E>(&self, args: A) -> std::result::Result<T, RetryError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        A: Clone,
        E: Display,
        P: CancelPredicate<E>,
    {
        self.controller.run(&self.op, &self.predicate, args).await
    }
}

/// An operation wrapped in an absorbing retry policy
pub struct Absorbing<Op, P = NeverCancel>(Retrying<Op, P>);

impl<Op: Clone, P: Clone> Clone for Absorbing<Op, P> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<Op, P> Absorbing<Op, P> {
    /// Name of the wrapped operation
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Classify some operation errors as cancellation signals
    pub fn cancel_when<P2>(self, predicate: P2) -> Absorbing<Op, P2> {
        Absorbing(self.0.cancel_when(predicate))
    }
}

impl<F, P> Absorbing<Blocking<F>, P> {
    /// Call the operation; exhaustion yields `Outcome::Exhausted`
    pub fn call<A, T, E>(&self, args: A) -> std::result::Result<Outcome<T>, RetryError<E>>
    where
        F: Fn(A) -> std::result::Result<T, E>,
        A: Clone,
        E: Display,
        P: CancelPredicate<E>,
    {
        absorb(self.0.call(args))
    }
}

impl<F, P> Absorbing<Suspending<F>, P> {
    /// Call the operation; exhaustion yields `Outcome::Exhausted`
    pub async fn call<A, Fut, T, E>(
        &self,
        args: A,
    ) -> std::result::Result<Outcome<T>, RetryError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        A: Clone,
        E: Display,
        P: CancelPredicate<E>,
    {
        absorb(self.0.call(args).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conn_retry_defaults() {
        let retry = conn_retry("postgres", "connect");
        assert_eq!(retry.max_attempts(), Some(6));
        assert_eq!(
            retry.backoff(),
            Backoff::exponential(1.0, Duration::from_secs(1), Duration::from_secs(30))
        );
    }

    #[test]
    fn test_func_retry_defaults() {
        assert_eq!(func_retry().max_attempts(), Some(5));
    }

    #[test]
    fn test_continuous_retry_is_unbounded() {
        let retry = continuous_retry(Duration::from_millis(250));
        assert_eq!(retry.max_attempts(), None);
        assert_eq!(retry.backoff(), Backoff::fixed(Duration::from_millis(250)));
    }

    #[test]
    fn test_bounded_zero_raised_to_one() {
        let retry = Retry::bounded(0, Backoff::fixed(Duration::ZERO));
        assert_eq!(retry.max_attempts(), Some(1));
    }

    #[test]
    fn test_compose_selects_variant() {
        assert!(matches!(
            compose(&RetryPolicy::connection("db", "connect")).unwrap(),
            Composed::Propagating(_)
        ));
        assert!(matches!(
            compose(&RetryPolicy::function()).unwrap(),
            Composed::Absorbing(_)
        ));
        assert!(matches!(
            compose(&RetryPolicy::continuous(1.0)).unwrap(),
            Composed::Propagating(ref r) if r.max_attempts().is_none()
        ));
    }

    #[test]
    fn test_compose_rejects_invalid_policy() {
        let policy = RetryPolicy {
            max_attempts: Some(0),
            ..RetryPolicy::default()
        };
        assert!(compose(&policy).is_err());
    }

    #[test]
    fn test_from_policy_checks_variant() {
        assert!(Retry::from_policy(&RetryPolicy::function()).is_err());
        assert!(AbsorbingRetry::from_policy(&RetryPolicy::default()).is_err());
        assert!(AbsorbingRetry::from_policy(&RetryPolicy::function()).is_ok());
    }

    #[test]
    fn test_wrap_does_not_invoke() {
        let wrapped = conn_retry("db", "connect")
            .wrap(|_: ()| -> std::result::Result<(), String> { panic!("invoked at wrap time") });
        assert_eq!(wrapped.name(), "connect");
    }

    #[test]
    fn test_name_falls_back_to_type_name() {
        fn ping(_: ()) -> std::result::Result<(), String> {
            Ok(())
        }

        let wrapped = Retry::bounded(1, Backoff::fixed(Duration::ZERO)).wrap(ping);
        assert!(wrapped.name().contains("ping"), "got {}", wrapped.name());
    }

    #[test]
    fn test_outcome_helpers() {
        let done: Outcome<i32> = Outcome::Completed(7);
        assert!(done.is_completed());
        assert_eq!(done.into_option(), Some(7));

        let lost: Outcome<i32> = Outcome::Exhausted { attempts: 5 };
        assert!(lost.is_exhausted());
        assert_eq!(lost.into_option(), None);
    }
}
