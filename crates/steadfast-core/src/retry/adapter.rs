//! Operation adapters
//!
//! An [`Adapter`] turns an operation into the two capabilities the retry
//! controller needs: run one attempt, and wait between attempts. The
//! controller is written once against this trait; the adapter decides
//! whether those steps block the calling thread or suspend the calling task.
//!
//! - [`Blocking`] runs `Fn(A) -> Result<T, E>` and sleeps on the thread.
//! - [`Suspending`] runs `Fn(A) -> impl Future<Output = Result<T, E>>` and
//!   sleeps with `tokio::time::sleep`, so other tasks keep running.
//!
//! Both waits end early when the shutdown token is cancelled.

use std::future::{ready, Future};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Granularity at which a blocking wait re-checks the shutdown token
pub const BLOCKING_PAUSE_SLICE: Duration = Duration::from_millis(20);

/// How a wait between attempts ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// The full delay elapsed
    Elapsed,
    /// The shutdown token fired first
    Cancelled,
}

/// Uniform "invoke once" and "wait" contract over an operation
pub trait Adapter<A> {
    /// Success value of the operation
    type Output;
    /// Failure value of the operation
    type Error;

    /// Run the operation once with `args`
    fn attempt(&self, args: A) -> impl Future<Output = Result<Self::Output, Self::Error>>;

    /// Wait for `delay`, or until `shutdown` is cancelled
    fn pause(&self, delay: Duration, shutdown: &CancellationToken) -> impl Future<Output = Pause>;
}

/// Adapter for a blocking operation
///
/// Attempts and waits block the calling thread.
#[derive(Debug, Clone)]
pub struct Blocking<F>(pub F);

impl<F> Blocking<F> {
    /// Wrap a blocking operation
    pub fn new(op: F) -> Self {
        Self(op)
    }
}

impl<A, F, T, E> Adapter<A> for Blocking<F>
where
    F: Fn(A) -> Result<T, E>,
{
    type Output = T;
    type Error = E;

    fn attempt(&self, args: A) -> impl Future<Output = Result<T, E>> {
        ready((self.0)(args))
    }

    fn pause(&self, delay: Duration, shutdown: &CancellationToken) -> impl Future<Output = Pause> {
        ready(sleep_blocking(delay, shutdown))
    }
}

/// Adapter for an async operation
///
/// Attempts and waits suspend only the calling task. Waits require a tokio
/// runtime with the time driver enabled.
#[derive(Debug, Clone)]
pub struct Suspending<F>(pub F);

impl<F> Suspending<F> {
    /// Wrap an async operation
    pub fn new(op: F) -> Self {
        Self(op)
    }
}

impl<A, F, Fut, T, E> Adapter<A> for Suspending<F>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    type Output = T;
    type Error = E;

    fn attempt(&self, args: A) -> impl Future<Output = Result<T, E>> {
        (self.0)(args)
    }

    fn pause(&self, delay: Duration, shutdown: &CancellationToken) -> impl Future<Output = Pause> {
        sleep_suspending(delay, shutdown)
    }
}

/// Block the thread for `delay`, waking every [`BLOCKING_PAUSE_SLICE`] to
/// check `shutdown`
pub fn sleep_blocking(delay: Duration, shutdown: &CancellationToken) -> Pause {
    // None: the deadline is past what Instant can represent
    let deadline = Instant::now().checked_add(delay);

    loop {
        if shutdown.is_cancelled() {
            return Pause::Cancelled;
        }

        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Pause::Elapsed;
                }
                (deadline - now).min(BLOCKING_PAUSE_SLICE)
            }
            None => BLOCKING_PAUSE_SLICE,
        };

        std::thread::sleep(slice);
    }
}

/// Suspend the task for `delay`, or until `shutdown` is cancelled
pub async fn sleep_suspending(delay: Duration, shutdown: &CancellationToken) -> Pause {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Pause::Cancelled,
        _ = tokio::time::sleep(delay) => Pause::Elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::thread;

    #[test]
    fn test_blocking_attempt_passes_args() {
        let adapter = Blocking::new(|(a, b): (i32, i32)| -> Result<i32, String> { Ok(a + b) });

        assert_eq!(block_on(adapter.attempt((2, 3))), Ok(5));
    }

    #[test]
    fn test_blocking_pause_elapses() {
        let token = CancellationToken::new();
        let started = Instant::now();

        assert_eq!(sleep_blocking(Duration::from_millis(30), &token), Pause::Elapsed);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_blocking_pause_zero_delay() {
        let token = CancellationToken::new();
        assert_eq!(sleep_blocking(Duration::ZERO, &token), Pause::Elapsed);
    }

    #[test]
    fn test_blocking_pause_interrupted() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        let started = Instant::now();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        assert_eq!(sleep_blocking(Duration::from_secs(30), &token), Pause::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_blocking_pause_unrepresentable_deadline() {
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(sleep_blocking(Duration::MAX, &token), Pause::Cancelled);
    }

    #[tokio::test]
    async fn test_suspending_attempt() {
        let adapter = Suspending::new(|name: &'static str| async move {
            Ok::<_, String>(format!("hello {}", name))
        });

        assert_eq!(adapter.attempt("db").await, Ok("hello db".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspending_pause_elapses() {
        let token = CancellationToken::new();
        let started = tokio::time::Instant::now();

        assert_eq!(
            sleep_suspending(Duration::from_secs(5), &token).await,
            Pause::Elapsed
        );
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspending_pause_interrupted() {
        let token = CancellationToken::new();
        let canceller = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let started = tokio::time::Instant::now();
        assert_eq!(
            sleep_suspending(Duration::from_secs(3600), &token).await,
            Pause::Cancelled
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspending_pause_lets_other_tasks_run() {
        let token = CancellationToken::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            tx.send("ran during wait").unwrap();
        });

        sleep_suspending(Duration::from_secs(1), &token).await;
        assert_eq!(rx.await.unwrap(), "ran during wait");
    }
}
