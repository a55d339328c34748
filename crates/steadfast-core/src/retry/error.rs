//! Error types for the retry controller
//!
//! A wrapped operation surfaces one of two failures: the last error of an
//! exhausted propagating policy, or a cancellation. Both carry the
//! operation's own error value unchanged where one exists.

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Failure surfaced by a wrapped operation
///
/// Generic over `E`, the error type of the wrapped operation.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every permitted attempt failed
    ///
    /// `source` is the error from the final attempt, exactly as the
    /// operation returned it.
    Exhausted {
        /// Number of attempts made
        attempts: u32,
        /// The error from the final attempt
        source: E,
        /// Total duration spent across all attempts and waits
        total_duration: Duration,
    },

    /// The loop stopped on a cancellation signal
    ///
    /// `source` is `Some` when the operation itself reported cancellation and
    /// `None` when the shutdown token fired outside an attempt.
    Cancelled {
        /// Number of attempts made before cancellation
        attempts: u32,
        /// The operation's cancellation error, if it raised one
        source: Option<E>,
    },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => {
                write!(
                    f,
                    "retry exhausted after {} attempts over {:.2}s: {}",
                    attempts,
                    total_duration.as_secs_f64(),
                    source
                )
            }
            RetryError::Cancelled { attempts, source } => {
                if let Some(err) = source {
                    write!(f, "retry cancelled after {} attempts: {}", attempts, err)
                } else {
                    write!(f, "retry cancelled after {} attempts", attempts)
                }
            }
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled {
                source: Some(err), ..
            } => Some(err),
            RetryError::Cancelled { source: None, .. } => None,
        }
    }
}

impl<E> RetryError<E> {
    /// Create a new exhausted error
    pub fn exhausted(attempts: u32, source: E, total_duration: Duration) -> Self {
        RetryError::Exhausted {
            attempts,
            source,
            total_duration,
        }
    }

    /// Create a new cancelled error
    pub fn cancelled(attempts: u32, source: Option<E>) -> Self {
        RetryError::Cancelled { attempts, source }
    }

    /// Get the number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Check if this error indicates all attempts were exhausted
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Check if this error indicates cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// Get the operation's error, consuming this error
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled { source, .. } => source,
        }
    }

    /// Get a reference to the operation's error
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled { source, .. } => source.as_ref(),
        }
    }

    /// Map the error type using a closure
    pub fn map_err<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => RetryError::Exhausted {
                attempts,
                source: f(source),
                total_duration,
            },
            RetryError::Cancelled { attempts, source } => RetryError::Cancelled {
                attempts,
                source: source.map(f),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_exhausted_error() {
        let err: RetryError<io::Error> = RetryError::exhausted(
            3,
            io::Error::new(io::ErrorKind::TimedOut, "timeout"),
            Duration::from_secs(5),
        );

        assert!(err.is_exhausted());
        assert!(!err.is_cancelled());
        assert_eq!(err.attempts(), 3);
    }

    #[test]
    fn test_cancelled_error() {
        let err: RetryError<io::Error> = RetryError::cancelled(2, None);

        assert!(!err.is_exhausted());
        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 2);
        assert!(err.source_ref().is_none());
    }

    #[test]
    fn test_into_source_preserves_value() {
        let err: RetryError<String> =
            RetryError::exhausted(3, "original error".to_string(), Duration::from_secs(1));

        assert_eq!(err.into_source(), Some("original error".to_string()));
    }

    #[test]
    fn test_error_source_chain() {
        let err: RetryError<io::Error> =
            RetryError::cancelled(1, Some(io::Error::new(io::ErrorKind::Interrupted, "stop")));

        let source = Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "stop");
    }

    #[test]
    fn test_map_err() {
        let err: RetryError<i32> = RetryError::exhausted(3, 42, Duration::from_secs(1));

        let mapped = err.map_err(|n| format!("error code: {}", n));
        assert!(
            matches!(mapped, RetryError::Exhausted { source, .. } if source == "error code: 42")
        );
    }

    #[test]
    fn test_display() {
        let err: RetryError<io::Error> = RetryError::exhausted(
            3,
            io::Error::new(io::ErrorKind::TimedOut, "connection timeout"),
            Duration::from_secs(5),
        );

        let display = format!("{}", err);
        assert!(display.contains("retry exhausted"));
        assert!(display.contains("3 attempts"));
        assert!(display.contains("connection timeout"));

        let cancelled: RetryError<io::Error> = RetryError::cancelled(4, None);
        assert_eq!(cancelled.to_string(), "retry cancelled after 4 attempts");
    }
}
