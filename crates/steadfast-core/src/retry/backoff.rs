//! Backoff calculation
//!
//! Computes the wait inserted before the next attempt. Pure and
//! deterministic: no jitter, no clock.

use std::time::Duration;

/// Wait schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `clamp(multiplier * 2^(attempt - 1), min, max)` seconds
    Exponential {
        /// Scale, in seconds
        multiplier: f64,
        /// Lower clamp
        min: Duration,
        /// Upper clamp
        max: Duration,
    },

    /// The same wait after every failure
    Fixed(Duration),
}

impl Backoff {
    /// Exponential backoff clamped to `[min, max]`
    pub fn exponential(multiplier: f64, min: Duration, max: Duration) -> Self {
        Backoff::Exponential { multiplier, min, max }
    }

    /// Fixed delay
    pub fn fixed(delay: Duration) -> Self {
        Backoff::Fixed(delay)
    }
}

/// Calculate the wait after failed attempt `attempt` (1-indexed)
///
/// When `min` exceeds `max` the upper clamp wins. A non-finite product
/// saturates at `max`.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use steadfast_core::retry::{calculate_delay, Backoff};
///
/// let backoff = Backoff::exponential(1.0, Duration::from_secs(1), Duration::from_secs(30));
///
/// assert_eq!(calculate_delay(&backoff, 1), Duration::from_secs(1));
/// assert_eq!(calculate_delay(&backoff, 2), Duration::from_secs(2));
/// assert_eq!(calculate_delay(&backoff, 6), Duration::from_secs(30));
/// ```
pub fn calculate_delay(backoff: &Backoff, attempt: u32) -> Duration {
    match *backoff {
        Backoff::Fixed(delay) => delay,
        Backoff::Exponential { multiplier, min, max } => {
            let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
            let raw = multiplier * 2f64.powi(exponent);

            let secs = if raw.is_nan() {
                min.as_secs_f64()
            } else {
                raw.max(min.as_secs_f64()).min(max.as_secs_f64())
            };

            Duration::try_from_secs_f64(secs).unwrap_or(max)
        }
    }
}
