//! Back-off strategies decide how long to wait before the next attempt.
//!
//! A strategy is a small state machine around a failure counter. The
//! [`ResilientExecutor`](crate::executor::ResilientExecutor) increments the
//! counter after every failed attempt, resets it after a success, and asks the
//! strategy for the delay before scheduling the next attempt.
//!
//! | Strategy                | Delay after `k ≥ 1` failures      |
//! |-------------------------|-----------------------------------|
//! | [`PolynomialBackoff`]   | `min(base × 2^(k−1), max)`        |
//! | [`LinearBackoff`]       | `min(base × k, max)`              |
//! | [`FixedBackoff`]        | `base`                            |
//!
//! Every strategy returns a delay of `0` while the counter is `0`, so the
//! first attempt of a task always fires immediately.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod fixed;
pub mod linear;
pub mod polynomial;

pub use fixed::FixedBackoff;
pub use linear::LinearBackoff;
pub use polynomial::PolynomialBackoff;

/// Default minimum delay between attempts, in [`TimeUnit`]s.
pub const DEFAULT_BASE_DELAY: u64 = 1;

/// Default ceiling on the computed delay, in [`TimeUnit`]s.
pub const DEFAULT_MAX_DELAY: u64 = 10;

/// Default number of failed attempts tolerated before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// The unit in which a strategy's delay values are interpreted.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use resilex::backoff::TimeUnit;
///
/// assert_eq!(TimeUnit::Seconds.duration(3), Duration::from_secs(3));
/// assert_eq!(TimeUnit::Minutes.duration(2), Duration::from_secs(120));
/// assert_eq!(TimeUnit::default(), TimeUnit::Seconds);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Converts `amount` of this unit into a [`Duration`], saturating at
    /// [`Duration::MAX`] instead of overflowing.
    pub fn duration(self, amount: u64) -> Duration {
        match self {
            Self::Nanoseconds => Duration::from_nanos(amount),
            Self::Microseconds => Duration::from_micros(amount),
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(60 * 60)),
            Self::Days => Duration::from_secs(amount.saturating_mul(24 * 60 * 60)),
        }
    }

    /// Returns the lower-case name of the unit, e.g. `"seconds"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nanoseconds => "nanoseconds",
            Self::Microseconds => "microseconds",
            Self::Milliseconds => "milliseconds",
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The capability set every back-off algorithm provides to the executor.
///
/// Implementations own their failure counter and must keep it consistent
/// under concurrent access: only one attempt of a task is in flight at a
/// time, but successive attempts may run on different scheduler threads.
///
/// # Examples
///
/// ```
/// use resilex::backoff::{BackoffStrategy, PolynomialBackoff, TimeUnit};
///
/// let strategy = PolynomialBackoff::new(3, 20, 5, TimeUnit::Seconds);
/// assert_eq!(strategy.delay(), 0);
///
/// strategy.increment_failures();
/// strategy.increment_failures();
/// assert_eq!(strategy.delay(), 6);
///
/// strategy.reset_failures();
/// assert_eq!(strategy.delay(), 0);
/// ```
pub trait BackoffStrategy: Send + Sync + fmt::Debug {
    /// Delay before the next attempt, in [`time_unit`](Self::time_unit)s.
    ///
    /// Must be `0` when [`failures`](Self::failures) is `0`.
    fn delay(&self) -> u64;

    /// Number of failed attempts tolerated before the task is given up.
    fn max_retries(&self) -> u32;

    /// Records one more failed attempt.
    fn increment_failures(&self);

    /// Current number of consecutive failed attempts.
    fn failures(&self) -> u32;

    /// Clears the failure counter after a successful attempt.
    fn reset_failures(&self);

    /// Returns `true` once the failure counter has reached the retry ceiling.
    fn has_retries_been_exceeded(&self) -> bool {
        self.failures() >= self.max_retries()
    }

    /// The unit in which [`delay`](Self::delay) is expressed.
    fn time_unit(&self) -> TimeUnit;

    /// [`delay`](Self::delay) converted to a [`Duration`].
    fn next_delay(&self) -> Duration {
        self.time_unit().duration(self.delay())
    }

    /// Short, stable name used in log records.
    fn name(&self) -> &'static str;
}

// Keeps `max_delay >= base_delay` and ignores a base delay below one unit.
pub(crate) fn sanitize(base_delay: u64, max_delay: u64) -> (u64, u64) {
    let base = if base_delay >= 1 {
        base_delay
    } else {
        tracing::debug!(
            base_delay,
            default = DEFAULT_BASE_DELAY,
            "ignoring base delay below one unit"
        );
        DEFAULT_BASE_DELAY
    };
    (base, max_delay.max(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_unit_converts_every_unit() {
        assert_eq!(TimeUnit::Nanoseconds.duration(5), Duration::from_nanos(5));
        assert_eq!(TimeUnit::Microseconds.duration(5), Duration::from_micros(5));
        assert_eq!(TimeUnit::Milliseconds.duration(5), Duration::from_millis(5));
        assert_eq!(TimeUnit::Seconds.duration(5), Duration::from_secs(5));
        assert_eq!(TimeUnit::Minutes.duration(5), Duration::from_secs(300));
        assert_eq!(TimeUnit::Hours.duration(1), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Days.duration(1), Duration::from_secs(86_400));
    }

    #[test]
    fn time_unit_saturates_instead_of_overflowing() {
        let d = TimeUnit::Days.duration(u64::MAX);
        assert_eq!(d, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn time_unit_display_is_lowercase() {
        assert_eq!(TimeUnit::Milliseconds.to_string(), "milliseconds");
        assert_eq!(TimeUnit::Seconds.to_string(), "seconds");
    }

    #[test]
    fn time_unit_serde_uses_lowercase_names() {
        let unit: TimeUnit = serde_json::from_str("\"minutes\"").unwrap();
        assert_eq!(unit, TimeUnit::Minutes);
        assert_eq!(
            serde_json::to_string(&TimeUnit::Hours).unwrap(),
            "\"hours\""
        );
    }

    #[test]
    fn sanitize_keeps_valid_values() {
        assert_eq!(sanitize(3, 20), (3, 20));
    }

    #[test]
    fn sanitize_ignores_zero_base_delay() {
        assert_eq!(sanitize(0, 20), (DEFAULT_BASE_DELAY, 20));
    }

    #[test]
    fn sanitize_raises_max_delay_to_base() {
        assert_eq!(sanitize(5, 2), (5, 5));
    }
}
