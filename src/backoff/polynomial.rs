//! Doubling back-off with a ceiling. This is the default strategy.

use std::sync::atomic::{AtomicU32, Ordering};

use super::{
    BackoffStrategy, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, TimeUnit,
    sanitize,
};
use crate::config::BackoffConfig;

/// Back-off whose delay doubles with every consecutive failure, up to a ceiling.
///
/// After `k ≥ 1` failures the delay is `min(base_delay × 2^(k−1), max_delay)`;
/// with no failures it is `0`. With `base_delay = 3` and `max_delay = 20` the
/// delays after 1, 2, 3 and 4 failures are 3, 6, 12 and 20.
///
/// The computation saturates, so very large failure counts simply stay at
/// `max_delay`.
#[derive(Debug)]
pub struct PolynomialBackoff {
    failures: AtomicU32,
    base_delay: u64,
    max_delay: u64,
    max_retries: u32,
    time_unit: TimeUnit,
}

impl PolynomialBackoff {
    /// Creates a strategy from explicit settings.
    ///
    /// A `base_delay` below one unit is ignored in favour of the default, and
    /// a `max_delay` below `base_delay` is raised to it.
    pub fn new(base_delay: u64, max_delay: u64, max_retries: u32, time_unit: TimeUnit) -> Self {
        let (base_delay, max_delay) = sanitize(base_delay, max_delay);
        tracing::debug!(
            base_delay,
            max_delay,
            max_retries,
            unit = %time_unit,
            "using polynomial back-off"
        );
        Self {
            failures: AtomicU32::new(0),
            base_delay,
            max_delay,
            max_retries,
            time_unit,
        }
    }

    /// Creates a strategy from a [`BackoffConfig`].
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            config.base_delay,
            config.max_delay,
            config.max_retries,
            config.time_unit,
        )
    }

    pub fn base_delay(&self) -> u64 {
        self.base_delay
    }

    pub fn max_delay(&self) -> u64 {
        self.max_delay
    }
}

impl Default for PolynomialBackoff {
    fn default() -> Self {
        Self::new(
            DEFAULT_BASE_DELAY,
            DEFAULT_MAX_DELAY,
            DEFAULT_MAX_RETRIES,
            TimeUnit::default(),
        )
    }
}

impl BackoffStrategy for PolynomialBackoff {
    fn delay(&self) -> u64 {
        let failures = self.failures();
        if failures == 0 {
            return 0;
        }
        let factor = 1u64.checked_shl(failures - 1).unwrap_or(u64::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn increment_failures(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    fn reset_failures(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    fn name(&self) -> &'static str {
        "polynomial"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn failed(strategy: &PolynomialBackoff, times: u32) {
        for _ in 0..times {
            strategy.increment_failures();
        }
    }

    #[test]
    fn first_attempt_has_no_delay() {
        let s = PolynomialBackoff::default();
        assert_eq!(s.failures(), 0);
        assert_eq!(s.delay(), 0);
        assert_eq!(s.next_delay(), Duration::ZERO);
    }

    #[test]
    fn defaults_double_from_one_second() {
        let s = PolynomialBackoff::default();
        failed(&s, 2);
        assert_eq!(s.delay(), 2);
        s.increment_failures();
        assert_eq!(s.delay(), 4);
        assert_eq!(s.max_retries(), DEFAULT_MAX_RETRIES);
        assert_eq!(s.time_unit(), TimeUnit::Seconds);
    }

    #[test]
    fn unbounded_ceiling_doubles_each_failure() {
        let s = PolynomialBackoff::new(1, u64::MAX, 10, TimeUnit::Seconds);
        let delays: Vec<u64> = (0..3)
            .map(|_| {
                s.increment_failures();
                s.delay()
            })
            .collect();
        assert_eq!(delays, vec![1, 2, 4]);
    }

    #[test]
    fn configured_delays_are_capped_and_ceiling_trips_at_max_retries() {
        let s = PolynomialBackoff::new(3, 20, 5, TimeUnit::Seconds);
        assert!(!s.has_retries_been_exceeded());

        let mut delays = Vec::new();
        for _ in 0..4 {
            s.increment_failures();
            delays.push(s.delay());
        }
        assert_eq!(delays, vec![3, 6, 12, 20]);
        assert!(!s.has_retries_been_exceeded());

        s.increment_failures();
        assert!(s.has_retries_been_exceeded());
        assert_eq!(s.delay(), 20);
    }

    #[test]
    fn reset_returns_to_zero_delay() {
        let s = PolynomialBackoff::new(3, 20, 5, TimeUnit::Seconds);
        failed(&s, 4);
        s.reset_failures();
        assert_eq!(s.failures(), 0);
        assert_eq!(s.delay(), 0);
        assert!(!s.has_retries_been_exceeded());
    }

    #[test]
    fn huge_failure_counts_saturate_at_max_delay() {
        let s = PolynomialBackoff::new(7, 1_000, 200, TimeUnit::Milliseconds);
        failed(&s, 100);
        assert_eq!(s.delay(), 1_000);
        assert_eq!(s.next_delay(), Duration::from_millis(1_000));
    }

    #[test]
    fn zero_base_delay_keeps_default() {
        let s = PolynomialBackoff::new(0, 20, 5, TimeUnit::Seconds);
        assert_eq!(s.base_delay(), DEFAULT_BASE_DELAY);
        s.increment_failures();
        assert_eq!(s.delay(), DEFAULT_BASE_DELAY);
    }

    #[test]
    fn zero_max_retries_is_exceeded_after_first_failure() {
        let s = PolynomialBackoff::new(1, 10, 0, TimeUnit::Seconds);
        assert!(s.has_retries_been_exceeded());
        s.increment_failures();
        assert!(s.has_retries_been_exceeded());
    }

    #[test]
    fn counter_is_consistent_across_threads() {
        let s = Arc::new(PolynomialBackoff::default());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&s);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.increment_failures();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(s.failures(), 800);
    }

    #[test]
    fn from_config_uses_every_field() {
        let config = BackoffConfig {
            base_delay: 2,
            max_delay: 30,
            max_retries: 4,
            time_unit: TimeUnit::Milliseconds,
        };
        let s = PolynomialBackoff::from_config(&config);
        assert_eq!(s.base_delay(), 2);
        assert_eq!(s.max_delay(), 30);
        assert_eq!(s.max_retries(), 4);
        assert_eq!(s.time_unit(), TimeUnit::Milliseconds);
        assert_eq!(s.name(), "polynomial");
    }
}
