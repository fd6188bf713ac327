//! Constant back-off.

use std::sync::atomic::{AtomicU32, Ordering};

use super::{BackoffStrategy, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES, TimeUnit, sanitize};
use crate::config::BackoffConfig;

/// Waits the same `delay` before every retry.
#[derive(Debug)]
pub struct FixedBackoff {
    failures: AtomicU32,
    delay: u64,
    max_retries: u32,
    time_unit: TimeUnit,
}

impl FixedBackoff {
    pub fn new(delay: u64, max_retries: u32, time_unit: TimeUnit) -> Self {
        let (delay, _) = sanitize(delay, delay);
        Self {
            failures: AtomicU32::new(0),
            delay,
            max_retries,
            time_unit,
        }
    }

    /// `max_delay` is not used by this strategy.
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.base_delay, config.max_retries, config.time_unit)
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES, TimeUnit::default())
    }
}

impl BackoffStrategy for FixedBackoff {
    fn delay(&self) -> u64 {
        if self.failures() == 0 { 0 } else { self.delay }
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
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_constant_after_first_failure() {
        let s = FixedBackoff::new(5, 3, TimeUnit::Milliseconds);
        assert_eq!(s.delay(), 0);
        for _ in 0..3 {
            s.increment_failures();
            assert_eq!(s.delay(), 5);
        }
        assert!(s.has_retries_been_exceeded());
    }

    #[test]
    fn reset_clears_delay() {
        let s = FixedBackoff::default();
        s.increment_failures();
        s.reset_failures();
        assert_eq!(s.delay(), 0);
    }
}
