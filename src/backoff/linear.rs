//! Linearly growing back-off.

use std::sync::atomic::{AtomicU32, Ordering};

use super::{
    BackoffStrategy, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, TimeUnit,
    sanitize,
};
use crate::config::BackoffConfig;

/// Adds `base_delay` to the wait for every consecutive failure, up to
/// `max_delay`.
#[derive(Debug)]
pub struct LinearBackoff {
    failures: AtomicU32,
    base_delay: u64,
    max_delay: u64,
    max_retries: u32,
    time_unit: TimeUnit,
}

impl LinearBackoff {
    pub fn new(base_delay: u64, max_delay: u64, max_retries: u32, time_unit: TimeUnit) -> Self {
        let (base_delay, max_delay) = sanitize(base_delay, max_delay);
        Self {
            failures: AtomicU32::new(0),
            base_delay,
            max_delay,
            max_retries,
            time_unit,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            config.base_delay,
            config.max_delay,
            config.max_retries,
            config.time_unit,
        )
    }
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self::new(
            DEFAULT_BASE_DELAY,
            DEFAULT_MAX_DELAY,
            DEFAULT_MAX_RETRIES,
            TimeUnit::default(),
        )
    }
}

impl BackoffStrategy for LinearBackoff {
    fn delay(&self) -> u64 {
        self.base_delay
            .saturating_mul(u64::from(self.failures()))
            .min(self.max_delay)
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
        "linear"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_by_base_and_caps() {
        let s = LinearBackoff::new(4, 10, 5, TimeUnit::Seconds);
        assert_eq!(s.delay(), 0);
        let delays: Vec<u64> = (0..4)
            .map(|_| {
                s.increment_failures();
                s.delay()
            })
            .collect();
        assert_eq!(delays, vec![4, 8, 10, 10]);
    }

    #[test]
    fn ceiling_matches_max_retries() {
        let s = LinearBackoff::new(1, 10, 2, TimeUnit::Seconds);
        s.increment_failures();
        assert!(!s.has_retries_been_exceeded());
        s.increment_failures();
        assert!(s.has_retries_been_exceeded());
    }
}
