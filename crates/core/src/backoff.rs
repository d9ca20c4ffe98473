//! Exponential backoff with jitter.
//!
//! `delay(attempt) = min(base * factor^attempt, max_delay) + jitter`, with the
//! jitter drawn uniformly from `[0, jitter)`.

use std::time::Duration;

use rand::Rng;

/// Retry delay policy. Pure apart from the jitter term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    factor: u32,
    max_delay: Duration,
    jitter: Duration,
}

impl BackoffPolicy {
    pub const fn new(base: Duration, factor: u32, max_delay: Duration, jitter: Duration) -> Self {
        Self { base, factor, max_delay, jitter }
    }

    /// Track used by the store driver between its own reconnects: 1s doubling up to 30s.
    pub const fn store_connect() -> Self {
        Self::new(Duration::from_secs(1), 2, Duration::from_secs(30), Duration::from_secs(1))
    }

    /// Track used by the cache service between scheduled reconnects: 30s doubling up to 5min.
    pub const fn service_reconnect() -> Self {
        Self::new(Duration::from_secs(30), 2, Duration::from_secs(300), Duration::from_secs(1))
    }

    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Deterministic part of the delay, capped at `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(multiplier)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Delay before retry number `attempt` (zero-based), jitter included.
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if self.jitter.is_zero() {
            return delay;
        }
        let jitter_ms = rand::rng().random_range(0..self.jitter.as_millis().max(1) as u64);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::store_connect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_connect_track() {
        let policy = BackoffPolicy::store_connect();
        assert_eq!(policy.base_delay(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay(4), Duration::from_secs(16));
        assert_eq!(policy.base_delay(5), Duration::from_secs(30));
    }

    #[test]
    fn test_service_reconnect_track() {
        let policy = BackoffPolicy::service_reconnect();
        assert_eq!(policy.base_delay(0), Duration::from_secs(30));
        assert_eq!(policy.base_delay(1), Duration::from_secs(60));
        assert_eq!(policy.base_delay(3), Duration::from_secs(240));
        assert_eq!(policy.base_delay(4), Duration::from_secs(300));
    }

    #[test]
    fn test_monotonic_and_capped() {
        for policy in [BackoffPolicy::store_connect(), BackoffPolicy::service_reconnect()] {
            let mut previous = Duration::ZERO;
            for attempt in 0..64 {
                let delay = policy.base_delay(attempt);
                assert!(delay >= previous, "attempt {attempt} went backwards");
                assert!(delay <= policy.max_delay());
                previous = delay;
            }
            assert_eq!(previous, policy.max_delay());
        }
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = BackoffPolicy::store_connect();
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = BackoffPolicy::store_connect();
        for attempt in 0..10 {
            let base = policy.base_delay(attempt);
            let delay = policy.delay(attempt);
            assert!(delay >= base);
            assert!(delay < base + Duration::from_secs(1));
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = BackoffPolicy::service_reconnect().with_jitter(Duration::ZERO);
        assert_eq!(policy.delay(2), Duration::from_secs(120));
    }
}
