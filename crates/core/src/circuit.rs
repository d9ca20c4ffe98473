//! Circuit breaker over store reconnection.
//!
//! Counts consecutive failed connects. Once the budget is spent the breaker
//! opens and stays open until [`CircuitBreaker::reset`] is called.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; reconnects are scheduled.
    Closed,
    /// Permanently disabled until reactivated.
    Open,
}

/// Outcome of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Budget remains; `attempt` failures so far.
    Retry { attempt: u32 },
    /// The breaker just opened (or was already open).
    Tripped { attempts: u32 },
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    max_failures: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32) -> Self {
        Self { max_failures, inner: Mutex::new(Inner { state: CircuitState::Closed, failures: 0, opened_at: None }) }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn failures(&self) -> u32 {
        self.inner.lock().failures
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().opened_at
    }

    pub fn record_success(&self) {
        self.inner.lock().failures = 0;
    }

    pub fn record_failure(&self) -> Verdict {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Open {
            return Verdict::Tripped { attempts: inner.failures };
        }

        inner.failures = inner.failures.saturating_add(1);
        if inner.failures >= self.max_failures {
            Self::open(&mut inner);
            Verdict::Tripped { attempts: inner.failures }
        } else {
            Verdict::Retry { attempt: inner.failures }
        }
    }

    /// Open immediately, spending whatever budget is left.
    pub fn trip(&self) -> Verdict {
        let mut inner = self.inner.lock();
        inner.failures = inner.failures.max(self.max_failures);
        Self::open(&mut inner);
        Verdict::Tripped { attempts: inner.failures }
    }

    /// Close the breaker and clear the failure count.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    fn open(inner: &mut Inner) {
        if inner.state != CircuitState::Open {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_when_budget_spent() {
        let breaker = CircuitBreaker::new(3);
        assert_eq!(breaker.record_failure(), Verdict::Retry { attempt: 1 });
        assert_eq!(breaker.record_failure(), Verdict::Retry { attempt: 2 });
        assert_eq!(breaker.record_failure(), Verdict::Tripped { attempts: 3 });
        assert!(breaker.is_open());
        assert!(breaker.opened_at().is_some());
    }

    #[test]
    fn test_open_is_sticky() {
        let breaker = CircuitBreaker::new(1);
        breaker.record_failure();
        breaker.record_success();
        assert!(breaker.is_open());
        assert_eq!(breaker.record_failure(), Verdict::Tripped { attempts: 1 });
    }

    #[test]
    fn test_success_clears_failures() {
        let breaker = CircuitBreaker::new(3);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failures(), 0);
        assert_eq!(breaker.record_failure(), Verdict::Retry { attempt: 1 });
    }

    #[test]
    fn test_trip_spends_budget() {
        let breaker = CircuitBreaker::new(3);
        breaker.record_failure();
        assert_eq!(breaker.trip(), Verdict::Tripped { attempts: 3 });
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_reset_closes() {
        let breaker = CircuitBreaker::new(2);
        breaker.trip();
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failures(), 0);
        assert!(breaker.opened_at().is_none());
    }
}
