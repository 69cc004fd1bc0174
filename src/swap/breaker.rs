//! Failure Circuit Breaker: stop routing to the hub after repeated failures
//!
//! Purpose:
//!     A systemically broken hub path should not be retried forever. Every
//!     terminal swap failure that counts (see `SwapError::counts_against_breaker`)
//!     bumps the counter; once it reaches `max_failures` the quote engine stops
//!     issuing requests and the arbiter forces the DEX route.
//!
//! Created: 2026-10-04
//!
//! Design:
//!     - Counter is monotonic for the process lifetime; success does not reset it
//!     - Only `reset()` (explicit operator action) or a restart clears it
//!     - max_failures = 0 disables the breaker

use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};

#[derive(Debug)]
pub struct FailureCircuitBreaker {
    failures: AtomicU32,
    max_failures: u32,
}

impl FailureCircuitBreaker {
    pub fn new(max_failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(0),
            max_failures,
        }
    }

    /// Record a terminal failure, returns the new count
    pub fn record_failure(&self) -> u32 {
        let count = self.failures.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if self.max_failures > 0 && count == self.max_failures {
            warn!(
                "Circuit breaker OPEN: {} swap failures (max {}) - hub routing disabled",
                count, self.max_failures
            );
        } else {
            info!("Swap failure recorded: {}/{}", count, self.max_failures);
        }
        count
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// True once the failure budget is spent
    pub fn is_tripped(&self) -> bool {
        self.max_failures > 0 && self.failures() >= self.max_failures
    }

    pub fn reset(&self) {
        let previous = self.failures.swap(0, Ordering::SeqCst);
        if previous > 0 {
            info!("Circuit breaker reset ({} failures cleared)", previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_initially() {
        let breaker = FailureCircuitBreaker::new(3);
        assert!(!breaker.is_tripped());
        assert_eq!(breaker.failures(), 0);
    }

    #[test]
    fn test_trips_at_max() {
        let breaker = FailureCircuitBreaker::new(3);
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_tripped());
        assert_eq!(breaker.record_failure(), 3);
        assert!(breaker.is_tripped());

        // Stays open, counter keeps growing
        breaker.record_failure();
        assert!(breaker.is_tripped());
        assert_eq!(breaker.failures(), 4);
    }

    #[test]
    fn test_reset_closes() {
        let breaker = FailureCircuitBreaker::new(1);
        breaker.record_failure();
        assert!(breaker.is_tripped());
        breaker.reset();
        assert!(!breaker.is_tripped());
    }

    #[test]
    fn test_disabled_when_zero() {
        let breaker = FailureCircuitBreaker::new(0);
        for _ in 0..10 {
            breaker.record_failure();
        }
        assert!(!breaker.is_tripped());
    }
}
