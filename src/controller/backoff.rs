//! # Fibonacci Backoff
//!
//! Provides a Fibonacci-based backoff mechanism for reconciliation retries.
//! The backoff grows more slowly than exponential backoff, which suits a
//! controller whose failures are mostly short-lived (conflicts, API hiccups).
//!
//! Values are tracked in milliseconds between a configured minimum and maximum.
//! With the defaults (1s min, 30s max) the sequence is:
//! 1s, 1s, 2s, 3s, 5s, 8s, 13s, 21s, 30s (max).
//!
//! ## Usage
//!
//! ```rust
//! use namespace_replicator::controller::backoff::FibonacciBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = FibonacciBackoff::new(1000, 30_000);
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(3));
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max_ms`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum backoff value in milliseconds (for reset)
    min_ms: u64,
    /// Previous backoff value in milliseconds
    prev_ms: u64,
    /// Current backoff value in milliseconds
    current_ms: u64,
    /// Maximum backoff value in milliseconds
    max_ms: u64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with minimum and maximum values in milliseconds
    ///
    /// A zero minimum is raised to one millisecond so the sequence always grows.
    #[must_use]
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        let min_ms = min_ms.max(1);
        Self {
            min_ms,
            prev_ms: 0,
            current_ms: min_ms,
            max_ms: max_ms.max(min_ms),
        }
    }

    /// Get the next backoff in milliseconds and advance the sequence
    pub fn next_backoff_ms(&mut self) -> u64 {
        let result = self.current_ms;

        let next = self.prev_ms.saturating_add(self.current_ms);
        self.prev_ms = self.current_ms;
        self.current_ms = std::cmp::min(next, self.max_ms);

        result
    }

    /// Get the next backoff duration as a `Duration` and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_millis(self.next_backoff_ms())
    }

    /// Minimum backoff without advancing the sequence
    #[must_use]
    pub fn min_backoff(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    /// Maximum backoff without advancing the sequence
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev_ms = 0;
        self.current_ms = self.min_ms;
    }
}
