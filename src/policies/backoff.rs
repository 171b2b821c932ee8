//! # Backoff policy between restarts.
//!
//! [`BackoffPolicy`] controls how the delay before a replacement instance grows
//! with the number of restarts a service already had. It is parameterized by:
//! - [`BackoffPolicy::first`] the initial delay;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the maximum delay cap.
//!
//! The delay for restart `n` (0-indexed) is `first × factor^n`, clamped to `max`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use watchkeeper::BackoffPolicy;
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(1), Duration::from_millis(200));
//! assert_eq!(backoff.next(10), Duration::from_secs(10));
//! assert_eq!(BackoffPolicy::immediate().next(7), Duration::ZERO);
//! ```

use std::time::Duration;

/// Restart backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// Returns [`BackoffPolicy::immediate`].
    fn default() -> Self {
        Self::immediate()
    }
}

impl BackoffPolicy {
    /// No delay at all.
    pub const fn immediate() -> Self {
        Self {
            first: Duration::ZERO,
            max: Duration::ZERO,
            factor: 1.0,
        }
    }

    /// Exponential growth from `first` doubling up to `max`.
    pub fn exponential(first: Duration, max: Duration) -> Self {
        Self {
            first,
            max,
            factor: 2.0,
        }
    }

    /// Computes the delay for the given restart number (0-indexed).
    ///
    /// # Notes
    /// - If `factor` equals 1.0, delay remains constant at `first` (up to `max`).
    /// - Non-finite or negative intermediate results collapse to `max`.
    pub fn next(&self, restart: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = restart.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_zero_returns_first() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30));
        assert_eq!(policy.next(0), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_growth() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30));
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(2), Duration::from_millis(400));
        assert_eq!(policy.next(3), Duration::from_millis(800));
    }

    #[test]
    fn test_constant_factor() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 1.0,
        };
        for restart in 0..10 {
            assert_eq!(policy.next(restart), Duration::from_millis(500));
        }
    }

    #[test]
    fn test_first_exceeds_max() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(5),
            factor: 2.0,
        };
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_restart_count_is_capped() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(1), Duration::from_secs(60));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(60));
    }
}
