//! # HealthTracker: consecutive-error counter with a restart latch.
//!
//! One tracker belongs to one service instance. Only that instance's run loop
//! mutates it; the owning slot waits on [`HealthTracker::restart_requested`].
//!
//! ```text
//! report_health()  → consecutive_errors = 0
//! report_error()   → consecutive_errors += 1
//!                    └─ reaches threshold → latch restart flag (once) → notify slot
//! ```
//!
//! ## Rules
//! - A single transient error never restarts a service.
//! - The restart signal is raised **at most once** per tracker; a replacement
//!   instance gets a fresh tracker starting at 0.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::sync::Notify;

/// Per-instance consecutive-error counter driving restart decisions.
#[derive(Debug)]
pub struct HealthTracker {
    consecutive_errors: AtomicU32,
    threshold: u32,
    restart_needed: AtomicBool,
    notify: Notify,
}

impl HealthTracker {
    /// Creates a tracker; `threshold` is clamped to a minimum of 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_errors: AtomicU32::new(0),
            threshold: threshold.max(1),
            restart_needed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Marks the last iteration as successful. Idempotent.
    pub fn report_health(&self) {
        self.consecutive_errors.store(0, Ordering::Release);
    }

    /// Records a failed iteration.
    ///
    /// Returns `true` only for the call that raised the restart signal.
    pub fn report_error(&self) -> bool {
        let errors = self
            .consecutive_errors
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1);
        if errors < self.threshold {
            return false;
        }
        let first = !self.restart_needed.swap(true, Ordering::AcqRel);
        if first {
            self.notify.notify_one();
        }
        first
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::Acquire)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_restart_requested(&self) -> bool {
        self.restart_needed.load(Ordering::Acquire)
    }

    /// Resolves once the restart signal has been raised.
    pub async fn restart_requested(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_restart_requested() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn threshold_errors_raise_exactly_one_signal() {
        let h = HealthTracker::new(3);
        let raised: Vec<bool> = (0..3).map(|_| h.report_error()).collect();
        assert_eq!(raised, vec![false, false, true]);
        assert!(h.is_restart_requested());

        // further errors keep counting but do not signal again
        assert!(!h.report_error());
        assert_eq!(h.consecutive_errors(), 4);
    }

    #[test]
    fn one_below_threshold_raises_nothing() {
        let h = HealthTracker::new(3);
        h.report_error();
        h.report_error();
        assert!(!h.is_restart_requested());
        assert_eq!(h.consecutive_errors(), 2);
    }

    #[test]
    fn health_between_errors_prevents_restart() {
        let h = HealthTracker::new(3);
        for _ in 0..2 {
            h.report_error();
            h.report_health();
        }
        h.report_error();
        assert!(!h.is_restart_requested());
        assert_eq!(h.consecutive_errors(), 1);
    }

    #[test]
    fn report_health_is_idempotent() {
        let h = HealthTracker::new(3);
        h.report_health();
        h.report_health();
        assert_eq!(h.consecutive_errors(), 0);
    }

    #[test]
    fn zero_threshold_is_clamped() {
        let h = HealthTracker::new(0);
        assert_eq!(h.threshold(), 1);
        assert!(h.report_error());
    }

    #[tokio::test]
    async fn waiter_wakes_when_threshold_is_reached() {
        let h = Arc::new(HealthTracker::new(2));
        let waiter = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.restart_requested().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.report_error();
        h.report_error();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn signal_raised_before_waiting_is_not_lost() {
        let h = HealthTracker::new(1);
        h.report_error();
        tokio::time::timeout(Duration::from_millis(100), h.restart_requested())
            .await
            .expect("latched signal resolves immediately");
    }
}
