//! # Restart policy for service slots.
//!
//! [`RestartPolicy`] decides what happens once a service has been restarted many times.
//!
//! ```text
//! restarts ≤ max_restarts (or no cap) → rebuild instance after backoff.next(restarts)
//! restarts > max_restarts             → escalate (persisted counters + Escalate hook)
//! ```

use crate::policies::BackoffPolicy;

/// Policy controlling restart escalation and delays.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RestartPolicy {
    /// Restarts allowed per service before escalation (`None` = unlimited).
    pub max_restarts: Option<u32>,
    /// Delay before each replacement instance starts.
    pub backoff: BackoffPolicy,
}

impl RestartPolicy {
    /// Unlimited, immediate restarts.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Escalates after `max` restarts of the same service.
    pub fn capped(max: u32) -> Self {
        Self {
            max_restarts: Some(max),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// True once `restarts` (lifetime count for one service) is above the cap.
    pub fn exceeded(&self, restarts: u32) -> bool {
        self.max_restarts.is_some_and(|max| restarts > max)
    }
}
