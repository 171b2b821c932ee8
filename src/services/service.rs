//! # Service: the lifecycle contract every worker implements.
//!
//! A service does **not** own its loop. The runtime calls [`Service::iterate`]
//! repeatedly while the instance's [`CancellationToken`] is not cancelled, turns
//! the outcome into exactly one health report, and performs the idle wait:
//!
//! ```text
//! while !token.is_cancelled() {
//!     match iterate(&token) {
//!         Ok(())          → report_health()
//!         Err(Canceled)   → leave loop
//!         Err(e) / panic  → log, report_error()
//!     }
//!     wait idle_interval() or cancellation
//! }
//! on_stop()
//! ```
//!
//! Every instance runs on its own OS thread with a single-threaded runtime, so
//! blocking work inside `iterate` (a camera read, an inference call) delays only
//! that service. It does delay that service's reaction to cancellation.
//!
//! Construction happens in a [`ServiceFactory`](crate::ServiceFactory); reference-kind
//! shared-state entries must be fetched there, once, and kept in the struct.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;

/// Lifecycle states of a service slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceState {
    /// Descriptor accepted, instance not running yet.
    Created,
    /// Instance running, no consecutive errors.
    Running,
    /// Instance running with at least one consecutive error.
    ErrorAccumulating,
    /// Old instance being stopped, replacement pending.
    Restarting,
    /// Stopped by supervisor request (terminal).
    Stopped,
    /// Could not be (re)built; the slot stays empty (terminal).
    Dead,
}

impl ServiceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceState::Stopped | ServiceState::Dead)
    }
}

/// # Supervised, restartable worker.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use watchkeeper::{Service, ServiceError};
///
/// struct Heartbeat { beats: u64 }
///
/// #[async_trait]
/// impl Service for Heartbeat {
///     fn name(&self) -> &str { "heartbeat" }
///
///     async fn iterate(&mut self, _ctx: &CancellationToken) -> Result<(), ServiceError> {
///         self.beats += 1;
///         Ok(())
///     }
///
///     fn idle_interval(&self) -> Duration { Duration::from_secs(1) }
/// }
/// ```
#[async_trait]
pub trait Service: Send + 'static {
    /// Stable, human-readable name (used in logs).
    fn name(&self) -> &str;

    /// Runs one bounded unit of work.
    ///
    /// Blocking calls are allowed; they hold only this instance's thread. Any
    /// wait inside must be bounded and should race `ctx` where it can (e.g.
    /// [`SharedQueue::pop`](crate::SharedQueue::pop)). Return
    /// [`ServiceError::Canceled`] to leave the loop early.
    async fn iterate(&mut self, ctx: &CancellationToken) -> Result<(), ServiceError>;

    /// Idle wait after each iteration. Must be non-zero.
    fn idle_interval(&self) -> Duration {
        Duration::from_millis(100)
    }

    /// Called once after the loop exits (release hardware, flush buffers).
    async fn on_stop(&mut self) {}
}

/// Owned, type-erased service instance.
pub type BoxService = Box<dyn Service>;
