//! # Runtime events emitted by the supervisor and service slots.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Service lifecycle**: instance starting, stopped, exited on its own, restarted
//! - **Watchdog**: restart requested, leaked instance, backoff, escalation, dead slot
//! - **Shutdown**: requested, all stopped within grace, grace exceeded
//!
//! The [`Event`] struct carries additional metadata such as timestamps, service
//! name, reasons and restart counters.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use watchkeeper::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RestartRequested)
//!     .with_service("camera")
//!     .with_reason("3 consecutive errors")
//!     .with_restarts(2);
//!
//! assert_eq!(ev.kind, EventKind::RestartRequested);
//! assert_eq!(ev.service.as_deref(), Some("camera"));
//! assert_eq!(ev.restarts, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `service` (subscriber name), `reason` (panic info)
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `service` (subscriber name), `reason`
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown requested (OS signal or explicit request).
    ShutdownRequested,

    /// All services stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; `reason` lists the stuck services.
    GraceExceeded,

    // === Service lifecycle ===
    /// A fresh instance is starting.
    ///
    /// Sets: `service`, `generation` (1 for the boot instance, +1 per restart)
    ServiceStarting,

    /// Instance stopped on supervisor request.
    ///
    /// Sets: `service`, `generation`
    ServiceStopped,

    /// Instance loop ended without being asked to (returned or panicked).
    ///
    /// Sets: `service`, `generation`, `reason`
    ServiceExited,

    /// Replacement instance started.
    ///
    /// Sets: `service`, `restarts` (lifetime restart count of the slot)
    ServiceRestarted,

    // === Watchdog ===
    /// Health threshold breached; the slot will restart the instance.
    ///
    /// Sets: `service`, `generation`, `reason`
    RestartRequested,

    /// Old instance did not exit within the restart join timeout and was abandoned.
    ///
    /// Sets: `service`, `timeout_ms`
    RestartLeaked,

    /// Replacement delayed by backoff.
    ///
    /// Sets: `service`, `delay_ms`, `restarts`
    BackoffScheduled,

    /// Restart cap exceeded; escalation hook invoked.
    ///
    /// Sets: `service`, `restarts`
    Escalated,

    /// Instance could not be built; slot is permanently empty.
    ///
    /// Sets: `service`, `reason`
    SlotDead,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the service (or subscriber), if applicable.
    pub service: Option<Arc<str>>,
    /// Human-readable reason (errors, stuck lists, etc.).
    pub reason: Option<Arc<str>>,
    /// Instance generation within the slot (starting from 1).
    pub generation: Option<u32>,
    /// Lifetime restart count of the slot.
    pub restarts: Option<u32>,
    /// Backoff delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            reason: None,
            generation: None,
            restarts: None,
            delay_ms: None,
            timeout_ms: None,
        }
    }

    /// Attaches a service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_generation(mut self, n: u32) -> Self {
        self.generation = Some(n);
        self
    }

    #[inline]
    pub fn with_restarts(mut self, n: u32) -> Self {
        self.restarts = Some(n);
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_reason(info)
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::ServiceStarting);
        let b = Event::new(EventKind::ServiceStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn durations_are_saturated_to_u32_millis() {
        let ev = Event::new(EventKind::BackoffScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
