//! # Event subscriber trait.
//!
//! Provides [`Subscribe`], the extension point for plugging custom event handlers into the
//! supervisor (dashboards, alerting, audit trails).
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as `EventKind::SubscriberPanicked`)
//!
//! ## Architecture
//! ```text
//! SubscriberSet ──► [bounded queue] ──► worker task ──► subscriber.on_event()
//!                                    └─► panic caught → EventKind::SubscriberPanicked
//! ```
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - Queue overflow drops the event **for this subscriber only** and publishes
//!   `EventKind::SubscriberOverflow`; other subscribers are unaffected.
//! - Events are processed sequentially (FIFO) per subscriber.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use watchkeeper::{Event, EventKind, Subscribe};
//!
//! struct RestartAlarm;
//!
//! #[async_trait]
//! impl Subscribe for RestartAlarm {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::Escalated) {
//!             // page someone
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "restart-alarm" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for supervisor observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Slow processing affects only this subscriber's queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, not in the publisher context.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in logs and overflow/panic events.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose; override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to a minimum of 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
