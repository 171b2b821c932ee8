//! # Event subscribers for the supervisor.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Slot/Supervisor ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet
//!                                                                        │
//!                                                          ┌─────────────┼──────────┐
//!                                                          ▼             ▼          ▼
//!                                                       LogWriter     Custom       ...
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
