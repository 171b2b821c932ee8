//! Restart policies.
//!
//! This module groups the knobs that control **how often** a failing service may
//! be restarted and **how long** to wait before the replacement starts.
//!
//! ## Contents
//! - [`RestartPolicy`] restart cap (unlimited by default) plus backoff
//! - [`BackoffPolicy`] how restart delays evolve (first / factor / max)
//!
//! ## Quick wiring
//! ```text
//! SupervisorConfig { restart: RestartPolicy { max_restarts, backoff }, .. }
//!      └─► core::slot::SlotActor uses:
//!           - max_restarts to decide when to escalate
//!           - backoff.next(restarts) to delay the replacement instance
//! ```
//!
//! ## Defaults
//! - `max_restarts = None`: restart forever, the device is expected to run unattended.
//! - `BackoffPolicy::immediate()`: the replacement starts right away.
//!
//! With both defaults a permanently broken dependency (e.g. unplugged camera)
//! restarts its service every `threshold` iterations forever. Set a cap and/or a
//! growing backoff to bound that.

mod backoff;
mod restart;

pub use backoff::BackoffPolicy;
pub use restart::RestartPolicy;
