//! Runtime core: supervision and lifecycle.
//!
//! The public API from this module is [`Supervisor`] (with its builder) and the
//! escalation hooks. Internal modules:
//! - [`runner`]: drives one service instance (iterate, health reports, idle wait, `on_stop`);
//! - [`instance`]: runs that loop on a dedicated thread with its own runtime;
//! - [`slot`]: supervises one descriptor, restarting its instance when it turns sick or dies;
//! - [`supervisor`]: owns the slots, event fan-out and graceful shutdown;
//! - [`escalation`]: what happens past the restart cap;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod escalation;
mod instance;
mod runner;
mod shutdown;
mod slot;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use escalation::{Escalate, EscalationContext, LogEscalation, ShutdownEscalation};
pub use supervisor::Supervisor;
