//! # Escalation hooks for services that keep failing.
//!
//! When a [`RestartPolicy`](crate::RestartPolicy) cap is set and a slot exceeds it,
//! the slot bumps the persisted `reboot_error_count` and `total_system_restarts`
//! counters, publishes `EventKind::Escalated` and calls the configured [`Escalate`] hook.
//!
//! A slot escalates once, then stays quiet until one of its instances has been
//! up for [`SupervisorConfig::escalation_reset`](crate::SupervisorConfig::escalation_reset).
//!
//! Built-in hooks (selected by `system.escalation`, see [`EscalationMode`]):
//! - [`LogEscalation`] (default): logs at `error`, the slot keeps restarting.
//! - [`ShutdownEscalation`]: requests a graceful shutdown through
//!   [`Supervisor::shutdown_token`](crate::Supervisor::shutdown_token); honored by
//!   [`Supervisor::run`](crate::Supervisor::run). A device watchdog or systemd unit is
//!   expected to bring the process back.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::config::EscalationMode;
use crate::state::SharedState;

/// What the hook gets to look at.
pub struct EscalationContext<'a> {
    /// Short name of the failing service.
    pub service: &'a str,
    /// Lifetime restarts of the slot, including the one that crossed the cap.
    pub restarts: u32,
    /// Configured cap.
    pub max_restarts: u32,
    pub state: &'a SharedState,
    /// Cancelling this token asks `Supervisor::run` to shut down.
    pub shutdown: &'a CancellationToken,
}

/// Decides what happens once a service exceeds its restart cap.
///
/// Called synchronously from the slot actor; must not block.
pub trait Escalate: Send + Sync + 'static {
    fn escalate(&self, ctx: &EscalationContext<'_>);
}

/// Logs the escalation and lets the slot continue restarting.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEscalation;

impl Escalate for LogEscalation {
    fn escalate(&self, ctx: &EscalationContext<'_>) {
        error!(
            service = ctx.service,
            restarts = ctx.restarts,
            max_restarts = ctx.max_restarts,
            "restart cap exceeded, continuing to restart"
        );
    }
}

/// Requests a graceful shutdown of the whole supervisor.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShutdownEscalation;

impl Escalate for ShutdownEscalation {
    fn escalate(&self, ctx: &EscalationContext<'_>) {
        error!(
            service = ctx.service,
            restarts = ctx.restarts,
            max_restarts = ctx.max_restarts,
            "restart cap exceeded, requesting shutdown"
        );
        ctx.shutdown.cancel();
    }
}

impl EscalationMode {
    /// Built-in hook for this mode.
    pub(crate) fn hook(self) -> Arc<dyn Escalate> {
        match self {
            EscalationMode::Log => Arc::new(LogEscalation),
            EscalationMode::Shutdown => Arc::new(ShutdownEscalation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_escalation_cancels_the_request_token() {
        let state = SharedState::in_memory();
        let token = CancellationToken::new();
        let ctx = EscalationContext {
            service: "camera",
            restarts: 4,
            max_restarts: 3,
            state: &state,
            shutdown: &token,
        };

        LogEscalation.escalate(&ctx);
        assert!(!token.is_cancelled());

        ShutdownEscalation.escalate(&ctx);
        assert!(token.is_cancelled());
    }

    #[test]
    fn settings_mode_selects_the_hook() {
        let state = SharedState::in_memory();
        let token = CancellationToken::new();
        let ctx = EscalationContext {
            service: "camera",
            restarts: 2,
            max_restarts: 1,
            state: &state,
            shutdown: &token,
        };

        EscalationMode::Log.hook().escalate(&ctx);
        assert!(!token.is_cancelled());
        EscalationMode::Shutdown.hook().escalate(&ctx);
        assert!(token.is_cancelled());
    }
}
