use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::escalation::Escalate;
use super::slot::SlotParams;
use super::supervisor::Supervisor;
use crate::{
    config::SupervisorConfig,
    events::Bus,
    state::SharedState,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a Supervisor with optional features.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    state: Arc<SharedState>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    escalation: Option<Arc<dyn Escalate>>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration and shared state.
    pub fn new(cfg: SupervisorConfig, state: Arc<SharedState>) -> Self {
        Self {
            cfg,
            state,
            subscribers: Vec::new(),
            escalation: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (service lifecycle, restarts, shutdown)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets the hook called when a service exceeds its restart cap.
    ///
    /// Default: the hook named by [`SupervisorConfig::escalation`]. Has no effect
    /// while restarts are unlimited.
    pub fn with_escalation(mut self, escalation: impl Escalate) -> Self {
        self.escalation = Some(Arc::new(escalation));
        self
    }

    /// Builds and returns the Supervisor instance.
    ///
    /// Spawns the subscriber workers, so it must run inside a tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let escalation = self
            .escalation
            .unwrap_or_else(|| self.cfg.escalation.hook());

        let params = SlotParams {
            cfg: Arc::new(self.cfg),
            state: self.state,
            bus,
            escalation,
            shutdown_request: CancellationToken::new(),
        };

        let sup = Arc::new(Supervisor::new_internal(params, subs));
        sup.subscriber_listener();
        sup
    }
}
