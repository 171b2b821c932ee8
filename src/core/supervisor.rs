//! # Supervisor: owns the service slots, event fan-out and graceful shutdown.
//!
//! The [`Supervisor`] owns the event bus, a [`SubscriberSet`], the shared state handle
//! and one slot actor per started [`ServiceDescriptor`]. It is the watchdog: slots
//! watch their instance's [`HealthTracker`](crate::HealthTracker) and rebuild it
//! from the descriptor when it turns sick or its loop dies.
//!
//! ## High-level architecture
//! ```text
//! Inputs to start():
//!   Vec<ServiceDescriptor> (registry order)
//!
//! Spawn slots:
//!   Descriptor[0]  Descriptor[1]  ...  Descriptor[N-1]
//!        │              │                    │
//!        └──► SlotActor::new(descriptor, params, status)
//!                 └──► slot token = runtime_token.child_token()
//!                      tokio::spawn(slot.run(slot_token))
//!                           └──► instance token = slot_token.child_token()
//!                                thread "svc-<name>": block_on(runner::drive(instance, health, token))
//!
//! Event flow:
//!   SlotActor ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet::emit(&Event)
//!
//! Shutdown path (shutdown()):
//!   Bus.publish(ShutdownRequested)
//!   runtime_token.cancel()        → propagates to every slot and instance
//!   join every slot against one deadline = now + cfg.grace
//!      ├─ all joined     → Bus.publish(AllStoppedWithin), Ok(())
//!      └─ some still up  → Bus.publish(GraceExceeded), Err(GraceExceeded { grace, stuck })
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use watchkeeper::{
//!     BoxService, Service, ServiceContext, ServiceDescriptor, ServiceError, Settings,
//!     SharedState, Supervisor, SupervisorConfig,
//! };
//!
//! struct Ticker;
//!
//! #[async_trait]
//! impl Service for Ticker {
//!     fn name(&self) -> &str { "ticker" }
//!     async fn iterate(&mut self, _ctx: &CancellationToken) -> Result<(), ServiceError> { Ok(()) }
//!     fn idle_interval(&self) -> Duration { Duration::from_millis(10) }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = Arc::new(SharedState::in_memory());
//!     let sup = Supervisor::builder(SupervisorConfig::default(), state).build();
//!
//!     let ticker = |_: &ServiceContext| -> Result<BoxService, ServiceError> { Ok(Box::new(Ticker)) };
//!     sup.start(vec![ServiceDescriptor::new("demo.ticker", ticker, Settings::empty())]);
//!
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SupervisorConfig;
use crate::core::builder::SupervisorBuilder;
use crate::core::shutdown;
use crate::core::slot::{SlotActor, SlotParams, SlotStatus};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::services::{ServiceDescriptor, ServiceState};
use crate::state::SharedState;
use crate::subscribers::SubscriberSet;

/// Handle to a running slot actor.
struct Slot {
    name: Arc<str>,
    status: Arc<SlotStatus>,
    /// Taken by `shutdown()`.
    join: Option<JoinHandle<()>>,
}

/// Coordinates service slots, event delivery (via [`SubscriberSet`]), and graceful shutdown.
pub struct Supervisor {
    params: SlotParams,
    subs: Arc<SubscriberSet>,
    runtime_token: CancellationToken,
    slots: Mutex<Vec<Slot>>,
}

impl Supervisor {
    /// Starts building a supervisor over `state`.
    pub fn builder(cfg: SupervisorConfig, state: Arc<SharedState>) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg, state)
    }

    pub(crate) fn new_internal(params: SlotParams, subs: Arc<SubscriberSet>) -> Self {
        Self {
            params,
            subs,
            runtime_token: CancellationToken::new(),
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &SupervisorConfig {
        &self.params.cfg
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.params.state
    }

    /// Event bus; subscribe to observe slot decisions directly.
    pub fn bus(&self) -> &Bus {
        &self.params.bus
    }

    /// Token that asks [`run`](Self::run) to shut down when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.params.shutdown_request.clone()
    }

    /// Spawns one slot per descriptor, in list order.
    ///
    /// A descriptor whose name is already supervised is logged and skipped.
    /// Returns the number of slots started.
    pub fn start(&self, descriptors: Vec<ServiceDescriptor>) -> usize {
        let mut slots = self.slots.lock();
        let mut started = 0;

        for descriptor in descriptors {
            if slots.iter().any(|s| &*s.name == descriptor.name()) {
                error!(
                    service = descriptor.name(),
                    id = descriptor.id(),
                    "duplicate service name, skipping"
                );
                continue;
            }

            let name: Arc<str> = descriptor.name().into();
            let status = Arc::new(SlotStatus::new());
            let actor = SlotActor::new(descriptor, self.params.clone(), Arc::clone(&status));
            let join = tokio::spawn(actor.run(self.runtime_token.child_token()));

            info!(service = %name, "service slot started");
            slots.push(Slot {
                name,
                status,
                join: Some(join),
            });
            started += 1;
        }
        started
    }

    /// Starts `descriptors`, waits for a termination signal or [`shutdown_token`](Self::shutdown_token),
    /// then shuts down gracefully.
    pub async fn run(&self, descriptors: Vec<ServiceDescriptor>) -> Result<(), RuntimeError> {
        self.start(descriptors);

        let request = self.params.shutdown_request.clone();
        tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => match res {
                Ok(()) => info!("termination signal received"),
                Err(e) => {
                    error!(error = %e, "failed to install signal handlers, shutting down");
                    self.shutdown().await?;
                    return Err(RuntimeError::Signal(e));
                }
            },
            _ = request.cancelled() => info!("shutdown requested"),
        }
        self.shutdown().await
    }

    /// Cancels every slot and waits for them with one shared deadline of `cfg.grace`.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] listing the services that were still
    /// running at the deadline; those are abandoned and control returns to the caller.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.params.bus.publish(Event::new(EventKind::ShutdownRequested));
        info!(grace = ?self.params.cfg.grace, "shutting down services");
        self.runtime_token.cancel();

        let pending: Vec<(Arc<str>, JoinHandle<()>)> = {
            let mut slots = self.slots.lock();
            slots
                .iter_mut()
                .filter_map(|s| s.join.take().map(|j| (Arc::clone(&s.name), j)))
                .collect()
        };

        let grace = self.params.cfg.grace;
        let deadline = Instant::now() + grace;
        let mut stuck = Vec::new();

        for (name, mut join) in pending {
            match time::timeout_at(deadline, &mut join).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(service = %name, error = %e, "slot actor ended abnormally"),
                Err(_) if join.is_finished() => {}
                Err(_) => stuck.push(name.to_string()),
            }
        }

        if stuck.is_empty() {
            info!("all services stopped within grace");
            self.params.bus.publish(Event::new(EventKind::AllStoppedWithin));
            return Ok(());
        }

        error!(?grace, stuck = ?stuck, "services did not stop within grace");
        self.params.bus.publish(
            Event::new(EventKind::GraceExceeded).with_reason(stuck.join(", ")),
        );
        Err(RuntimeError::GraceExceeded { grace, stuck })
    }

    /// Lifetime restart count of a service, `None` for unknown names.
    pub fn restart_count(&self, name: &str) -> Option<u32> {
        self.slots
            .lock()
            .iter()
            .find(|s| &*s.name == name)
            .map(|s| s.status.restarts())
    }

    /// Restart counts of all slots, in start order.
    pub fn restart_counts(&self) -> Vec<(String, u32)> {
        self.slots
            .lock()
            .iter()
            .map(|s| (s.name.to_string(), s.status.restarts()))
            .collect()
    }

    /// Lifecycle state of all slots, in start order.
    pub fn states(&self) -> Vec<(String, ServiceState)> {
        self.slots
            .lock()
            .iter()
            .map(|s| (s.name.to_string(), s.status.state()))
            .collect()
    }

    pub fn state_of(&self, name: &str) -> Option<ServiceState> {
        self.slots
            .lock()
            .iter()
            .find(|s| &*s.name == name)
            .map(|s| s.status.state())
    }

    /// Consecutive errors of the live instance of `name`, if it has one.
    pub fn consecutive_errors(&self, name: &str) -> Option<u32> {
        self.slots
            .lock()
            .iter()
            .find(|s| &*s.name == name)
            .and_then(|s| s.status.health())
            .map(|h| h.consecutive_errors())
    }

    /// Names of all supervised services, in start order.
    pub fn names(&self) -> Vec<String> {
        self.slots.lock().iter().map(|s| s.name.to_string()).collect()
    }

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    pub(crate) fn subscriber_listener(&self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.params.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}
