//! # Slot actor: one supervised service, restarted in place.
//!
//! A slot owns one [`ServiceDescriptor`] for the lifetime of the supervisor and
//! keeps exactly one live instance of it at a time.
//!
//! ## Lifecycle
//! ```text
//! loop {
//!   ├─► build instance (factory error/panic → Dead, SlotDead, exit)
//!   ├─► fresh HealthTracker + child token, instance thread running runner::drive
//!   ├─► publish ServiceStarting (and ServiceRestarted after the first)
//!   └─► wait for the first of:
//!         ├─ slot token cancelled     → join instance, Stopped, exit
//!         ├─ health.restart_requested → RestartRequested ─┐
//!         └─ run loop ended by itself → ServiceExited ────┤
//!                                                         ▼
//!              cancel instance token, join ≤ restart_join_timeout (else RestartLeaked)
//!              restarts += 1
//!              cap exceeded and not yet escalated? → persisted counters, Escalated, Escalate hook
//!              backoff > 0?  → BackoffScheduled, sleep (cancellable)
//! }
//! ```
//!
//! ## Rules
//! - A replacement never overlaps a joined predecessor; a leaked one is abandoned
//!   with its token cancelled.
//! - The restart counter is lifetime and never resets.
//! - Escalation latches per slot. It re-arms only after an instance stayed up for
//!   `escalation_reset`, so a permanently broken service writes the persisted
//!   counters once, not once per restart.
//! - Shutdown waits for the instance without a bound here; the supervisor's grace
//!   deadline is the bound.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::core::escalation::{Escalate, EscalationContext};
use crate::core::instance::{self, InstanceExit, InstanceHandle};
use crate::core::runner::RunExit;
use crate::events::{Bus, Event, EventKind};
use crate::services::{BoxService, HealthTracker, ServiceDescriptor, ServiceState};
use crate::state::{SharedState, keys};
use crate::subscribers::panic_message;

/// Slot status shared between the actor and the supervisor's accessors.
#[derive(Debug)]
pub(crate) struct SlotStatus {
    state: Mutex<ServiceState>,
    health: Mutex<Option<Arc<HealthTracker>>>,
    restarts: AtomicU32,
}

impl SlotStatus {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState::Created),
            health: Mutex::new(None),
            restarts: AtomicU32::new(0),
        }
    }

    /// Current state; `Running` with a non-zero error streak reads as `ErrorAccumulating`.
    pub(crate) fn state(&self) -> ServiceState {
        let state = *self.state.lock();
        if state != ServiceState::Running {
            return state;
        }
        match self.health.lock().as_ref() {
            Some(h) if h.consecutive_errors() > 0 => ServiceState::ErrorAccumulating,
            _ => state,
        }
    }

    pub(crate) fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Acquire)
    }

    /// Tracker of the live instance, if any.
    pub(crate) fn health(&self) -> Option<Arc<HealthTracker>> {
        self.health.lock().clone()
    }

    fn set(&self, state: ServiceState) {
        *self.state.lock() = state;
    }

    fn begin_instance(&self, health: Arc<HealthTracker>) {
        *self.health.lock() = Some(health);
        self.set(ServiceState::Running);
    }

    fn end_instance(&self, state: ServiceState) {
        *self.health.lock() = None;
        self.set(state);
    }
}

/// Why the slot is replacing its instance.
enum Cause {
    Sick,
    Exited(String),
}

/// Everything a slot needs besides its descriptor.
#[derive(Clone)]
pub(crate) struct SlotParams {
    pub cfg: Arc<SupervisorConfig>,
    pub state: Arc<SharedState>,
    pub bus: Bus,
    pub escalation: Arc<dyn Escalate>,
    /// Cancelled by `ShutdownEscalation` to ask `Supervisor::run` to stop.
    pub shutdown_request: CancellationToken,
}

pub(crate) struct SlotActor {
    descriptor: ServiceDescriptor,
    params: SlotParams,
    status: Arc<SlotStatus>,
}

impl SlotActor {
    pub(crate) fn new(descriptor: ServiceDescriptor, params: SlotParams, status: Arc<SlotStatus>) -> Self {
        Self {
            descriptor,
            params,
            status,
        }
    }

    fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Runs the slot until `slot_token` is cancelled or the service cannot be built.
    pub(crate) async fn run(self, slot_token: CancellationToken) {
        let mut generation: u32 = 0;
        let mut escalated = false;

        loop {
            if slot_token.is_cancelled() {
                self.status.end_instance(ServiceState::Stopped);
                break;
            }

            let service = match self.build() {
                Ok(service) => service,
                Err(reason) => {
                    error!(service = self.name(), id = self.descriptor.id(), %reason, "failed to build service, slot is dead");
                    self.status.end_instance(ServiceState::Dead);
                    self.params.bus.publish(
                        Event::new(EventKind::SlotDead)
                            .with_service(self.name())
                            .with_reason(reason),
                    );
                    break;
                }
            };

            generation += 1;
            let health = Arc::new(HealthTracker::new(self.params.cfg.threshold()));
            let instance_token = slot_token.child_token();
            self.status.begin_instance(Arc::clone(&health));

            self.params.bus.publish(
                Event::new(EventKind::ServiceStarting)
                    .with_service(self.name())
                    .with_generation(generation),
            );
            if generation > 1 {
                let restarts = self.status.restarts();
                info!(service = self.name(), restarts, "service restarted");
                self.params.bus.publish(
                    Event::new(EventKind::ServiceRestarted)
                        .with_service(self.name())
                        .with_restarts(restarts),
                );
            }

            let started = Instant::now();
            let mut handle = match instance::spawn(
                self.name(),
                service,
                Arc::clone(&health),
                instance_token.clone(),
            ) {
                Ok(handle) => handle,
                Err(e) => {
                    error!(service = self.name(), error = %e, "failed to start instance thread, slot is dead");
                    self.status.end_instance(ServiceState::Dead);
                    self.params.bus.publish(
                        Event::new(EventKind::SlotDead)
                            .with_service(self.name())
                            .with_reason(format!("instance thread: {e}")),
                    );
                    break;
                }
            };

            let cause = tokio::select! {
                biased;
                _ = slot_token.cancelled() => None,
                _ = health.restart_requested() => Some(Cause::Sick),
                exit = handle.wait() => Some(Cause::Exited(describe_exit(exit))),
            };

            let Some(cause) = cause else {
                instance_token.cancel();
                handle.wait().await;
                self.status.end_instance(ServiceState::Stopped);
                self.params.bus.publish(
                    Event::new(EventKind::ServiceStopped)
                        .with_service(self.name())
                        .with_generation(generation),
                );
                break;
            };

            self.status.set(ServiceState::Restarting);
            let joined = match &cause {
                Cause::Sick => {
                    warn!(
                        service = self.name(),
                        errors = health.consecutive_errors(),
                        threshold = health.threshold(),
                        "health threshold reached, restarting service"
                    );
                    self.params.bus.publish(
                        Event::new(EventKind::RestartRequested)
                            .with_service(self.name())
                            .with_generation(generation)
                            .with_reason(format!("{} consecutive errors", health.consecutive_errors())),
                    );
                    false
                }
                Cause::Exited(reason) => {
                    warn!(service = self.name(), %reason, "run loop exited unexpectedly, restarting service");
                    self.params.bus.publish(
                        Event::new(EventKind::ServiceExited)
                            .with_service(self.name())
                            .with_generation(generation)
                            .with_reason(reason.as_str()),
                    );
                    true
                }
            };

            instance_token.cancel();
            if !joined {
                self.join_or_leak(&mut handle).await;
            }

            let restarts = self.status.restarts.fetch_add(1, Ordering::AcqRel) + 1;
            if escalated && started.elapsed() >= self.params.cfg.escalation_reset {
                debug!(service = self.name(), "instance stayed up long enough, escalation re-armed");
                escalated = false;
            }
            if escalated {
                debug!(service = self.name(), restarts, "restart cap still exceeded, already escalated");
            } else {
                escalated = self.check_escalation(restarts);
            }

            let delay = self.params.cfg.restart.backoff.next(restarts - 1);
            if !delay.is_zero() {
                self.params.bus.publish(
                    Event::new(EventKind::BackoffScheduled)
                        .with_service(self.name())
                        .with_delay(delay)
                        .with_restarts(restarts),
                );
                tokio::select! {
                    _ = time::sleep(delay) => {}
                    _ = slot_token.cancelled() => {
                        self.status.end_instance(ServiceState::Stopped);
                        break;
                    }
                }
            }
        }
    }

    /// Builds an instance; factory panics are folded into build errors.
    fn build(&self) -> Result<BoxService, String> {
        let built = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.descriptor.build(&self.params.state)
        }));
        match built {
            Ok(Ok(service)) => Ok(service),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(format!("factory panicked: {}", panic_message(&*panic))),
        }
    }

    /// Waits for a cancelled instance to exit; abandons it after the join timeout.
    async fn join_or_leak(&self, handle: &mut InstanceHandle) {
        let timeout = self.params.cfg.restart_join_timeout;
        if time::timeout(timeout, handle.wait()).await.is_err() {
            error!(
                service = self.name(),
                ?timeout,
                "instance did not stop within the restart join timeout, abandoning it"
            );
            self.params.bus.publish(
                Event::new(EventKind::RestartLeaked)
                    .with_service(self.name())
                    .with_timeout(timeout),
            );
        }
    }

    /// Escalates if the cap is exceeded; returns whether it did.
    fn check_escalation(&self, restarts: u32) -> bool {
        let policy = &self.params.cfg.restart;
        if !policy.exceeded(restarts) {
            return false;
        }
        let state = &self.params.state;
        if let Err(e) = state.increment_resilience(keys::REBOOT_ERROR_COUNT) {
            error!(service = self.name(), error = %e, "failed to record reboot_error_count");
        }
        if let Err(e) = state.increment_metric(keys::TOTAL_SYSTEM_RESTARTS) {
            error!(service = self.name(), error = %e, "failed to record total_system_restarts");
        }
        self.params.bus.publish(
            Event::new(EventKind::Escalated)
                .with_service(self.name())
                .with_restarts(restarts),
        );
        self.params.escalation.escalate(&EscalationContext {
            service: self.name(),
            restarts,
            max_restarts: policy.max_restarts.unwrap_or_default(),
            state,
            shutdown: &self.params.shutdown_request,
        });
        true
    }
}

fn describe_exit(exit: InstanceExit) -> String {
    match exit {
        InstanceExit::Finished(RunExit::Returned) => "service returned Canceled".to_string(),
        InstanceExit::Finished(RunExit::Cancelled) => "instance token cancelled".to_string(),
        InstanceExit::Failed(reason) => reason,
    }
}
