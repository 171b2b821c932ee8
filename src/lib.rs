//! # watchkeeper
//!
//! **watchkeeper** is the supervision core for a fixed set of long-lived services
//! running on an embedded device (camera capture, inference, sensors, audio).
//!
//! It provides the lifecycle contract every worker obeys, a watchdog that restarts
//! workers which fail repeatedly, and the shared-state layer that is the only
//! sanctioned way for services to exchange data.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   services.json ──► ServiceRegistry::resolve ──► Resolution { descriptors, skipped }
//!                                                        │
//!                                                        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (watchdog)                                            │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - one SlotActor per descriptor                                   │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐
//!   │ SlotActor│       │ SlotActor│       │ SlotActor│   build → drive → watch health → rebuild
//!   └────┬─────┘       └────┬─────┘       └────┬─────┘
//!        ▼                  ▼                  ▼
//!   svc-<name> thread  svc-<name> thread  svc-<name> thread  one OS thread per instance
//!   runner::drive      runner::drive      runner::drive      iterate / report / idle wait
//!        │                  │                  │
//!        └──────────────────┼──────────────────┘
//!                           ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  SharedState                                                      │
//! │  volatile:  references (SharedQueue, ...)  │ values (voltage, ...)│
//! │  persisted: resilience / settings / metrics (JSON, atomic rename) │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Created ──► Running ◄──► ErrorAccumulating ──► Restarting ──► Running (fresh instance)
//!                │                                   │
//!                └──────────── shutdown ─────────────┴──► Stopped
//! factory failure ──► Dead (slot stays empty, others keep running)
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                              |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------------|
//! | **Services**      | Lifecycle contract and construction.                          | [`Service`], [`ServiceFactory`], [`ServiceContext`] |
//! | **Health**        | Consecutive-error counter with a restart latch.               | [`HealthTracker`]                               |
//! | **Supervision**   | Slots, restarts, escalation and graceful shutdown.            | [`Supervisor`], [`Escalate`]                    |
//! | **Shared state**  | Volatile references/values and persisted counters.            | [`SharedState`], [`SharedQueue`], [`Value`]     |
//! | **Registry**      | Service identifiers to descriptors.                           | [`ServiceRegistry`], [`ServiceList`]            |
//! | **Subscriber API**| Hook into lifecycle events (logging, alerting).               | [`Subscribe`], [`LogWriter`]                    |
//! | **Policies**      | Restart cap and backoff.                                      | [`RestartPolicy`], [`BackoffPolicy`]            |
//! | **Configuration** | Hierarchical settings and supervisor config.                  | [`Settings`], [`SupervisorConfig`]              |
//! | **Errors**        | Typed errors with stable labels.                              | [`StateError`], [`ServiceError`], [`RuntimeError`] |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use watchkeeper::{ServiceList, ServiceRegistry, Settings, SharedState, Supervisor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_yaml_str("services:\n  producer:\n    interval_ms: 10\n")?;
//!     let state = Arc::new(SharedState::bootstrap(watchkeeper::MemoryStorage::new())?);
//!
//!     let mut registry = ServiceRegistry::new();
//!     watchkeeper::demo::register(&mut registry);
//!
//!     let list = ServiceList::from_json_str(r#"{"services": ["demo.producer", "demo.consumer"]}"#)?;
//!     let resolved = registry.resolve(&list.services, &settings);
//!     assert!(resolved.skipped.is_empty());
//!
//!     let sup = Supervisor::builder(SupervisorConfig::from_settings(&settings)?, state).build();
//!     sup.start(resolved.descriptors);
//!
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod policies;
mod registry;
mod services;
mod settings;
mod subscribers;

pub mod demo;
pub mod state;

// ---- Public re-exports ----

pub use config::{EscalationMode, SupervisorConfig};
pub use crate::core::{
    Escalate, EscalationContext, LogEscalation, ShutdownEscalation, Supervisor, SupervisorBuilder,
};
pub use error::{ConfigError, RegistryError, RuntimeError, ServiceError, StateError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, RestartPolicy};
pub use registry::{Resolution, ServiceList, ServiceRegistry};
pub use services::{
    BoxService, FactoryRef, HealthTracker, Service, ServiceContext, ServiceDescriptor,
    ServiceFactory, ServiceState,
};
pub use settings::Settings;
pub use state::{
    JsonFileStorage, Kind, MemoryStorage, PersistedDocument, Reference, SharedQueue, SharedState,
    Storage, Value, Volatile,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
