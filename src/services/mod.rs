//! # Service abstractions.
//!
//! This module provides the worker-side types:
//! - [`Service`] - trait every supervised worker implements
//! - [`ServiceState`] - lifecycle states reported by the supervisor
//! - [`HealthTracker`] - consecutive-error counter with restart latch
//! - [`ServiceFactory`] / [`ServiceContext`] - construction with injected state and settings
//! - [`ServiceDescriptor`] - immutable recipe resolved from the service list

mod descriptor;
mod factory;
mod health;
mod service;

pub use descriptor::ServiceDescriptor;
pub(crate) use descriptor::short_name;
pub use factory::{FactoryRef, ServiceContext, ServiceFactory};
pub use health::HealthTracker;
pub use service::{BoxService, Service, ServiceState};
