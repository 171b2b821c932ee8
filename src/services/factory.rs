//! # Service construction: context and factories.
//!
//! A [`ServiceFactory`] builds a fresh [`Service`] instance from a [`ServiceContext`].
//! The supervisor calls it once at boot and once per restart, so a factory must be
//! repeatable and must not hand out shared mutable state except through
//! [`SharedState`].
//!
//! Closures are factories too:
//!
//! ```rust
//! use watchkeeper::{BoxService, ServiceContext, ServiceError, ServiceFactory};
//!
//! fn build(_ctx: &ServiceContext) -> Result<BoxService, ServiceError> {
//!     Err(ServiceError::build("camera not connected"))
//! }
//! let factory: &dyn ServiceFactory = &build;
//! # let _ = factory;
//! ```

use std::sync::Arc;

use crate::error::ServiceError;
use crate::services::service::BoxService;
use crate::settings::Settings;
use crate::state::SharedState;

/// Everything a service may depend on at construction.
#[derive(Clone)]
pub struct ServiceContext {
    name: Arc<str>,
    state: Arc<SharedState>,
    settings: Settings,
}

impl ServiceContext {
    pub fn new(name: impl Into<Arc<str>>, state: Arc<SharedState>, settings: Settings) -> Self {
        Self {
            name: name.into(),
            state,
            settings,
        }
    }

    /// Short name of the service slot being built.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared state handle; clone it into the service if the loop needs value-kind access.
    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// The service's own configuration subtree (read-only).
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Builds service instances.
pub trait ServiceFactory: Send + Sync + 'static {
    fn build(&self, ctx: &ServiceContext) -> Result<BoxService, ServiceError>;
}

impl<F> ServiceFactory for F
where
    F: Fn(&ServiceContext) -> Result<BoxService, ServiceError> + Send + Sync + 'static,
{
    fn build(&self, ctx: &ServiceContext) -> Result<BoxService, ServiceError> {
        (self)(ctx)
    }
}

/// Shared handle to a factory.
pub type FactoryRef = Arc<dyn ServiceFactory>;
