//! # Service descriptor: what the supervisor needs to (re)build one service.
//!
//! A descriptor is produced by the [`ServiceRegistry`](crate::ServiceRegistry) from
//! one entry of the service list and never changes afterwards.
//!
//! ```text
//! "demo.producer" ──► ServiceDescriptor { id, name: "producer", factory, settings: services.producer }
//! ```

use std::sync::Arc;

use crate::error::ServiceError;
use crate::services::factory::{FactoryRef, ServiceContext, ServiceFactory};
use crate::services::service::BoxService;
use crate::settings::Settings;
use crate::state::SharedState;

/// Immutable recipe for one supervised service.
#[derive(Clone)]
pub struct ServiceDescriptor {
    id: Arc<str>,
    name: Arc<str>,
    factory: FactoryRef,
    settings: Settings,
}

impl ServiceDescriptor {
    /// Creates a descriptor; the short name is the last `.` or `::` segment of `id`.
    pub fn new(id: impl Into<Arc<str>>, factory: impl ServiceFactory, settings: Settings) -> Self {
        Self::from_ref(id, Arc::new(factory), settings)
    }

    pub fn from_ref(id: impl Into<Arc<str>>, factory: FactoryRef, settings: Settings) -> Self {
        let id: Arc<str> = id.into();
        let name: Arc<str> = short_name(&id).into();
        Self {
            id,
            name,
            factory,
            settings,
        }
    }

    /// Fully-qualified identifier as written in the service list.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Short name used for logs, events and restart counters.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Builds a fresh instance bound to `state` and this descriptor's settings.
    pub fn build(&self, state: &Arc<SharedState>) -> Result<BoxService, ServiceError> {
        let ctx = ServiceContext::new(Arc::clone(&self.name), Arc::clone(state), self.settings.clone());
        self.factory.build(&ctx)
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Last non-empty `.` or `:` segment of a service identifier.
pub(crate) fn short_name(id: &str) -> &str {
    id.rsplit(['.', ':'])
        .find(|seg| !seg.is_empty())
        .unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_takes_last_segment() {
        assert_eq!(short_name("services.sensor_service.SensorService"), "SensorService");
        assert_eq!(short_name("demo::producer"), "producer");
        assert_eq!(short_name("plain"), "plain");
    }
}
