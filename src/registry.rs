//! # ServiceRegistry: service identifiers → descriptors.
//!
//! The registry is a pure catalog: it maps fully-qualified identifiers to
//! factories and, given the configured service list, produces one
//! [`ServiceDescriptor`] per entry with its settings subtree attached.
//!
//! ```text
//! services.json                   ServiceRegistry                       Supervisor::start
//! ["demo.sensor", ──► resolve() ──► [Descriptor(sensor, services.sensor), ──► slot per descriptor
//!  "demo.producer"]                  Descriptor(producer, services.producer)]
//! ```
//!
//! Resolution keeps list order. An unknown identifier or a duplicate short name
//! is logged at `error` and skipped; the remaining entries still resolve, so one
//! typo in the list never keeps the other services from starting. No service is
//! constructed here; construction happens
//! in the supervisor's slots, after [`SharedState::bootstrap`](crate::SharedState::bootstrap)
//! has published every default key.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::RegistryError;
use crate::services::{FactoryRef, ServiceDescriptor, ServiceFactory, short_name};
use crate::settings::Settings;

/// Catalog of known service factories.
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    factories: BTreeMap<String, FactoryRef>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the factory for `id`.
    pub fn register(&mut self, id: impl Into<String>, factory: impl ServiceFactory) -> &mut Self {
        self.factories.insert(id.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Resolves `ids` (in order) into descriptors.
    ///
    /// Each descriptor gets the `services.<short name>` subtree of `settings`.
    /// Entries that cannot be resolved are skipped and reported in
    /// [`Resolution::skipped`].
    pub fn resolve<S: AsRef<str>>(&self, ids: &[S], settings: &Settings) -> Resolution {
        let mut out = Resolution {
            descriptors: Vec::with_capacity(ids.len()),
            skipped: Vec::new(),
        };

        for id in ids {
            let id = id.as_ref();
            let Some(factory) = self.factories.get(id) else {
                out.skip(id, RegistryError::UnknownService(id.to_string()));
                continue;
            };

            let name = short_name(id);
            if out.descriptors.iter().any(|d| d.name() == name) {
                out.skip(id, RegistryError::DuplicateName(name.to_string()));
                continue;
            }

            let subtree = settings.subtree(&format!("services.{name}"));
            debug!(id, service = name, "resolved service");
            out.descriptors
                .push(ServiceDescriptor::from_ref(id, Arc::clone(factory), subtree));
        }
        out
    }
}

/// Outcome of [`ServiceRegistry::resolve`].
#[derive(Debug)]
pub struct Resolution {
    /// Resolved entries, in list order.
    pub descriptors: Vec<ServiceDescriptor>,
    /// Entries that were left out, with the reason.
    pub skipped: Vec<(String, RegistryError)>,
}

impl Resolution {
    fn skip(&mut self, id: &str, reason: RegistryError) {
        error!(id, error = %reason, label = reason.as_label(), "skipping service list entry");
        self.skipped.push((id.to_string(), reason));
    }

    /// Identifiers that were left out.
    pub fn skipped_ids(&self) -> Vec<&str> {
        self.skipped.iter().map(|(id, _)| id.as_str()).collect()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

/// The configured, ordered list of service identifiers.
///
/// ```json
/// { "services": ["demo.sensor", "demo.producer", "demo.consumer"] }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceList {
    pub services: Vec<String>,
}

impl ServiceList {
    pub fn from_json_str(text: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::services::{BoxService, ServiceContext};

    fn unavailable(_: &ServiceContext) -> Result<BoxService, ServiceError> {
        Err(ServiceError::build("not wired in tests"))
    }

    fn registry() -> ServiceRegistry {
        let mut reg = ServiceRegistry::new();
        reg.register("hw.camera", unavailable)
            .register("ai.inference", unavailable)
            .register("other.camera", unavailable);
        reg
    }

    #[test]
    fn resolves_in_list_order_with_settings_subtrees() {
        let settings = Settings::from_yaml_str(
            "services:\n  camera:\n    fps: 15\n  inference:\n    model: tiny\n",
        )
        .unwrap();

        let resolved = registry().resolve(&["ai.inference", "hw.camera"], &settings);
        assert!(resolved.skipped.is_empty());
        let descs = resolved.descriptors;

        let names: Vec<&str> = descs.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["inference", "camera"]);
        assert_eq!(descs[1].id(), "hw.camera");
        assert_eq!(descs[1].settings().get::<u32>("fps").unwrap(), Some(15));
        assert_eq!(
            descs[0].settings().get::<String>("model").unwrap().as_deref(),
            Some("tiny")
        );
    }

    #[test]
    fn unknown_identifier_is_skipped_and_the_rest_resolve() {
        let resolved = registry().resolve(
            &["hw.camera", "hw.lidar_typo", "ai.inference"],
            &Settings::empty(),
        );

        let names: Vec<&str> = resolved.descriptors.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["camera", "inference"]);
        assert_eq!(resolved.skipped_ids(), vec!["hw.lidar_typo"]);
        assert!(matches!(
            resolved.skipped[0].1,
            RegistryError::UnknownService(ref id) if id == "hw.lidar_typo"
        ));
    }

    #[test]
    fn duplicate_short_name_keeps_the_first_entry() {
        let resolved = registry().resolve(&["hw.camera", "other.camera"], &Settings::empty());
        assert_eq!(resolved.descriptors.len(), 1);
        assert_eq!(resolved.descriptors[0].id(), "hw.camera");
        assert_eq!(resolved.skipped_ids(), vec!["other.camera"]);
        assert_eq!(resolved.skipped[0].1.as_label(), "registry_duplicate_name");
    }

    #[test]
    fn service_list_parses_json() {
        let list = ServiceList::from_json_str(r#"{"services": ["demo.sensor", "demo.producer"]}"#)
            .unwrap();
        assert_eq!(list.services, vec!["demo.sensor", "demo.producer"]);
        assert!(ServiceList::from_json_str("[1, 2]").is_err());
    }
}
