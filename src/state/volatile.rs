//! # Volatile space: reference-kind and value-kind entries.
//!
//! The volatile space is reset on every process run and split by mutability kind:
//!
//! ```text
//! VolatileSpace
//!   ├─ references: key → Reference   (write-once identity, contents mutate internally)
//!   └─ values:     key → Value       (replaced wholesale on every write)
//! ```
//!
//! ## Rules
//! - A key lives in **exactly one** of the two maps (kind tagged at registration).
//! - References are never replaced after registration; `set` on a reference key is rejected.
//! - Values are copied out on read; no caller ever holds a borrow into the map.
//!
//! Locking is done by [`SharedState`](crate::SharedState); this type is plain data.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::StateError;
use crate::state::value::Value;

/// Mutability kind of a volatile key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Concurrency-safe object published once by identity (e.g. a queue).
    Reference,
    /// Immutable scalar snapshot replaced on every update.
    Value,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Reference => f.write_str("reference"),
            Kind::Value => f.write_str("value"),
        }
    }
}

/// Type-erased shared handle to a reference-kind object.
///
/// Cloning a `Reference` clones the `Arc`, so every clone points to the same object.
#[derive(Clone)]
pub struct Reference {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Reference {
    pub fn new<T: Any + Send + Sync>(object: Arc<T>) -> Self {
        Self {
            inner: object,
            type_name: type_name::<T>(),
        }
    }

    /// Returns the typed handle if the object is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    /// True if both handles point to the same object.
    pub fn ptr_eq(&self, other: &Reference) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Name of the concrete type stored behind the handle.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("type", &self.type_name)
            .finish()
    }
}

/// Result of a volatile lookup.
#[derive(Clone, Debug)]
pub enum Volatile {
    /// Current snapshot of a value-kind key.
    Value(Value),
    /// Stable identity of a reference-kind key.
    Reference(Reference),
}

impl Volatile {
    pub fn kind(&self) -> Kind {
        match self {
            Volatile::Value(_) => Kind::Value,
            Volatile::Reference(_) => Kind::Reference,
        }
    }
}

/// In-memory maps behind the volatile lock.
#[derive(Default)]
pub(crate) struct VolatileSpace {
    references: HashMap<String, Reference>,
    values: HashMap<String, Value>,
}

impl VolatileSpace {
    pub(crate) fn kind_of(&self, key: &str) -> Option<Kind> {
        if self.references.contains_key(key) {
            Some(Kind::Reference)
        } else if self.values.contains_key(key) {
            Some(Kind::Value)
        } else {
            None
        }
    }

    pub(crate) fn insert_reference(
        &mut self,
        key: &str,
        reference: Reference,
    ) -> Result<(), StateError> {
        if self.kind_of(key).is_some() {
            return Err(StateError::AlreadyRegistered(key.to_string()));
        }
        self.references.insert(key.to_string(), reference);
        Ok(())
    }

    pub(crate) fn insert_value(&mut self, key: &str, value: Value) -> Result<(), StateError> {
        if self.kind_of(key).is_some() {
            return Err(StateError::AlreadyRegistered(key.to_string()));
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    pub(crate) fn get(&self, key: &str) -> Result<Volatile, StateError> {
        if let Some(r) = self.references.get(key) {
            return Ok(Volatile::Reference(r.clone()));
        }
        self.values
            .get(key)
            .map(|v| Volatile::Value(v.clone()))
            .ok_or_else(|| StateError::KeyNotFound(key.to_string()))
    }

    /// Replaces a value-kind entry. Reference-kind keys are left untouched.
    pub(crate) fn replace_value(&mut self, key: &str, value: Value) -> Result<(), StateError> {
        if self.references.contains_key(key) {
            return Err(StateError::ContractViolation {
                key: key.to_string(),
                reason: "set_volatile on a reference-kind key would orphan its holders",
            });
        }
        match self.values.get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(StateError::KeyNotFound(key.to_string())),
        }
    }

    pub(crate) fn keys(&self) -> Vec<(String, Kind)> {
        let mut keys: Vec<(String, Kind)> = self
            .references
            .keys()
            .map(|k| (k.clone(), Kind::Reference))
            .chain(self.values.keys().map(|k| (k.clone(), Kind::Value)))
            .collect();
        keys.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        keys
    }
}
