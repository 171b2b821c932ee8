//! # Shared state: the only sanctioned shared surface between services.
//!
//! [`SharedState`] is constructed once at startup and handed to every service
//! as `Arc<SharedState>`. It owns two address spaces:
//!
//! ```text
//! SharedState
//!   ├─ volatile  (RwLock)  ── references: key → Arc<T>   register once, fetch at construction
//!   │                      └─ values:     key → Value    get/set many times per second
//!   └─ persisted (Mutex)   ── resilience / persistence_settings / scientific_metrics
//!                             → Storage (JSON, atomic rename)
//! ```
//!
//! ## Rules
//! - Keys are tagged with their [`Kind`] at registration; mismatched access is rejected.
//! - `set_volatile` on a reference key returns [`StateError::ContractViolation`] and logs at
//!   `error`; the published reference is never replaced.
//! - Reference objects (e.g. [`SharedQueue`]) synchronize their own contents;
//!   SharedState only publishes their identity.
//! - Persisted writes flush the whole document and are meant for rare events.

mod persisted;
mod queue;
mod value;
mod volatile;

pub mod keys;

use std::any::{Any, type_name};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::StateError;

pub use persisted::{
    JsonFileStorage, MemoryStorage, Metadata, PersistedDocument, Section, Storage, SystemInfo,
};
pub use queue::SharedQueue;
pub use value::Value;
pub use volatile::{Kind, Reference, Volatile};

use persisted::PersistedStore;
use volatile::VolatileSpace;

/// Process-wide key/value store shared by the supervisor and all services.
pub struct SharedState {
    volatile: RwLock<VolatileSpace>,
    persisted: Mutex<PersistedStore>,
}

impl SharedState {
    /// Creates a state with an empty volatile space over the given storage.
    pub fn new(storage: impl Storage) -> Self {
        Self {
            volatile: RwLock::new(VolatileSpace::default()),
            persisted: Mutex::new(PersistedStore::open(Box::new(storage))),
        }
    }

    /// Creates a state with the default key layout (see [`keys`]) and records the boot time.
    pub fn bootstrap(storage: impl Storage) -> Result<Self, StateError> {
        let state = Self::new(storage);
        state.register_value(keys::VOLTAGE, Value::Float(0.0))?;
        state.register_value(keys::CPU_TEMP, Value::Float(0.0))?;
        state.register_value(keys::PERSON_DETECTED, Value::Bool(false))?;
        state.register_reference(keys::CAMERA_FRAME_QUEUE, Arc::new(SharedQueue::<Value>::new()))?;
        state.persisted.lock().record_boot()?;
        Ok(state)
    }

    /// [`bootstrap`](Self::bootstrap) over a JSON file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        Self::bootstrap(JsonFileStorage::new(path.as_ref()))
    }

    /// Empty state over in-memory storage.
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    // ---------------------------
    // Volatile space
    // ---------------------------

    /// Publishes a reference-kind entry. The identity is fixed from here on.
    pub fn register_reference<T: Any + Send + Sync>(
        &self,
        key: &str,
        object: Arc<T>,
    ) -> Result<(), StateError> {
        self.volatile
            .write()
            .insert_reference(key, Reference::new(object))?;
        tracing::debug!(key, type_name = type_name::<T>(), "registered reference key");
        Ok(())
    }

    /// Publishes a value-kind entry with its initial snapshot.
    pub fn register_value(&self, key: &str, initial: impl Into<Value>) -> Result<(), StateError> {
        self.volatile.write().insert_value(key, initial.into())?;
        tracing::debug!(key, "registered value key");
        Ok(())
    }

    /// Returns the current snapshot (value kind) or the stable identity (reference kind).
    pub fn get_volatile(&self, key: &str) -> Result<Volatile, StateError> {
        self.volatile.read().get(key)
    }

    /// Typed access to a reference-kind key. Fetch once at construction and keep the `Arc`.
    pub fn get_reference<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, StateError> {
        match self.get_volatile(key)? {
            Volatile::Reference(r) => r.downcast::<T>().ok_or_else(|| StateError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            }),
            Volatile::Value(_) => Err(self.violation(key, "get_reference on a value-kind key")),
        }
    }

    /// Typed access to a value-kind key.
    pub fn get_value(&self, key: &str) -> Result<Value, StateError> {
        match self.get_volatile(key)? {
            Volatile::Value(v) => Ok(v),
            Volatile::Reference(_) => Err(self.violation(key, "get_value on a reference-kind key")),
        }
    }

    /// Replaces the snapshot of a value-kind key.
    pub fn set_volatile(&self, key: &str, value: impl Into<Value>) -> Result<(), StateError> {
        let res = self.volatile.write().replace_value(key, value.into());
        if let Err(e) = &res {
            if e.is_contract_violation() {
                tracing::error!(key, error = %e, "shared state contract violation");
            }
        }
        res
    }

    /// Kind of a registered key, `None` if unknown.
    pub fn kind_of(&self, key: &str) -> Option<Kind> {
        self.volatile.read().kind_of(key)
    }

    /// Sorted list of registered volatile keys with their kind.
    pub fn volatile_keys(&self) -> Vec<(String, Kind)> {
        self.volatile.read().keys()
    }

    fn violation(&self, key: &str, reason: &'static str) -> StateError {
        let err = StateError::ContractViolation {
            key: key.to_string(),
            reason,
        };
        tracing::error!(key, error = %err, "shared state contract violation");
        err
    }

    // ---------------------------
    // Persisted space
    // ---------------------------

    /// Writes a metric and flushes the document. Low frequency only.
    pub fn set_metric(&self, key: &str, value: impl Into<Value>) -> Result<(), StateError> {
        self.persisted.lock().set(Section::Metrics, key, value.into())
    }

    /// Writes a resilience counter and flushes the document. Low frequency only.
    pub fn set_resilience(&self, key: &str, value: impl Into<Value>) -> Result<(), StateError> {
        self.persisted.lock().set(Section::Resilience, key, value.into())
    }

    /// Writes a persisted device setting (`persistence_settings`) and flushes the document.
    pub fn set_persisted_setting(&self, key: &str, value: impl Into<Value>) -> Result<(), StateError> {
        self.persisted.lock().set(Section::Settings, key, value.into())
    }

    pub fn get_persisted_setting(&self, key: &str) -> Option<Value> {
        self.persisted.lock().get(Section::Settings, key)
    }

    pub fn get_metric(&self, key: &str) -> Option<Value> {
        self.persisted.lock().get(Section::Metrics, key)
    }

    pub fn get_resilience(&self, key: &str) -> Option<Value> {
        self.persisted.lock().get(Section::Resilience, key)
    }

    /// Adds one to an integer metric under the persisted lock; returns the new count.
    pub fn increment_metric(&self, key: &str) -> Result<i64, StateError> {
        self.persisted.lock().increment(Section::Metrics, key)
    }

    /// Adds one to an integer resilience counter under the persisted lock; returns the new count.
    pub fn increment_resilience(&self, key: &str) -> Result<i64, StateError> {
        self.persisted.lock().increment(Section::Resilience, key)
    }

    /// Copy of the whole persisted document.
    pub fn persisted_snapshot(&self) -> PersistedDocument {
        self.persisted.lock().document().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SharedState {
        SharedState::bootstrap(MemoryStorage::new()).unwrap()
    }

    #[test]
    fn bootstrap_registers_default_layout() {
        let s = state();
        assert_eq!(s.kind_of(keys::VOLTAGE), Some(Kind::Value));
        assert_eq!(s.kind_of(keys::PERSON_DETECTED), Some(Kind::Value));
        assert_eq!(s.kind_of(keys::CAMERA_FRAME_QUEUE), Some(Kind::Reference));
        assert!(s.persisted_snapshot().system_info.last_boot_timestamp.is_some());
    }

    #[test]
    fn unknown_key_is_not_found() {
        let s = state();
        assert!(matches!(
            s.get_volatile("missing"),
            Err(StateError::KeyNotFound(_))
        ));
        assert!(matches!(
            s.set_volatile("missing", 1),
            Err(StateError::KeyNotFound(_))
        ));
    }

    #[test]
    fn reference_identity_is_stable() {
        let s = state();
        let a = s.get_reference::<SharedQueue<Value>>(keys::CAMERA_FRAME_QUEUE).unwrap();
        let b = s.get_reference::<SharedQueue<Value>>(keys::CAMERA_FRAME_QUEUE).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let (Volatile::Reference(r1), Volatile::Reference(r2)) = (
            s.get_volatile(keys::CAMERA_FRAME_QUEUE).unwrap(),
            s.get_volatile(keys::CAMERA_FRAME_QUEUE).unwrap(),
        ) else {
            panic!("expected reference kind");
        };
        assert!(r1.ptr_eq(&r2));
    }

    #[test]
    fn set_volatile_on_reference_is_rejected() {
        let s = state();
        let before = s.get_reference::<SharedQueue<Value>>(keys::CAMERA_FRAME_QUEUE).unwrap();
        before.push(Value::Int(1));

        let err = s.set_volatile(keys::CAMERA_FRAME_QUEUE, 42).unwrap_err();
        assert!(matches!(err, StateError::ContractViolation { .. }));

        let after = s.get_reference::<SharedQueue<Value>>(keys::CAMERA_FRAME_QUEUE).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.len(), 1);
    }

    #[test]
    fn mismatched_typed_access_is_rejected() {
        let s = state();
        assert!(s.get_value(keys::CAMERA_FRAME_QUEUE).unwrap_err().is_contract_violation());
        assert!(s.get_reference::<SharedQueue<Value>>(keys::VOLTAGE).unwrap_err().is_contract_violation());
        assert!(matches!(
            s.get_reference::<SharedQueue<u8>>(keys::CAMERA_FRAME_QUEUE),
            Err(StateError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn value_snapshot_is_replaced_wholesale() {
        let s = state();
        s.set_volatile(keys::VOLTAGE, 12.4).unwrap();
        s.set_volatile(keys::VOLTAGE, 12.6).unwrap();
        assert_eq!(s.get_value(keys::VOLTAGE).unwrap(), Value::Float(12.6));
    }

    #[test]
    fn concurrent_writers_never_tear_values() {
        let s = Arc::new(state());
        s.register_value("pair", "0:0").unwrap();

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let s = Arc::clone(&s);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        s.set_volatile("pair", format!("{t}{i}:{t}{i}")).unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..2_000 {
            let v = s.get_value("pair").unwrap();
            let text = v.as_str().unwrap();
            let (a, b) = text.split_once(':').unwrap();
            assert_eq!(a, b);
        }
        for w in writers {
            w.join().unwrap();
        }
    }

    #[test]
    fn persisted_counters_survive_reopen() {
        let storage = MemoryStorage::new();
        {
            let s = SharedState::bootstrap(storage.clone()).unwrap();
            s.set_resilience(keys::REBOOT_ERROR_COUNT, 5).unwrap();
            s.increment_metric(keys::TOTAL_SYSTEM_RESTARTS).unwrap();
        }
        let reopened = SharedState::bootstrap(storage).unwrap();
        assert_eq!(
            reopened.get_resilience(keys::REBOOT_ERROR_COUNT),
            Some(Value::Int(5))
        );
        assert_eq!(
            reopened.get_metric(keys::TOTAL_SYSTEM_RESTARTS),
            Some(Value::Int(1))
        );
    }

    #[test]
    fn persisted_settings_are_separate_from_counters() {
        let storage = MemoryStorage::new();
        {
            let s = SharedState::bootstrap(storage.clone()).unwrap();
            assert_eq!(
                s.get_persisted_setting(keys::ECO_MODE_ACTIVE),
                Some(Value::Bool(false))
            );
            s.set_persisted_setting(keys::ECO_MODE_ACTIVE, true).unwrap();
            assert_eq!(s.get_resilience(keys::ECO_MODE_ACTIVE), None);
        }
        let reopened = SharedState::bootstrap(storage).unwrap();
        assert_eq!(
            reopened.get_persisted_setting(keys::ECO_MODE_ACTIVE),
            Some(Value::Bool(true))
        );
    }
}
