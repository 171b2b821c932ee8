//! # Persisted space: durable, low-frequency counters.
//!
//! The persisted space is a single JSON document with three writable sections:
//!
//! ```json
//! {
//!   "system_info": { "first_install_date": "...", "last_boot_timestamp": "...", "total_uptime_hours": 0 },
//!   "resilience": { "maintenance_mode_active": false, "reboot_error_count": 0 },
//!   "persistence_settings": { "eco_mode_active": false },
//!   "scientific_metrics": { "total_people_assisted": 0, "total_system_restarts": 0 },
//!   "metadata": { "version": "2.0", "last_updated": "..." }
//! }
//! ```
//!
//! ## Rules
//! - Every write flushes the **whole** document (full overwrite, last-writer-wins).
//! - Writes are meant for rare, significant events; storage may be flash with limited wear.
//! - A missing document starts from defaults; a corrupted one is logged and replaced by defaults.
//! - Keys this crate does not know (top-level or inside `system_info`/`metadata`) are kept
//!   and written back unchanged.
//! - [`JsonFileStorage`] writes to a temp file, syncs it, then renames it over the target.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::state::keys;
use crate::state::value::Value;

/// Version written into `metadata.version`.
pub const DOCUMENT_VERSION: &str = "2.0";

/// Writable sections of the persisted document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    /// Watchdog/recovery counters (`reboot_error_count`, ...).
    Resilience,
    /// Long-term metrics (`total_system_restarts`, ...).
    Metrics,
    /// Persisted device settings (`eco_mode_active`, ...).
    Settings,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    #[serde(default)]
    pub first_install_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_boot_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_uptime_hours: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub version: String,
    #[serde(default, alias = "lastUpdated")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            last_updated: None,
            extra: BTreeMap::new(),
        }
    }
}

/// The durable document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedDocument {
    #[serde(default)]
    pub system_info: SystemInfo,
    #[serde(default)]
    pub resilience: BTreeMap<String, Value>,
    #[serde(default = "default_persistence_settings")]
    pub persistence_settings: BTreeMap<String, Value>,
    #[serde(default)]
    pub scientific_metrics: BTreeMap<String, Value>,
    #[serde(default)]
    pub metadata: Metadata,
    /// Top-level sections written by other tools.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_persistence_settings() -> BTreeMap<String, Value> {
    BTreeMap::from([(keys::ECO_MODE_ACTIVE.to_string(), Value::Bool(false))])
}

impl Default for PersistedDocument {
    fn default() -> Self {
        let resilience = BTreeMap::from([
            (keys::MAINTENANCE_MODE_ACTIVE.to_string(), Value::Bool(false)),
            (keys::REBOOT_ERROR_COUNT.to_string(), Value::Int(0)),
        ]);
        let scientific_metrics = BTreeMap::from([
            (keys::TOTAL_PEOPLE_ASSISTED.to_string(), Value::Int(0)),
            (keys::TOTAL_SYSTEM_RESTARTS.to_string(), Value::Int(0)),
        ]);
        Self {
            system_info: SystemInfo {
                first_install_date: Some(Utc::now()),
                ..SystemInfo::default()
            },
            resilience,
            persistence_settings: default_persistence_settings(),
            scientific_metrics,
            metadata: Metadata::default(),
            extra: BTreeMap::new(),
        }
    }
}

impl PersistedDocument {
    fn section(&self, section: Section) -> &BTreeMap<String, Value> {
        match section {
            Section::Resilience => &self.resilience,
            Section::Metrics => &self.scientific_metrics,
            Section::Settings => &self.persistence_settings,
        }
    }

    fn section_mut(&mut self, section: Section) -> &mut BTreeMap<String, Value> {
        match section {
            Section::Resilience => &mut self.resilience,
            Section::Metrics => &mut self.scientific_metrics,
            Section::Settings => &mut self.persistence_settings,
        }
    }
}

/// Durable backend for the persisted document.
///
/// Implementations move opaque text; decoding and fallback live in [`PersistedStore`].
pub trait Storage: Send + Sync + 'static {
    /// Returns the stored document, or `None` if nothing was stored yet.
    fn load(&self) -> Result<Option<String>, StateError>;

    /// Replaces the stored document.
    fn store(&self, contents: &str) -> Result<(), StateError>;

    /// Human-readable location (for logs).
    fn describe(&self) -> String;
}

/// JSON file on disk.
#[derive(Clone, Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for JsonFileStorage {
    fn load(&self) -> Result<Option<String>, StateError> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, contents: &str) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory storage; clones share the same buffer, so a "restarted" state
/// built over a clone sees what the previous one flushed.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    contents: Arc<Mutex<Option<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the buffer with raw text (e.g. to simulate a corrupted file).
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Arc::new(Mutex::new(Some(contents.into()))),
        }
    }

    /// Raw text of the last flush.
    pub fn contents(&self) -> Option<String> {
        self.contents.lock().clone()
    }
}

impl Storage for MemoryStorage {
    fn load(&self) -> Result<Option<String>, StateError> {
        Ok(self.contents.lock().clone())
    }

    fn store(&self, contents: &str) -> Result<(), StateError> {
        *self.contents.lock() = Some(contents.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Document plus its storage handle. Guarded by the persisted lock in `SharedState`.
pub(crate) struct PersistedStore {
    storage: Box<dyn Storage>,
    doc: PersistedDocument,
}

impl PersistedStore {
    /// Loads the document; never fails, falls back to defaults.
    pub(crate) fn open(storage: Box<dyn Storage>) -> Self {
        let doc = match storage.load() {
            Ok(Some(text)) => match serde_json::from_str::<PersistedDocument>(&text) {
                Ok(doc) => {
                    tracing::info!(location = %storage.describe(), "loaded persisted state");
                    doc
                }
                Err(e) => {
                    tracing::error!(
                        location = %storage.describe(),
                        error = %e,
                        "corrupted persisted state, using defaults"
                    );
                    PersistedDocument::default()
                }
            },
            Ok(None) => {
                tracing::info!(location = %storage.describe(), "no persisted state found, using defaults");
                PersistedDocument::default()
            }
            Err(e) => {
                tracing::error!(
                    location = %storage.describe(),
                    error = %e,
                    "persisted state unreadable, using defaults"
                );
                PersistedDocument::default()
            }
        };
        Self { storage, doc }
    }

    pub(crate) fn get(&self, section: Section, key: &str) -> Option<Value> {
        self.doc.section(section).get(key).cloned()
    }

    pub(crate) fn set(&mut self, section: Section, key: &str, value: Value) -> Result<(), StateError> {
        self.doc.section_mut(section).insert(key.to_string(), value);
        self.flush()
    }

    /// Adds one to an integer counter (absent counts as 0) and flushes once.
    pub(crate) fn increment(&mut self, section: Section, key: &str) -> Result<i64, StateError> {
        let current = match self.doc.section(section).get(key) {
            None | Some(Value::Null) => 0,
            Some(Value::Int(n)) => *n,
            Some(_) => return Err(StateError::NotACounter(key.to_string())),
        };
        let next = current.saturating_add(1);
        self.doc
            .section_mut(section)
            .insert(key.to_string(), Value::Int(next));
        self.flush()?;
        Ok(next)
    }

    pub(crate) fn record_boot(&mut self) -> Result<(), StateError> {
        self.doc.system_info.last_boot_timestamp = Some(Utc::now());
        self.flush()
    }

    pub(crate) fn document(&self) -> &PersistedDocument {
        &self.doc
    }

    fn flush(&mut self) -> Result<(), StateError> {
        self.doc.metadata.last_updated = Some(Utc::now());
        let text = serde_json::to_string_pretty(&self.doc)?;
        self.storage.store(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_document_starts_from_defaults() {
        let store = PersistedStore::open(Box::new(MemoryStorage::new()));
        assert_eq!(
            store.get(Section::Resilience, keys::REBOOT_ERROR_COUNT),
            Some(Value::Int(0))
        );
        assert_eq!(
            store.get(Section::Metrics, keys::TOTAL_SYSTEM_RESTARTS),
            Some(Value::Int(0))
        );
    }

    #[test]
    fn corrupted_document_falls_back_to_defaults() {
        let storage = MemoryStorage::with_contents("{ not json");
        let store = PersistedStore::open(Box::new(storage));
        assert_eq!(
            store.get(Section::Resilience, keys::MAINTENANCE_MODE_ACTIVE),
            Some(Value::Bool(false))
        );
    }

    #[test]
    fn every_write_flushes_full_document() {
        let storage = MemoryStorage::new();
        let mut store = PersistedStore::open(Box::new(storage.clone()));
        store
            .set(Section::Metrics, keys::TOTAL_PEOPLE_ASSISTED, Value::Int(3))
            .unwrap();

        let flushed: PersistedDocument =
            serde_json::from_str(&storage.contents().unwrap()).unwrap();
        assert_eq!(
            flushed.scientific_metrics[keys::TOTAL_PEOPLE_ASSISTED],
            Value::Int(3)
        );
        assert_eq!(flushed.resilience[keys::REBOOT_ERROR_COUNT], Value::Int(0));
        assert!(flushed.metadata.last_updated.is_some());
    }

    #[test]
    fn increment_rejects_non_integer_counters() {
        let mut store = PersistedStore::open(Box::new(MemoryStorage::new()));
        assert_eq!(store.increment(Section::Resilience, "fresh").unwrap(), 1);
        assert_eq!(store.increment(Section::Resilience, "fresh").unwrap(), 2);

        let err = store
            .increment(Section::Resilience, keys::MAINTENANCE_MODE_ACTIVE)
            .unwrap_err();
        assert!(matches!(err, StateError::NotACounter(_)));
    }

    #[test]
    fn fields_written_by_older_layouts_survive_a_flush() {
        let older = r#"{
            "system_info": {
                "first_install_date": "2026-01-11T00:00:00Z",
                "last_boot_timestamp": null,
                "total_uptime_hours": 12
            },
            "resilience": { "maintenance_mode_active": false, "reboot_error_count": 2 },
            "persistence_settings": { "eco_mode_active": true },
            "scientific_metrics": { "total_people_assisted": 7, "total_system_restarts": 1 },
            "metadata": { "version": "2.0", "lastUpdated": "2026-02-03T00:00:00Z", "author": "field team" },
            "calibration": { "offset": 3 }
        }"#;
        let storage = MemoryStorage::with_contents(older);
        let mut store = PersistedStore::open(Box::new(storage.clone()));
        assert_eq!(
            store.get(Section::Settings, keys::ECO_MODE_ACTIVE),
            Some(Value::Bool(true))
        );

        store.record_boot().unwrap();

        let flushed: serde_json::Value = serde_json::from_str(&storage.contents().unwrap()).unwrap();
        assert_eq!(flushed["persistence_settings"]["eco_mode_active"], true);
        assert_eq!(flushed["system_info"]["total_uptime_hours"], 12.0);
        assert_eq!(flushed["metadata"]["author"], "field team");
        assert_eq!(flushed["calibration"]["offset"], 3);
        assert_eq!(flushed["resilience"]["reboot_error_count"], 2);
    }

    #[test]
    fn defaults_include_persistence_settings() {
        let store = PersistedStore::open(Box::new(MemoryStorage::new()));
        assert_eq!(
            store.get(Section::Settings, keys::ECO_MODE_ACTIVE),
            Some(Value::Bool(false))
        );
        assert_eq!(store.document().system_info.total_uptime_hours, 0.0);
    }

    #[test]
    fn file_storage_round_trips_through_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("system_state.json");
        let storage = JsonFileStorage::new(&path);

        assert!(storage.load().unwrap().is_none());
        storage.store("{}").unwrap();
        assert_eq!(storage.load().unwrap().as_deref(), Some("{}"));
        assert!(!path.with_extension("tmp").exists());
    }
}
