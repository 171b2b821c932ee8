//! # Hierarchical settings injected read-only into services.
//!
//! [`Settings`] wraps a YAML document and answers dotted key paths:
//!
//! ```rust
//! use watchkeeper::Settings;
//!
//! let s = Settings::from_yaml_str("hardware:\n  audio:\n    volume: 70\n").unwrap();
//! assert_eq!(s.get::<u32>("hardware.audio.volume").unwrap(), Some(70));
//! assert_eq!(s.subtree("hardware.audio").get::<u32>("volume").unwrap(), Some(70));
//! ```
//!
//! Cloning is cheap (the document is behind an `Arc`), so each service can keep its own handle.

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_yaml::Value as Yaml;

use crate::error::ConfigError;

/// Read-only view over a hierarchical settings document.
#[derive(Clone, Debug)]
pub struct Settings {
    root: Arc<Yaml>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::empty()
    }
}

impl Settings {
    /// Settings with no keys at all.
    pub fn empty() -> Self {
        Self {
            root: Arc::new(Yaml::Mapping(Default::default())),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let root: Yaml = serde_yaml::from_str(text)?;
        // an empty file parses as null
        let root = if root.is_null() {
            Yaml::Mapping(Default::default())
        } else {
            root
        };
        Ok(Self {
            root: Arc::new(root),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    fn lookup(&self, path: &str) -> Option<&Yaml> {
        path.split('.')
            .filter(|seg| !seg.is_empty())
            .try_fold(self.root.as_ref(), |node, seg| node.get(seg))
    }

    /// Decodes the value at `path`. Missing keys give `Ok(None)`.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ConfigError> {
        match self.lookup(path) {
            None | Some(Yaml::Null) => Ok(None),
            Some(node) => serde_yaml::from_value(node.clone())
                .map(Some)
                .map_err(|e| ConfigError::Invalid {
                    path: path.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Like [`get`](Self::get) with a fallback for missing keys.
    pub fn get_or<T: DeserializeOwned>(&self, path: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get(path)?.unwrap_or(default))
    }

    /// Settings rooted at `path`; empty if the path does not exist.
    pub fn subtree(&self, path: &str) -> Settings {
        match self.lookup(path) {
            Some(node) => Settings {
                root: Arc::new(node.clone()),
            },
            None => Settings::empty(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }
}
