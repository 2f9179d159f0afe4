//! # Persistence Module
//!
//! ## Why This Module Exists
//! The bridge is configured through a flat string-keyed store, the same shape
//! a plugin host hands to its integrations. Every setting, including the JSON
//! sensor list, is a string under a fixed key. This module defines that
//! boundary and the two stores that ship with the crate.
//!
//! ## Key Abstractions
//! - **[`SettingsStore`]**: `get`, `set` and `remove` by key. Parsing into
//!   typed settings happens once per reconfiguration in [`crate::config`]
//! - **[`MemoryStore`]**: a map, for embedding and tests
//! - **[`file_store::TomlFileStore`]**: a flat TOML table on disk with
//!   write-through on every change
//! - **[`settings_editor`]**: interprets edits to sensor keys and reports what
//!   has to be rebuilt
//!
//! ## Error Handling Strategy
//! Reads never fail; a missing key is `None`. Writes can fail on I/O and
//! return [`StoreError`]. A missing settings file is not an error; the store
//! starts empty and every setting takes its default.

pub mod file_store;
pub mod settings_editor;

use std::collections::BTreeMap;

pub use file_store::TomlFileStore;
pub use settings_editor::{apply_setting, describe_settings, SettingChange, SettingEntry};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings file: {0}")]
    Parse(String),

    #[error("Failed to serialize settings: {0}")]
    Serialize(String),
}

/// String-keyed settings storage.
pub trait SettingsStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from key/value pairs.
    pub fn with_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }
}
