//! In-memory settings store

use std::cell::RefCell;
use std::collections::HashMap;

use crate::plugin::SettingsBlob;

use super::{SettingsStore, StoreError};

/// Settings store backed by a plain map. Nothing survives the process;
/// useful for tests and for embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    blobs: RefCell<HashMap<String, SettingsBlob>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self, plugin: &str) -> Result<Option<SettingsBlob>, StoreError> {
        Ok(self.blobs.borrow().get(plugin).cloned())
    }

    fn save(&self, plugin: &str, blob: &SettingsBlob) -> Result<(), StoreError> {
        self.blobs
            .borrow_mut()
            .insert(plugin.to_string(), blob.clone());
        Ok(())
    }
}
