//! # Settings Persistence
//!
//! Per-plugin settings blobs, keyed by plugin name. The store is an
//! external collaborator with no schema beyond "one blob per plugin";
//! the runtime loads a plugin's blob before start and saves it on every
//! settings mutation.
//!
//! The seam is synchronous: the core runs inside the host's frame loop
//! and never awaits, so an async embedder pumps the store from its own
//! side of the boundary.
//!
//! ## Key Types
//!
//! - [`SettingsStore`] - The storage seam
//! - [`FileStore`] - JSONL file store with locking and atomic rewrites
//! - [`MemoryStore`] - In-memory store for tests and embedding hosts

mod file;
mod memory;

use thiserror::Error;

use crate::plugin::SettingsBlob;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings at line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },

    #[error("Failed to serialize settings for '{0}'")]
    Serialize(String),
}

/// Key-value storage for per-plugin settings blobs.
pub trait SettingsStore {
    /// Loads the blob persisted for a plugin, if any.
    fn load(&self, plugin: &str) -> Result<Option<SettingsBlob>, StoreError>;

    /// Persists a plugin's blob, replacing any previous one.
    fn save(&self, plugin: &str, blob: &SettingsBlob) -> Result<(), StoreError>;
}
