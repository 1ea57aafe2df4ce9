//! JSONL file store for plugin settings
//!
//! Settings live in one file with one JSON object per line, keyed by
//! plugin name. Uses file locking for concurrent access safety; writes
//! go to a temp file and land with an atomic rename.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::SettingsBlob;

use super::{SettingsStore, StoreError};

/// One stored line: a plugin name plus its settings blob.
#[derive(Debug, Serialize, Deserialize)]
struct Line {
    name: String,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    values: std::collections::BTreeMap<String, Value>,
}

/// Settings store writing `settings.jsonl`-style files.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store at the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path to the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every stored blob. A missing file is an empty store.
    fn read_all(&self) -> Result<HashMap<String, SettingsBlob>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let file = File::open(&self.path)?;

        // Shared lock for reading; released when the file drops.
        file.lock_shared()?;

        let reader = BufReader::new(&file);
        let mut blobs = HashMap::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let parsed: Line = serde_json::from_str(&line).map_err(|source| StoreError::Parse {
                line: line_num + 1,
                source,
            })?;

            blobs.insert(
                parsed.name,
                SettingsBlob {
                    values: parsed.values,
                    updated_at: parsed.updated_at,
                },
            );
        }

        Ok(blobs)
    }

    /// Writes every blob back out (full rewrite, atomic rename).
    fn write_all(&self, blobs: &HashMap<String, SettingsBlob>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("jsonl.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;

            file.lock_exclusive()?;

            let mut writer = BufWriter::new(&file);

            // Sort by plugin name for consistent output
            let mut sorted: Vec<_> = blobs.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));

            for (name, blob) in sorted {
                let line = Line {
                    name: name.clone(),
                    updated_at: blob.updated_at,
                    values: blob.values.clone(),
                };
                let json = serde_json::to_string(&line)
                    .map_err(|_| StoreError::Serialize(name.clone()))?;
                writeln!(writer, "{}", json)?;
            }

            writer.flush()?;
        }

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl SettingsStore for FileStore {
    fn load(&self, plugin: &str) -> Result<Option<SettingsBlob>, StoreError> {
        let mut blobs = self.read_all()?;
        Ok(blobs.remove(plugin))
    }

    fn save(&self, plugin: &str, blob: &SettingsBlob) -> Result<(), StoreError> {
        let mut blobs = self.read_all()?;
        blobs.insert(plugin.to_string(), blob.clone());
        self.write_all(&blobs)
    }
}
