//! Runtime configuration
//!
//! Configuration is stored in `patchbay.toml`. The main payload is the
//! class-bindings table mapping raw host identifiers to the semantic
//! names the rest of the runtime uses; identifiers drift between host
//! client releases, so the table is data, not code.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// One raw-identifier → semantic-name mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassBinding {
    /// Raw identifier in the host binding (per host-client version).
    pub host_id: String,

    /// Semantic name the runtime registers the handle under.
    pub name: String,
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Class bindings applied at startup.
    pub bindings: Vec<ClassBinding>,

    /// Settings store location; defaults to the per-user data directory.
    pub settings_path: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Loads configuration from a specific file. A missing file yields
    /// the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Saves configuration to a specific file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Returns the per-user config file location.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "patchbay", "patchbay")
            .map(|dirs| dirs.config_dir().join("patchbay.toml"))
    }

    /// Returns the effective settings-store path: the configured one, or
    /// the per-user data directory.
    pub fn settings_path(&self) -> Option<PathBuf> {
        self.settings_path.clone().or_else(Self::default_settings_path)
    }

    /// Returns the per-user default settings-store location.
    pub fn default_settings_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "patchbay", "patchbay")
            .map(|dirs| dirs.data_dir().join("settings.jsonl"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RuntimeConfig::load(&dir.path().join("patchbay.toml")).unwrap();

        assert!(config.bindings.is_empty());
        assert!(config.settings_path.is_none());
    }

    #[test]
    fn parse_bindings_table() {
        let toml = r#"
settings_path = "/tmp/patchbay/settings.jsonl"

[[bindings]]
host_id = "jx"
name = "SocketManager"

[[bindings]]
host_id = "ji"
name = "InventoryMenu"
"#;

        let config: RuntimeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.bindings.len(), 2);
        assert_eq!(config.bindings[0].name, "SocketManager");
        assert_eq!(
            config.settings_path.as_deref(),
            Some(Path::new("/tmp/patchbay/settings.jsonl"))
        );
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("patchbay.toml");

        let config = RuntimeConfig {
            bindings: vec![ClassBinding {
                host_id: "jx".to_string(),
                name: "SocketManager".to_string(),
            }],
            settings_path: None,
        };
        config.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.bindings, config.bindings);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("patchbay.toml");
        fs::write(&path, "bindings = 3").unwrap();

        assert!(matches!(
            RuntimeConfig::load(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
