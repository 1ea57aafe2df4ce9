//! Typed per-plugin settings
//!
//! Every plugin carries a settings map with at least an `enable` entry.
//! Entries are declared up front (kind, default, optional validator and
//! change callback); values are persisted externally as a blob keyed by
//! plugin name, loaded before start and saved on every mutation.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// The settings key gating whether a plugin starts.
pub const ENABLE_KEY: &str = "enable";

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("No setting named '{0}'")]
    UnknownKey(String),

    #[error("Value rejected for setting '{0}'")]
    InvalidValue(String),
}

/// Value shape of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    Toggle,
    Integer,
    Decimal,
    Text,
}

impl SettingKind {
    /// Returns true if `value` has this kind's JSON shape.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            SettingKind::Toggle => value.is_boolean(),
            SettingKind::Integer => value.is_i64() || value.is_u64(),
            SettingKind::Decimal => value.is_number(),
            SettingKind::Text => value.is_string(),
        }
    }
}

/// Optional per-setting value check, run before assignment.
pub type Validator = Rc<dyn Fn(&Value) -> bool>;

/// Optional per-setting callback, fired after a successful mutation.
pub type ChangeCallback = Rc<dyn Fn(&Value)>;

/// One declared setting.
pub struct SettingDecl {
    pub key: String,
    pub kind: SettingKind,
    pub default: Value,
    pub validator: Option<Validator>,
    pub on_change: Option<ChangeCallback>,
}

/// Settings a plugin declares at registration time.
#[derive(Default)]
pub struct SettingsSpec {
    entries: Vec<SettingDecl>,
}

impl SettingsSpec {
    /// Creates an empty spec; the runtime adds the `enable` entry
    /// (default on) when a plugin does not declare its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a setting with a kind and default value.
    pub fn with(mut self, key: impl Into<String>, kind: SettingKind, default: Value) -> Self {
        self.entries.push(SettingDecl {
            key: key.into(),
            kind,
            default,
            validator: None,
            on_change: None,
        });
        self
    }

    /// Declares a setting with a validator.
    pub fn with_validated(
        mut self,
        key: impl Into<String>,
        kind: SettingKind,
        default: Value,
        validator: impl Fn(&Value) -> bool + 'static,
    ) -> Self {
        self.entries.push(SettingDecl {
            key: key.into(),
            kind,
            default,
            validator: Some(Rc::new(validator)),
            on_change: None,
        });
        self
    }

    /// Attaches a change callback to the most recently declared setting.
    pub fn on_change(mut self, callback: impl Fn(&Value) + 'static) -> Self {
        if let Some(last) = self.entries.last_mut() {
            last.on_change = Some(Rc::new(callback));
        }
        self
    }

    /// Convenience for the standard `enable` entry with a custom default.
    pub fn enabled_by_default(self, enabled: bool) -> Self {
        self.with(ENABLE_KEY, SettingKind::Toggle, Value::Bool(enabled))
    }

    fn into_entries(self) -> Vec<SettingDecl> {
        self.entries
    }
}

struct SettingEntry {
    kind: SettingKind,
    value: Value,
    validator: Option<Validator>,
    on_change: Option<ChangeCallback>,
}

impl SettingEntry {
    fn accepts(&self, value: &Value) -> bool {
        self.kind.accepts(value)
            && self
                .validator
                .as_ref()
                .map(|validate| (**validate)(value))
                .unwrap_or(true)
    }
}

/// Live settings map for one plugin. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Settings {
    inner: Rc<RefCell<BTreeMap<String, SettingEntry>>>,
}

impl Settings {
    /// Materializes settings from a declared spec, ensuring the `enable`
    /// entry exists (default on).
    pub fn from_spec(spec: SettingsSpec) -> Self {
        let mut entries = BTreeMap::new();
        for decl in spec.into_entries() {
            entries.insert(
                decl.key,
                SettingEntry {
                    kind: decl.kind,
                    value: decl.default,
                    validator: decl.validator,
                    on_change: decl.on_change,
                },
            );
        }

        entries.entry(ENABLE_KEY.to_string()).or_insert(SettingEntry {
            kind: SettingKind::Toggle,
            value: Value::Bool(true),
            validator: None,
            on_change: None,
        });

        Self {
            inner: Rc::new(RefCell::new(entries)),
        }
    }

    /// Reads a setting value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.borrow().get(key).map(|e| e.value.clone())
    }

    /// Returns the declared kind of a setting.
    pub fn kind(&self, key: &str) -> Option<SettingKind> {
        self.inner.borrow().get(key).map(|e| e.kind)
    }

    /// Returns the `enable` flag.
    pub fn enabled(&self) -> bool {
        self.get(ENABLE_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }

    /// Returns all setting keys in declaration-independent sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().keys().cloned().collect()
    }

    /// Mutates a setting: kind and validator checks, then assignment,
    /// then the change callback.
    pub fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let callback = {
            let mut entries = self.inner.borrow_mut();
            let entry = entries
                .get_mut(key)
                .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;

            if !entry.accepts(&value) {
                return Err(SettingsError::InvalidValue(key.to_string()));
            }

            entry.value = value.clone();
            entry.on_change.clone()
        };

        // Fired outside the borrow so the callback may read settings.
        if let Some(callback) = callback {
            (*callback)(&value);
        }

        Ok(())
    }

    /// Assigns a value without firing the change callback. Used when
    /// restoring persisted state, which is not a user edit.
    pub(crate) fn assign(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let mut entries = self.inner.borrow_mut();
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;

        if !entry.accepts(&value) {
            return Err(SettingsError::InvalidValue(key.to_string()));
        }

        entry.value = value;
        Ok(())
    }

    /// Applies a persisted blob. Unknown keys and rejected values are
    /// logged and skipped; the blob may come from an older plugin version.
    pub fn apply_blob(&self, blob: &SettingsBlob) {
        for (key, value) in &blob.values {
            if let Err(e) = self.assign(key, value.clone()) {
                warn!("ignoring persisted setting '{}': {}", key, e);
            }
        }
    }

    /// Snapshots current values for persistence.
    pub fn to_blob(&self) -> SettingsBlob {
        SettingsBlob {
            values: self
                .inner
                .borrow()
                .iter()
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect(),
            updated_at: Utc::now(),
        }
    }
}

/// Persisted settings snapshot for one plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsBlob {
    /// Current value per setting key.
    #[serde(default)]
    pub values: BTreeMap<String, Value>,

    /// When this blob was written.
    pub updated_at: DateTime<Utc>,
}
