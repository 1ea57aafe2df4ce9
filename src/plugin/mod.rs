//! # Plugin System
//!
//! Registration, lifecycle and settings for independently authored
//! feature modules running inside the host client.
//!
//! ## Lifecycle
//!
//! ```text
//! register → init → post_init → start ⇄ stop → unregister
//! ```
//!
//! `start` is gated on the plugin's `enable` setting; `stop` runs
//! regardless, so resources acquired during init are always released.
//! Hot reload replays the sequence on a replacement instance while
//! preserving the enabled state the user had configured.
//!
//! ## Error policy
//!
//! Lifecycle sweeps isolate failures per plugin (log and continue).
//! Plugin construction, and every internal step of a hot reload,
//! propagate instead: a broken plugin must be visible immediately.
//!
//! ## Key Types
//!
//! - [`Plugin`] - Contract every plugin implements
//! - [`PluginManager`] - Lifecycle orchestration over the registry
//! - [`PluginSet`] - The shared, ordered registry
//! - [`Settings`] - Typed per-plugin settings with an `enable` entry

mod api;
mod manager;
mod settings;

pub use api::{Plugin, PluginContext};
pub use manager::{LifecycleState, PluginManager, PluginRecord, PluginSet, RegistryError};
pub use settings::{
    ChangeCallback, SettingKind, Settings, SettingsBlob, SettingsError, SettingsSpec, Validator,
    ENABLE_KEY,
};
