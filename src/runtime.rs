//! Runtime root
//!
//! One object owns every piece of core state: the host binding handle,
//! the hook manager's handle map, the plugin registry and the menu
//! catalogs. Nothing in this crate is a process-wide singleton; two
//! runtimes over two bindings can coexist in one process.

use std::rc::Rc;

use tracing::warn;

use crate::config::{ClassBinding, RuntimeConfig};
use crate::hook::{HookError, HookManager};
use crate::host::HostBinding;
use crate::menu::{ActionIds, ContextMenuManager};
use crate::plugin::{PluginManager, PluginSet};
use crate::store::{FileStore, MemoryStore, SettingsStore};

/// The assembled hook-and-plugin runtime.
pub struct Runtime {
    binding: Rc<HostBinding>,
    ids: Rc<ActionIds>,
    hooks: Rc<HookManager>,
    menus: Rc<ContextMenuManager>,
    plugins: PluginManager,
}

impl Runtime {
    /// Assembles a runtime over a host binding and a settings store.
    pub fn new(binding: Rc<HostBinding>, store: Rc<dyn SettingsStore>) -> Self {
        let set = PluginSet::new();
        let hooks = Rc::new(HookManager::new(Rc::clone(&binding), Rc::clone(&set)));
        let ids = ActionIds::new();
        let menus = ContextMenuManager::new(Rc::clone(&ids));
        let plugins = PluginManager::new(set, store, Rc::clone(&hooks), Rc::clone(&menus));

        Self {
            binding,
            ids,
            hooks,
            menus,
            plugins,
        }
    }

    /// Assembles a runtime from configuration: file-backed settings at
    /// the configured (or default) location, and the class-bindings
    /// table applied to the hook manager.
    pub fn from_config(binding: Rc<HostBinding>, config: &RuntimeConfig) -> Self {
        let store: Rc<dyn SettingsStore> = match config.settings_path() {
            Some(path) => Rc::new(FileStore::new(path)),
            None => {
                warn!("no settings path available; settings will not persist");
                Rc::new(MemoryStore::new())
            }
        };

        let runtime = Self::new(binding, store);
        runtime.apply_bindings(&config.bindings);
        runtime
    }

    /// Runs `register_class` over a bindings table. Unresolved host
    /// identifiers are tolerated (each is warned about individually);
    /// returns how many resolved.
    pub fn apply_bindings(&self, bindings: &[ClassBinding]) -> usize {
        let resolved = bindings
            .iter()
            .filter(|b| self.hooks.register_class(&b.host_id, &b.name))
            .count();

        if resolved < bindings.len() {
            warn!(
                "{} of {} class bindings did not resolve in this client build",
                bindings.len() - resolved,
                bindings.len()
            );
        }
        resolved
    }

    /// Installs the context-menu hooks. The menu-related classes must
    /// already be registered (via [`Runtime::apply_bindings`] or
    /// directly on the hook manager).
    pub fn install_menus(&self) -> Result<(), HookError> {
        Rc::clone(&self.menus).install(&self.hooks)
    }

    /// Wholesale invalidation after the host reloads its object graph;
    /// bindings must be re-applied against the new graph.
    pub fn on_host_reload(&self) {
        self.hooks.invalidate();
    }

    /// The host binding this runtime is attached to.
    pub fn host(&self) -> &Rc<HostBinding> {
        &self.binding
    }

    /// Hook installation and class registration.
    pub fn hooks(&self) -> &Rc<HookManager> {
        &self.hooks
    }

    /// Context-menu catalogs.
    pub fn menus(&self) -> &Rc<ContextMenuManager> {
        &self.menus
    }

    /// Plugin registration and lifecycle.
    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    /// The shared action enumeration (the host seeds its own built-in
    /// actions here).
    pub fn action_ids(&self) -> &Rc<ActionIds> {
        &self.ids
    }
}
