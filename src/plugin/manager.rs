//! Plugin registry and lifecycle orchestration
//!
//! The registry is ordered: every sweep (`init_all`, `post_init_all`,
//! `start_all`, `stop_all`) and every hook dispatch walks plugins in
//! registration order. Lifecycle calls run inside a per-plugin error
//! boundary; construction and hot-reload failures propagate instead,
//! because a broken plugin must be visible immediately.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::hook::HookManager;
use crate::host::HookCall;
use crate::menu::ContextMenuManager;
use crate::store::SettingsStore;

use super::api::{Plugin, PluginContext};
use super::settings::{Settings, ENABLE_KEY};

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("A plugin named '{0}' is already registered")]
    DuplicateName(String),

    #[error("No plugin named '{0}' is registered")]
    NotFound(String),
}

/// Where a plugin sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Registered,
    Initialized,
    PostInitialized,
    Started,
    Stopped,
}

impl LifecycleState {
    /// Returns true if the plugin is currently running.
    pub fn is_started(&self) -> bool {
        matches!(self, LifecycleState::Started)
    }
}

/// One registered plugin with its runtime bookkeeping.
pub struct PluginRecord {
    name: String,
    author: String,
    plugin: RefCell<Box<dyn Plugin>>,
    settings: Settings,
    subscriptions: HashSet<String>,
    state: Cell<LifecycleState>,
    registered_at: DateTime<Utc>,
}

impl std::fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRecord")
            .field("name", &self.name)
            .field("author", &self.author)
            .field("subscriptions", &self.subscriptions)
            .field("state", &self.state)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

impl PluginRecord {
    fn new(plugin: Box<dyn Plugin>) -> Rc<Self> {
        let name = plugin.name().to_string();
        let author = plugin.author().to_string();
        let settings = Settings::from_spec(plugin.settings_spec());
        let subscriptions = plugin.hooks().into_iter().collect();

        Rc::new(Self {
            name,
            author,
            plugin: RefCell::new(plugin),
            settings,
            subscriptions,
            state: Cell::new(LifecycleState::Registered),
            registered_at: Utc::now(),
        })
    }

    /// Plugin name (unique across the registry).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plugin author.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// This plugin's live settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    /// When the plugin was registered.
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Returns true if this plugin declared the given hook name.
    pub fn subscribes_to(&self, hook: &str) -> bool {
        self.subscriptions.contains(hook)
    }

    /// Delivers one hook call to the plugin.
    pub(crate) fn deliver(&self, hook: &str, call: &HookCall) -> anyhow::Result<()> {
        self.plugin.borrow_mut().on_hook(hook, call)
    }
}

/// The shared, ordered plugin registry.
///
/// Dispatch paths take a snapshot before iterating, so a handler that
/// triggers registration or hot reload mutates the registry without
/// invalidating the walk already in progress.
#[derive(Default)]
pub struct PluginSet {
    records: RefCell<Vec<Rc<PluginRecord>>>,
}

impl PluginSet {
    /// Creates an empty registry.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Clones the current registration-ordered record list.
    pub fn snapshot(&self) -> Vec<Rc<PluginRecord>> {
        self.records.borrow().clone()
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Linear lookup by plugin name.
    pub fn find_by_name(&self, name: &str) -> Option<Rc<PluginRecord>> {
        self.records
            .borrow()
            .iter()
            .find(|r| r.name == name)
            .cloned()
    }

    fn push(&self, record: Rc<PluginRecord>) {
        self.records.borrow_mut().push(record);
    }

    fn remove(&self, name: &str) {
        self.records.borrow_mut().retain(|r| r.name != name);
    }
}

/// Owns lifecycle orchestration over the shared registry.
pub struct PluginManager {
    set: Rc<PluginSet>,
    store: Rc<dyn SettingsStore>,
    hooks: Rc<HookManager>,
    menus: Rc<ContextMenuManager>,
}

impl PluginManager {
    /// Creates a manager over an existing registry.
    pub fn new(
        set: Rc<PluginSet>,
        store: Rc<dyn SettingsStore>,
        hooks: Rc<HookManager>,
        menus: Rc<ContextMenuManager>,
    ) -> Self {
        Self {
            set,
            store,
            hooks,
            menus,
        }
    }

    /// The registry this manager orchestrates.
    pub fn set(&self) -> &Rc<PluginSet> {
        &self.set
    }

    /// Constructs and registers one plugin. Construction failures and
    /// duplicate names propagate.
    pub fn register(
        &self,
        factory: impl FnOnce() -> anyhow::Result<Box<dyn Plugin>>,
    ) -> anyhow::Result<Rc<PluginRecord>> {
        let plugin = factory().context("plugin construction failed")?;
        let name = plugin.name().to_string();

        if self.set.find_by_name(&name).is_some() {
            return Err(RegistryError::DuplicateName(name).into());
        }

        let record = PluginRecord::new(plugin);
        info!("registered plugin '{}' by {}", record.name, record.author);
        self.set.push(Rc::clone(&record));
        Ok(record)
    }

    /// Runs `init` on every plugin in registration order.
    pub fn init_all(&self) {
        for record in self.set.snapshot() {
            if self.guarded(&record, "init", |p, ctx| p.init(ctx)) {
                record.state.set(LifecycleState::Initialized);
            }
        }
    }

    /// Runs `post_init` on every plugin in registration order.
    pub fn post_init_all(&self) {
        for record in self.set.snapshot() {
            if self.guarded(&record, "post_init", |p, ctx| p.post_init(ctx)) {
                record.state.set(LifecycleState::PostInitialized);
            }
        }
    }

    /// Loads persisted settings, then starts every enabled plugin.
    /// Disabled plugins are skipped and marked stopped.
    pub fn start_all(&self) {
        for record in self.set.snapshot() {
            self.load_settings(&record);

            if !record.settings.enabled() {
                debug!("plugin '{}' disabled, skipping start", record.name);
                record.state.set(LifecycleState::Stopped);
                continue;
            }

            if self.guarded(&record, "start", |p, ctx| p.start(ctx)) {
                record.state.set(LifecycleState::Started);
            }
        }
    }

    /// Stops every plugin, enabled or not. Resources acquired during
    /// init must be released even when the plugin never started.
    pub fn stop_all(&self) {
        for record in self.set.snapshot() {
            if self.guarded(&record, "stop", |p, ctx| p.stop(ctx)) {
                record.state.set(LifecycleState::Stopped);
            }
        }
    }

    /// Linear lookup by plugin name.
    pub fn find_by_name(&self, name: &str) -> Option<Rc<PluginRecord>> {
        self.set.find_by_name(name)
    }

    /// Linear lookup by concrete plugin type.
    pub fn find_by_class<P: Plugin>(&self) -> Option<Rc<PluginRecord>> {
        self.set.snapshot().into_iter().find(|record| {
            let plugin = record.plugin.borrow();
            let any: &dyn Any = plugin.as_ref();
            any.is::<P>()
        })
    }

    /// Stops and removes one plugin. If `stop` fails the record stays
    /// registered and the error is returned to the caller.
    pub fn unregister(&self, name: &str) -> anyhow::Result<()> {
        let record = self
            .set
            .find_by_name(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        let ctx = self.context_for(&record);
        record
            .plugin
            .borrow_mut()
            .stop(&ctx)
            .with_context(|| format!("stopping plugin '{}'", name))?;

        record.state.set(LifecycleState::Stopped);
        self.set.remove(name);
        info!("unregistered plugin '{}'", name);
        Ok(())
    }

    /// Replaces a plugin while it is live.
    ///
    /// A throwaway instance is built first just to learn the declared
    /// name. Any existing plugin of that name has its enable flag
    /// captured and is unregistered; the replacement is registered and
    /// run through init, post_init and (when the captured flag, or its
    /// own default, says enabled) start. Internal failures propagate.
    pub fn hot_reload(
        &self,
        factory: impl Fn() -> anyhow::Result<Box<dyn Plugin>>,
    ) -> anyhow::Result<()> {
        let probe = factory().context("plugin construction failed")?;
        let name = probe.name().to_string();
        drop(probe);

        let prior_enabled = self.set.find_by_name(&name).map(|r| r.settings.enabled());
        if prior_enabled.is_some() {
            self.unregister(&name)?;
        }

        let record = self.register(factory)?;
        let ctx = self.context_for(&record);

        record
            .plugin
            .borrow_mut()
            .init(&ctx)
            .with_context(|| format!("reloading plugin '{}': init", name))?;
        record.state.set(LifecycleState::Initialized);

        record
            .plugin
            .borrow_mut()
            .post_init(&ctx)
            .with_context(|| format!("reloading plugin '{}': post_init", name))?;
        record.state.set(LifecycleState::PostInitialized);

        self.load_settings(&record);
        if let Some(enabled) = prior_enabled {
            record.settings.assign(ENABLE_KEY, Value::Bool(enabled))?;
        }

        if record.settings.enabled() {
            record
                .plugin
                .borrow_mut()
                .start(&ctx)
                .with_context(|| format!("reloading plugin '{}': start", name))?;
            record.state.set(LifecycleState::Started);
        } else {
            record.state.set(LifecycleState::Stopped);
        }

        info!("hot reloaded plugin '{}'", name);
        Ok(())
    }

    /// Mutates one setting and persists the plugin's full blob.
    pub fn set_setting(&self, plugin: &str, key: &str, value: Value) -> anyhow::Result<()> {
        let record = self
            .set
            .find_by_name(plugin)
            .ok_or_else(|| RegistryError::NotFound(plugin.to_string()))?;

        record.settings.set(key, value)?;
        self.store
            .save(plugin, &record.settings.to_blob())
            .with_context(|| format!("persisting settings for '{}'", plugin))?;
        Ok(())
    }

    /// Builds the context handed to one plugin's lifecycle calls.
    fn context_for(&self, record: &Rc<PluginRecord>) -> PluginContext {
        PluginContext {
            hooks: Rc::clone(&self.hooks),
            menus: Rc::clone(&self.menus),
            settings: record.settings.clone(),
        }
    }

    /// Per-plugin error boundary for lifecycle sweeps: failures are
    /// logged and the sweep continues. Returns true on success.
    fn guarded(
        &self,
        record: &Rc<PluginRecord>,
        stage: &str,
        f: impl FnOnce(&mut dyn Plugin, &PluginContext) -> anyhow::Result<()>,
    ) -> bool {
        let ctx = self.context_for(record);
        let result = f(record.plugin.borrow_mut().as_mut(), &ctx);
        match result {
            Ok(()) => true,
            Err(e) => {
                error!("plugin '{}' failed during {}: {:#}", record.name, stage, e);
                false
            }
        }
    }

    fn load_settings(&self, record: &Rc<PluginRecord>) {
        match self.store.load(&record.name) {
            Ok(Some(blob)) => record.settings.apply_blob(&blob),
            Ok(None) => {}
            Err(e) => error!("failed to load settings for '{}': {:#}", record.name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostBinding;
    use crate::menu::ActionIds;
    use crate::plugin::settings::{SettingsBlob, SettingsSpec};
    use crate::store::MemoryStore;
    use anyhow::bail;
    use serde_json::json;

    struct TestPlugin {
        name: String,
        log: Rc<RefCell<Vec<String>>>,
        enabled_default: bool,
        fail_stage: Option<&'static str>,
    }

    impl TestPlugin {
        fn factory(
            name: &str,
            log: &Rc<RefCell<Vec<String>>>,
        ) -> impl Fn() -> anyhow::Result<Box<dyn Plugin>> {
            let name = name.to_string();
            let log = Rc::clone(log);
            move || {
                Ok(Box::new(TestPlugin {
                    name: name.clone(),
                    log: Rc::clone(&log),
                    enabled_default: true,
                    fail_stage: None,
                }) as Box<dyn Plugin>)
            }
        }
    }

    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn author(&self) -> &str {
            "tests"
        }

        fn settings_spec(&self) -> SettingsSpec {
            SettingsSpec::new().enabled_by_default(self.enabled_default)
        }

        fn init(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.log.borrow_mut().push(format!("{}.init", self.name));
            if self.fail_stage == Some("init") {
                bail!("init exploded");
            }
            Ok(())
        }

        fn post_init(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.log
                .borrow_mut()
                .push(format!("{}.post_init", self.name));
            Ok(())
        }

        fn start(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.log.borrow_mut().push(format!("{}.start", self.name));
            if self.fail_stage == Some("start") {
                bail!("start exploded");
            }
            Ok(())
        }

        fn stop(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.log.borrow_mut().push(format!("{}.stop", self.name));
            if self.fail_stage == Some("stop") {
                bail!("stop exploded");
            }
            Ok(())
        }
    }

    fn make_manager(store: Rc<dyn SettingsStore>) -> PluginManager {
        let binding = HostBinding::new();
        let plugins = PluginSet::new();
        let hooks = Rc::new(HookManager::new(binding, Rc::clone(&plugins)));
        let menus = ContextMenuManager::new(ActionIds::new());
        PluginManager::new(plugins, store, hooks, menus)
    }

    fn boxed(plugin: TestPlugin) -> anyhow::Result<Box<dyn Plugin>> {
        Ok(Box::new(plugin) as Box<dyn Plugin>)
    }

    #[test]
    fn register_appends_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = make_manager(Rc::new(MemoryStore::new()));

        manager.register(TestPlugin::factory("alpha", &log)).unwrap();
        manager.register(TestPlugin::factory("beta", &log)).unwrap();

        let names: Vec<_> = manager
            .set()
            .snapshot()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = make_manager(Rc::new(MemoryStore::new()));

        manager.register(TestPlugin::factory("alpha", &log)).unwrap();
        let err = manager
            .register(TestPlugin::factory("alpha", &log))
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<RegistryError>(),
            Some(&RegistryError::DuplicateName("alpha".to_string()))
        );
        assert_eq!(manager.set().len(), 1);
    }

    #[test]
    fn construction_failure_propagates() {
        let manager = make_manager(Rc::new(MemoryStore::new()));
        let result = manager.register(|| bail!("no such plugin"));

        assert!(result.is_err());
        assert!(manager.set().is_empty());
    }

    #[test]
    fn enable_gating_governs_start_but_not_stop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = make_manager(Rc::new(MemoryStore::new()));

        manager.register(TestPlugin::factory("a", &log)).unwrap();
        manager
            .register({
                let log = Rc::clone(&log);
                move || {
                    boxed(TestPlugin {
                        name: "b".to_string(),
                        log,
                        enabled_default: false,
                        fail_stage: None,
                    })
                }
            })
            .unwrap();

        manager.init_all();
        manager.post_init_all();
        manager.start_all();
        manager.stop_all();

        let events = log.borrow().clone();
        assert_eq!(
            events,
            vec![
                "a.init",
                "b.init",
                "a.post_init",
                "b.post_init",
                "a.start",
                "a.stop",
                "b.stop",
            ]
        );

        assert!(!manager.find_by_name("b").unwrap().state().is_started());
    }

    #[test]
    fn persisted_enable_flag_is_loaded_before_start() {
        let store = Rc::new(MemoryStore::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        // A previous session disabled the plugin.
        let mut values = std::collections::BTreeMap::new();
        values.insert(ENABLE_KEY.to_string(), json!(false));
        store
            .save(
                "a",
                &SettingsBlob {
                    values,
                    updated_at: Utc::now(),
                },
            )
            .unwrap();

        let manager = make_manager(store);
        manager.register(TestPlugin::factory("a", &log)).unwrap();
        manager.init_all();
        manager.start_all();

        assert!(!log.borrow().contains(&"a.start".to_string()));
    }

    #[test]
    fn lifecycle_failure_is_isolated_per_plugin() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = make_manager(Rc::new(MemoryStore::new()));

        manager.register(TestPlugin::factory("a", &log)).unwrap();
        manager
            .register({
                let log = Rc::clone(&log);
                move || {
                    boxed(TestPlugin {
                        name: "b".to_string(),
                        log,
                        enabled_default: true,
                        fail_stage: Some("init"),
                    })
                }
            })
            .unwrap();
        manager.register(TestPlugin::factory("c", &log)).unwrap();

        manager.init_all();

        let events = log.borrow().clone();
        assert_eq!(events, vec!["a.init", "b.init", "c.init"]);
        assert_eq!(
            manager.find_by_name("b").unwrap().state(),
            LifecycleState::Registered
        );
        assert_eq!(
            manager.find_by_name("c").unwrap().state(),
            LifecycleState::Initialized
        );
    }

    #[test]
    fn unregister_removes_after_stop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = make_manager(Rc::new(MemoryStore::new()));

        manager.register(TestPlugin::factory("a", &log)).unwrap();
        manager.unregister("a").unwrap();

        assert!(manager.set().is_empty());
        assert!(log.borrow().contains(&"a.stop".to_string()));
    }

    #[test]
    fn unregister_keeps_record_when_stop_fails() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = make_manager(Rc::new(MemoryStore::new()));

        manager
            .register({
                let log = Rc::clone(&log);
                move || {
                    boxed(TestPlugin {
                        name: "a".to_string(),
                        log,
                        enabled_default: true,
                        fail_stage: Some("stop"),
                    })
                }
            })
            .unwrap();

        assert!(manager.unregister("a").is_err());
        assert_eq!(manager.set().len(), 1);
    }

    #[test]
    fn unregister_unknown_name_errors() {
        let manager = make_manager(Rc::new(MemoryStore::new()));
        let err = manager.unregister("ghost").unwrap_err();

        assert_eq!(
            err.downcast_ref::<RegistryError>(),
            Some(&RegistryError::NotFound("ghost".to_string()))
        );
    }

    #[test]
    fn hot_reload_preserves_prior_enabled_flag() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = make_manager(Rc::new(MemoryStore::new()));

        manager.register(TestPlugin::factory("a", &log)).unwrap();
        manager.init_all();
        manager.start_all();

        // User disables the running plugin, then reloads it.
        manager
            .set_setting("a", ENABLE_KEY, json!(false))
            .unwrap();
        log.borrow_mut().clear();

        manager.hot_reload(TestPlugin::factory("a", &log)).unwrap();

        let events = log.borrow().clone();
        assert_eq!(events, vec!["a.stop", "a.init", "a.post_init"]);
        assert_eq!(
            manager.find_by_name("a").unwrap().state(),
            LifecycleState::Stopped
        );
    }

    #[test]
    fn hot_reload_enabled_plugin_restarts() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = make_manager(Rc::new(MemoryStore::new()));

        manager.register(TestPlugin::factory("a", &log)).unwrap();
        manager.init_all();
        manager.start_all();
        log.borrow_mut().clear();

        manager.hot_reload(TestPlugin::factory("a", &log)).unwrap();

        let events = log.borrow().clone();
        assert_eq!(events, vec!["a.stop", "a.init", "a.post_init", "a.start"]);
        assert!(manager.find_by_name("a").unwrap().state().is_started());
    }

    #[test]
    fn hot_reload_without_prior_uses_new_default() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = make_manager(Rc::new(MemoryStore::new()));

        manager
            .hot_reload({
                let log = Rc::clone(&log);
                move || {
                    boxed(TestPlugin {
                        name: "fresh".to_string(),
                        log: Rc::clone(&log),
                        enabled_default: false,
                        fail_stage: None,
                    })
                }
            })
            .unwrap();

        assert!(!log.borrow().contains(&"fresh.start".to_string()));
        assert_eq!(
            manager.find_by_name("fresh").unwrap().state(),
            LifecycleState::Stopped
        );
    }

    #[test]
    fn hot_reload_init_failure_propagates() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = make_manager(Rc::new(MemoryStore::new()));

        let result = manager.hot_reload({
            let log = Rc::clone(&log);
            move || {
                boxed(TestPlugin {
                    name: "broken".to_string(),
                    log: Rc::clone(&log),
                    enabled_default: true,
                    fail_stage: Some("init"),
                })
            }
        });

        assert!(result.is_err());
    }

    #[test]
    fn find_by_class_matches_concrete_type() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = make_manager(Rc::new(MemoryStore::new()));

        manager.register(TestPlugin::factory("a", &log)).unwrap();

        assert!(manager.find_by_class::<TestPlugin>().is_some());
    }

    #[test]
    fn set_setting_persists_full_blob() {
        let store = Rc::new(MemoryStore::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = make_manager(Rc::clone(&store) as Rc<dyn SettingsStore>);

        manager.register(TestPlugin::factory("a", &log)).unwrap();
        manager
            .set_setting("a", ENABLE_KEY, json!(false))
            .unwrap();

        let blob = store.load("a").unwrap().unwrap();
        assert_eq!(blob.values.get(ENABLE_KEY), Some(&json!(false)));
    }
}
