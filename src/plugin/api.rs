//! Plugin contract
//!
//! A plugin declares its identity, its settings, and the hook names it
//! wants delivered, then implements the lifecycle methods. Hook delivery
//! is by name convention: declaring `SocketManager_loggedIn` in
//! [`Plugin::hooks`] is the whole subscription; there is no separate
//! subscribe call.

use std::any::Any;
use std::rc::Rc;

use crate::hook::HookManager;
use crate::host::HookCall;
use crate::menu::ContextMenuManager;

use super::settings::{Settings, SettingsSpec};

/// Runtime facilities handed to every lifecycle call.
#[derive(Clone)]
pub struct PluginContext {
    /// Hook installation and class handle lookup.
    pub hooks: Rc<HookManager>,

    /// Context-menu action catalogs.
    pub menus: Rc<ContextMenuManager>,

    /// This plugin's own live settings.
    pub settings: Settings,
}

/// Contract every plugin implements.
///
/// Lifecycle calls arrive in sequence: `init`, `post_init`, `start`,
/// `stop`. `start` is skipped while the plugin's `enable` setting is off;
/// `stop` is always delivered so resources acquired in `init` get
/// released.
///
/// The `Any` supertrait backs lookup by concrete type.
pub trait Plugin: Any {
    /// Unique plugin name; also the persistence key for settings.
    fn name(&self) -> &str;

    /// Plugin author, for display surfaces.
    fn author(&self) -> &str;

    /// Declared settings. The runtime adds the `enable` entry (default
    /// on) when the spec does not carry one.
    fn settings_spec(&self) -> SettingsSpec {
        SettingsSpec::new()
    }

    /// Hook names this plugin subscribes to, in `Class_method` form.
    /// Inspected once at registration time.
    fn hooks(&self) -> Vec<String> {
        Vec::new()
    }

    /// One-time setup after registration.
    fn init(&mut self, ctx: &PluginContext) -> anyhow::Result<()>;

    /// Setup that needs every plugin initialized first.
    fn post_init(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Activation; only called while enabled.
    fn start(&mut self, ctx: &PluginContext) -> anyhow::Result<()>;

    /// Deactivation; called regardless of the enable flag.
    fn stop(&mut self, ctx: &PluginContext) -> anyhow::Result<()>;

    /// Delivery point for subscribed hooks.
    fn on_hook(&mut self, hook: &str, call: &HookCall) -> anyhow::Result<()> {
        let _ = (hook, call);
        Ok(())
    }
}
