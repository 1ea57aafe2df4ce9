//! Interception wrapper installation and plugin dispatch
//!
//! Hooks come in two styles. A notify-after hook runs the previous
//! implementation unchanged and then tells the dispatch function about
//! the call; the caller still gets the original result. An override hook
//! makes the dispatch function's return value the entire result and
//! never invokes the previous implementation; an installer needing the
//! original captures it as a value first via [`HostClass::method`].
//!
//! Every installation wraps exactly the implementation present at
//! install time, so hooks on the same member chain in install order.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

use crate::host::{HookCall, HostBinding, HostClass};
use crate::plugin::PluginSet;

use super::name::hook_name;

/// Dispatch function for notify-after hooks.
pub type NotifyDispatch = Rc<dyn Fn(&str, &HookCall)>;

/// Dispatch function for override hooks; its return value becomes the
/// wrapped method's result.
pub type OverrideDispatch = Rc<dyn Fn(&str, &HookCall) -> Value>;

#[derive(Debug, Error, PartialEq)]
pub enum HookError {
    #[error("No class registered under semantic name '{0}'")]
    UnknownClass(String),

    #[error("Class '{0}' has no method '{1}'")]
    UnknownMethod(String, String),

    #[error("A {2} hook is already installed on {0}.{1}")]
    DuplicateHook(String, String, HookKind),
}

/// Style of an installed hook; part of the double-registration guard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Notify,
    Override,
    Static,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HookKind::Notify => "notify",
            HookKind::Override => "override",
            HookKind::Static => "static",
        };
        f.write_str(label)
    }
}

/// Resolves host classes to semantic names and installs interception
/// wrappers around their methods.
pub struct HookManager {
    binding: Rc<HostBinding>,
    plugins: Rc<PluginSet>,
    handles: RefCell<HashMap<String, Rc<HostClass>>>,
    installed: RefCell<HashSet<(String, String, HookKind)>>,
}

impl HookManager {
    /// Creates a manager over the given host binding and plugin registry.
    pub fn new(binding: Rc<HostBinding>, plugins: Rc<PluginSet>) -> Self {
        Self {
            binding,
            plugins,
            handles: RefCell::new(HashMap::new()),
            installed: RefCell::new(HashSet::new()),
        }
    }

    /// Resolves a raw host identifier and stores its handle under a
    /// semantic name.
    ///
    /// Host identifiers legitimately drift between client releases, so a
    /// failed lookup is a logged warning and `false`, never an error.
    pub fn register_class(&self, host_id: &str, semantic_name: &str) -> bool {
        match self.binding.class(host_id) {
            Some(class) => {
                self.handles
                    .borrow_mut()
                    .insert(semantic_name.to_string(), class);
                true
            }
            None => {
                warn!(
                    "host identifier '{}' (wanted as '{}') not present in this client build",
                    host_id, semantic_name
                );
                false
            }
        }
    }

    /// Looks up a previously registered semantic handle.
    pub fn handle(&self, semantic_name: &str) -> Option<Rc<HostClass>> {
        self.handles.borrow().get(semantic_name).cloned()
    }

    /// Installs a notify-after hook dispatching to the plugin registry.
    pub fn register_class_hook(&self, semantic: &str, method: &str) -> Result<(), HookError> {
        self.register_class_hook_with(semantic, method, self.default_dispatch())
    }

    /// Installs a notify-after hook with a custom dispatch function.
    ///
    /// The wrapper runs the previous implementation, hands the derived
    /// hook name plus the original call to `dispatch`, and returns the
    /// original result untouched.
    pub fn register_class_hook_with(
        &self,
        semantic: &str,
        method: &str,
        dispatch: NotifyDispatch,
    ) -> Result<(), HookError> {
        let class = self
            .handle(semantic)
            .ok_or_else(|| HookError::UnknownClass(semantic.to_string()))?;
        let prev = class
            .method(method)
            .ok_or_else(|| HookError::UnknownMethod(semantic.to_string(), method.to_string()))?;
        self.guard(semantic, method, HookKind::Notify)?;
        let name = hook_name(semantic, method);

        class.replace_method(
            method,
            Rc::new(move |call| {
                let result = (*prev)(call);
                (*dispatch)(&name, call);
                result
            }),
        );
        Ok(())
    }

    /// Installs an override hook: `dispatch`'s return value becomes the
    /// entire result and the previous implementation is never invoked.
    pub fn register_class_override_hook(
        &self,
        semantic: &str,
        method: &str,
        dispatch: OverrideDispatch,
    ) -> Result<(), HookError> {
        let class = self
            .handle(semantic)
            .ok_or_else(|| HookError::UnknownClass(semantic.to_string()))?;

        // The previous implementation is not called, but requiring it to
        // exist catches typoed method names at install time.
        class
            .method(method)
            .ok_or_else(|| HookError::UnknownMethod(semantic.to_string(), method.to_string()))?;
        self.guard(semantic, method, HookKind::Override)?;
        let name = hook_name(semantic, method);

        class.replace_method(method, Rc::new(move |call| (*dispatch)(&name, call)));
        Ok(())
    }

    /// Installs a notify-after hook on a function-valued member of the
    /// class object itself, resolving the class directly from the host
    /// binding by raw identifier instead of through the handle map.
    pub fn register_static_class_hook(
        &self,
        host_id: &str,
        method: &str,
        dispatch: NotifyDispatch,
    ) -> Result<(), HookError> {
        let class = self
            .binding
            .class(host_id)
            .ok_or_else(|| HookError::UnknownClass(host_id.to_string()))?;
        let prev = class
            .static_member(method)
            .ok_or_else(|| HookError::UnknownMethod(host_id.to_string(), method.to_string()))?;
        self.guard(host_id, method, HookKind::Static)?;
        let name = hook_name(host_id, method);

        class.replace_static(
            method,
            Rc::new(move |call| {
                let result = (*prev)(call);
                (*dispatch)(&name, call);
                result
            }),
        );
        Ok(())
    }

    /// The standard dispatch: walk subscribed plugins in registration
    /// order, isolating each failure.
    pub fn default_dispatch(&self) -> NotifyDispatch {
        let plugins = Rc::clone(&self.plugins);
        Rc::new(move |hook, call| dispatch_to_plugins(&plugins, hook, call))
    }

    /// Drops every semantic handle and installed-hook record. Called
    /// when the host reloads its object graph; wrappers installed on the
    /// old graph die with it.
    pub fn invalidate(&self) {
        self.handles.borrow_mut().clear();
        self.installed.borrow_mut().clear();
    }

    fn guard(&self, class: &str, method: &str, kind: HookKind) -> Result<(), HookError> {
        let key = (class.to_string(), method.to_string(), kind);
        if !self.installed.borrow_mut().insert(key) {
            return Err(HookError::DuplicateHook(
                class.to_string(),
                method.to_string(),
                kind,
            ));
        }
        Ok(())
    }
}

/// Delivers one hook to every subscribed plugin, in registration order.
///
/// A failing plugin is logged and skipped; the remaining plugins still
/// receive the call. Isolation is mandatory here: one misbehaving
/// plugin must not starve the others of events.
///
/// The registry is snapshotted first, so a handler may register or
/// hot-reload plugins mid-dispatch. A handler must not re-trigger a
/// hook delivered to its own plugin: delivery holds the plugin borrowed.
pub fn dispatch_to_plugins(plugins: &PluginSet, hook: &str, call: &HookCall) {
    for record in plugins.snapshot() {
        if !record.subscribes_to(hook) {
            continue;
        }
        if let Err(e) = record.deliver(hook, call) {
            error!("plugin '{}' failed handling {}: {:#}", record.name(), hook, e);
        }
    }
}
