//! Host-facing menu interception
//!
//! The menu subsystem rides on the raw hook primitive rather than plugin
//! dispatch: the host's menu builders are override-hooked so their
//! computed entry lists can be spliced and re-ranked before the host
//! renders them, and mouse-target resolution gets a notify-after hook
//! that re-sorts its result in place.
//!
//! Plugin-contributed entries are synthesized through the host's own
//! item factory, so they are indistinguishable from native entries.

use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::hook::{HookError, HookManager};
use crate::host::{HookCall, HostFn};

use super::actions::{ContextMenuManager, WILDCARD};
use super::entry::MenuEntry;

/// Semantic names the embedder is expected to register before
/// [`ContextMenuManager::install`] runs.
pub const INVENTORY_MENU_CLASS: &str = "InventoryMenu";
/// The host's inventory-menu builder method.
pub const INVENTORY_BUILD_METHOD: &str = "_buildItemActions";
/// Semantic name of the world-menu class.
pub const WORLD_MENU_CLASS: &str = "WorldMenu";
/// The host's world-menu builder method.
pub const WORLD_BUILD_METHOD: &str = "_buildObjectActions";
/// Semantic name of the mouse-target resolver class.
pub const MOUSE_TARGET_CLASS: &str = "MouseTarget";
/// The host's mouse-target resolution method.
pub const MOUSE_RESOLVE_METHOD: &str = "_resolveTarget";
/// Semantic name of the host's menu-item factory class.
pub const MENU_FACTORY_CLASS: &str = "MenuItemFactory";
/// The factory method synthesizing one menu entry.
pub const MENU_FACTORY_METHOD: &str = "buildEntry";

/// Instance field holding the resolver's action/target pairs.
pub const TARGET_PAIRS_FIELD: &str = "action_pairs";
/// Instance field holding the selected primary pair.
pub const PRIMARY_FIELD: &str = "primary_action";

/// One action/target pair produced by mouse-target resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTarget {
    /// Action id from the shared enumeration.
    pub action: u32,

    /// The entity or element the action would apply to.
    #[serde(default)]
    pub target: Value,
}

impl ContextMenuManager {
    /// Wires the menu subsystem into the host: override hooks on both
    /// menu builders and a notify-after hook on mouse-target resolution.
    ///
    /// The builders' original implementations and the host's item
    /// factory are captured as values first, before the overrides are
    /// installed.
    pub fn install(self: Rc<Self>, hooks: &HookManager) -> Result<(), HookError> {
        let factory = resolve(hooks, MENU_FACTORY_CLASS, MENU_FACTORY_METHOD)?;

        let inventory_original = resolve(hooks, INVENTORY_MENU_CLASS, INVENTORY_BUILD_METHOD)?;
        let manager = Rc::clone(&self);
        let f = Rc::clone(&factory);
        hooks.register_class_override_hook(
            INVENTORY_MENU_CLASS,
            INVENTORY_BUILD_METHOD,
            Rc::new(move |_, call| manager.inventory_context(call, &inventory_original, &f)),
        )?;

        let world_original = resolve(hooks, WORLD_MENU_CLASS, WORLD_BUILD_METHOD)?;
        let manager = Rc::clone(&self);
        let f = Rc::clone(&factory);
        hooks.register_class_override_hook(
            WORLD_MENU_CLASS,
            WORLD_BUILD_METHOD,
            Rc::new(move |_, call| manager.world_context(call, &world_original, &f)),
        )?;

        let manager = self;
        hooks.register_class_hook_with(
            MOUSE_TARGET_CLASS,
            MOUSE_RESOLVE_METHOD,
            Rc::new(move |_, call| manager.sort_mouse_targets(call)),
        )?;

        Ok(())
    }

    /// Override-hook body for the inventory-menu builder.
    ///
    /// Runs the captured original to get the host-computed entries,
    /// synthesizes one entry per registered handler for the item's
    /// classification (and wildcard) under the any-state bucket (and
    /// the current action-state), then stably sorts the merged list by
    /// ordinal override, falling back to current index.
    ///
    /// Call shape: args[0] = item classification, args[1] = current
    /// action-state, args[2] = item target descriptor.
    pub fn inventory_context(
        &self,
        call: &HookCall,
        original: &Rc<HostFn>,
        factory: &Rc<HostFn>,
    ) -> Value {
        let host_value = (*original)(call);
        let mut entries: Vec<MenuEntry> = match serde_json::from_value(host_value.clone()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("host inventory menu was not an entry list: {}", e);
                return host_value;
            }
        };

        let classification = call.str_arg(0).unwrap_or(WILDCARD);
        let action_state = call.str_arg(1).unwrap_or(super::actions::ANY_STATE);
        let target = call.args.get(2).cloned().unwrap_or(Value::Null);

        for (name, handler_count) in self.inventory_bucket(classification, action_state) {
            let id = self.action_ids().ensure(&name);
            for _ in 0..handler_count {
                if let Some(entry) = synthesize(factory, call, &name, id, &target) {
                    entries.push(entry);
                }
            }
        }

        sort_by_ordinal(&mut entries, |id| self.inventory_position_of(id), |e| e.action);
        encode_or(entries, host_value)
    }

    /// Override-hook body for the world-menu builder.
    ///
    /// For every distinct entity at the cursor, appends one entry per
    /// handler registered under the entity's concrete kind and the
    /// wildcard kind. No sorting happens here; world actions are ranked
    /// later by [`ContextMenuManager::sort_mouse_targets`].
    ///
    /// Call shape: args[0] = list of entities at the cursor, each
    /// carrying a `kind` field.
    pub fn world_context(
        &self,
        call: &HookCall,
        original: &Rc<HostFn>,
        factory: &Rc<HostFn>,
    ) -> Value {
        let host_value = (*original)(call);
        let mut entries: Vec<MenuEntry> = match serde_json::from_value(host_value.clone()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("host world menu was not an entry list: {}", e);
                return host_value;
            }
        };

        let cursor_entities = call
            .args
            .first()
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut seen = HashSet::new();
        for entity in cursor_entities {
            if !seen.insert(entity.to_string()) {
                continue;
            }
            let Some(kind) = entity.get("kind").and_then(Value::as_str) else {
                continue;
            };

            for (name, handler_count) in self.world_bucket(kind) {
                let id = self.action_ids().ensure(&name);
                for _ in 0..handler_count {
                    if let Some(entry) = synthesize(factory, call, &name, id, &entity) {
                        entries.push(entry);
                    }
                }
            }
        }

        encode_or(entries, host_value)
    }

    /// Notify-after hook body for mouse-target resolution: re-sorts the
    /// instance's action/target pairs in place by ordinal override
    /// (fallback: current index) and re-selects the first pair as the
    /// primary action.
    pub fn sort_mouse_targets(&self, call: &HookCall) {
        let Some(instance) = call.instance.as_ref() else {
            return;
        };
        let Some(raw) = instance.field(TARGET_PAIRS_FIELD) else {
            return;
        };

        let mut pairs: Vec<ActionTarget> = match serde_json::from_value(raw) {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!("mouse-target pairs were not decodable: {}", e);
                return;
            }
        };

        sort_by_ordinal(&mut pairs, |id| self.world_position_of(id), |p| p.action);

        let primary = pairs
            .first()
            .and_then(|p| serde_json::to_value(p).ok())
            .unwrap_or(Value::Null);
        if let Ok(sorted) = serde_json::to_value(&pairs) {
            instance.set_field(TARGET_PAIRS_FIELD, sorted);
        }
        instance.set_field(PRIMARY_FIELD, primary);
    }
}

/// Resolves a semantic handle's method as a value, for capture before an
/// override is installed.
fn resolve(hooks: &HookManager, semantic: &str, method: &str) -> Result<Rc<HostFn>, HookError> {
    let class = hooks
        .handle(semantic)
        .ok_or_else(|| HookError::UnknownClass(semantic.to_string()))?;
    class
        .method(method)
        .ok_or_else(|| HookError::UnknownMethod(semantic.to_string(), method.to_string()))
}

/// Builds one menu entry through the host's own item factory.
fn synthesize(
    factory: &Rc<HostFn>,
    call: &HookCall,
    name: &str,
    id: u32,
    target: &Value,
) -> Option<MenuEntry> {
    let factory_call = HookCall {
        instance: call.instance.clone(),
        args: vec![json!(name), json!(id), target.clone()],
    };
    let produced = (*factory)(&factory_call);
    match serde_json::from_value(produced) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("item factory produced an undecodable entry for '{}': {}", name, e);
            None
        }
    }
}

/// Stable sort by ordinal override with the item's current index as the
/// fallback key, so unranked items keep their relative order.
fn sort_by_ordinal<T>(
    items: &mut Vec<T>,
    position_of: impl Fn(u32) -> Option<i32>,
    id_of: impl Fn(&T) -> u32,
) {
    let mut keyed: Vec<(i64, T)> = items
        .drain(..)
        .enumerate()
        .map(|(index, item)| {
            let key = position_of(id_of(&item))
                .map(i64::from)
                .unwrap_or(index as i64);
            (key, item)
        })
        .collect();
    keyed.sort_by_key(|(key, _)| *key);
    items.extend(keyed.into_iter().map(|(_, item)| item));
}

fn encode_or(entries: Vec<MenuEntry>, fallback: Value) -> Value {
    match serde_json::to_value(&entries) {
        Ok(value) => value,
        Err(e) => {
            warn!("failed to encode menu entries: {}", e);
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostBinding, HostObject};
    use crate::menu::{ActionIds, ANY_STATE};
    use crate::plugin::PluginSet;
    use proptest::prelude::*;

    /// Host side of the fixture: a menu builder returning two native
    /// entries, a factory stamping plugin entries, and a mouse resolver
    /// filling the pairs field.
    struct Fixture {
        binding: Rc<HostBinding>,
        menus: Rc<ContextMenuManager>,
    }

    fn native_entries() -> Value {
        json!([
            {"action": 0, "label": "Use"},
            {"action": 1, "label": "Examine"},
        ])
    }

    fn make_fixture() -> Fixture {
        let binding = HostBinding::new();
        let hooks = Rc::new(HookManager::new(Rc::clone(&binding), PluginSet::new()));

        let ids = ActionIds::new();
        // The host's own built-in actions share the enumeration.
        ids.ensure("Use");
        ids.ensure("Examine");
        let menus = ContextMenuManager::new(ids);

        let inventory = binding.define_class("ji");
        inventory.define_method(INVENTORY_BUILD_METHOD, |_| native_entries());

        let world = binding.define_class("jw");
        world.define_method(WORLD_BUILD_METHOD, |_| native_entries());

        let mouse = binding.define_class("jm");
        mouse.define_method(MOUSE_RESOLVE_METHOD, |call| {
            if let Some(instance) = call.instance.as_ref() {
                instance.set_field(
                    TARGET_PAIRS_FIELD,
                    json!([
                        {"action": 0, "target": "rock"},
                        {"action": 1, "target": "tree"},
                        {"action": 2, "target": "door"},
                    ]),
                );
            }
            Value::Null
        });

        let factory = binding.define_class("jf");
        factory.define_method(MENU_FACTORY_METHOD, |call| {
            json!({
                "action": call.args[1],
                "label": call.args[0],
                "target": call.args[2],
            })
        });

        assert!(hooks.register_class("ji", INVENTORY_MENU_CLASS));
        assert!(hooks.register_class("jw", WORLD_MENU_CLASS));
        assert!(hooks.register_class("jm", MOUSE_TARGET_CLASS));
        assert!(hooks.register_class("jf", MENU_FACTORY_CLASS));

        Rc::clone(&menus).install(&hooks).unwrap();

        Fixture { binding, menus }
    }

    fn build_inventory_menu(fx: &Fixture, classification: &str, state: &str) -> Vec<MenuEntry> {
        let class = fx.binding.class("ji").unwrap();
        let value = class
            .call(
                INVENTORY_BUILD_METHOD,
                None,
                vec![json!(classification), json!(state), json!({"slot": 0})],
            )
            .unwrap();
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn install_requires_registered_classes() {
        let binding = HostBinding::new();
        let hooks = HookManager::new(Rc::clone(&binding), PluginSet::new());
        let menus = ContextMenuManager::new(ActionIds::new());

        assert_eq!(
            menus.install(&hooks),
            Err(HookError::UnknownClass(MENU_FACTORY_CLASS.to_string()))
        );
    }

    #[test]
    fn plugin_entries_are_spliced_into_host_menu() {
        let fx = make_fixture();
        fx.menus
            .add_inventory_action("Scry", Rc::new(|_| Ok(())), ANY_STATE, "orb");

        let entries = build_inventory_menu(&fx, "orb", "idle");
        let labels: Vec<_> = entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Use", "Examine", "Scry"]);

        // Synthesized through the host factory, carrying the item target.
        assert_eq!(entries[2].target, json!({"slot": 0}));
        assert_eq!(entries[2].action, fx.menus.action_ids().get("Scry").unwrap());
    }

    #[test]
    fn other_classifications_do_not_leak_in() {
        let fx = make_fixture();
        fx.menus
            .add_inventory_action("Scry", Rc::new(|_| Ok(())), ANY_STATE, "orb");

        let entries = build_inventory_menu(&fx, "sword", "idle");
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn one_entry_per_registered_handler() {
        let fx = make_fixture();
        fx.menus
            .add_inventory_action("Scry", Rc::new(|_| Ok(())), ANY_STATE, "orb");
        fx.menus
            .add_inventory_action("Scry", Rc::new(|_| Ok(())), ANY_STATE, "orb");

        let entries = build_inventory_menu(&fx, "orb", "idle");
        let scries = entries.iter().filter(|e| e.label == "Scry").count();
        assert_eq!(scries, 2);
    }

    #[test]
    fn ordinal_override_ranks_spliced_menu() {
        let fx = make_fixture();
        fx.menus
            .add_inventory_action("Scry", Rc::new(|_| Ok(())), ANY_STATE, "orb");
        fx.menus.set_inventory_action_position("Scry", -1);

        let entries = build_inventory_menu(&fx, "orb", "idle");
        let labels: Vec<_> = entries.iter().map(|e| e.label.as_str()).collect();
        // Override puts Scry first; the unranked pair keeps host order.
        assert_eq!(labels, vec!["Scry", "Use", "Examine"]);
    }

    #[test]
    fn world_menu_appends_without_sorting() {
        let fx = make_fixture();
        fx.menus.add_world_action("Chop", Rc::new(|_| Ok(())), "tree");
        fx.menus.set_world_action_position("Chop", -1);

        let class = fx.binding.class("jw").unwrap();
        let value = class
            .call(
                WORLD_BUILD_METHOD,
                None,
                vec![json!([
                    {"kind": "tree", "id": 7},
                    {"kind": "tree", "id": 7},
                    {"kind": "rock", "id": 9},
                ])],
            )
            .unwrap();
        let entries: Vec<MenuEntry> = serde_json::from_value(value).unwrap();

        let labels: Vec<_> = entries.iter().map(|e| e.label.as_str()).collect();
        // Duplicate cursor entity collapses to one; no re-ranking here
        // even though Chop has an override.
        assert_eq!(labels, vec!["Use", "Examine", "Chop"]);
        assert_eq!(entries[2].target, json!({"kind": "tree", "id": 7}));
    }

    #[test]
    fn wildcard_world_actions_apply_to_every_kind() {
        let fx = make_fixture();
        fx.menus
            .add_world_action("Ping", Rc::new(|_| Ok(())), WILDCARD);

        let class = fx.binding.class("jw").unwrap();
        let value = class
            .call(
                WORLD_BUILD_METHOD,
                None,
                vec![json!([{"kind": "rock", "id": 1}])],
            )
            .unwrap();
        let entries: Vec<MenuEntry> = serde_json::from_value(value).unwrap();
        assert!(entries.iter().any(|e| e.label == "Ping"));
    }

    #[test]
    fn mouse_targets_resort_and_reselect_primary() {
        let fx = make_fixture();
        // Rank the resolver's last pair first.
        let door_action = 2;
        fx.menus.action_ids().ensure("Open"); // id 2
        fx.menus.set_world_action_position("Open", -5);

        let class = fx.binding.class("jm").unwrap();
        let instance = HostObject::new("jm");
        class.call(MOUSE_RESOLVE_METHOD, Some(Rc::clone(&instance)), vec![]);

        let pairs: Vec<ActionTarget> =
            serde_json::from_value(instance.field(TARGET_PAIRS_FIELD).unwrap()).unwrap();
        assert_eq!(pairs[0].action, door_action);
        assert_eq!(pairs[0].target, json!("door"));

        let primary: ActionTarget =
            serde_json::from_value(instance.field(PRIMARY_FIELD).unwrap()).unwrap();
        assert_eq!(primary.action, door_action);
    }

    #[test]
    fn resolver_without_pairs_field_is_tolerated() {
        let fx = make_fixture();
        let instance = HostObject::new("jm");
        fx.menus
            .sort_mouse_targets(&HookCall::on(Rc::clone(&instance), vec![]));
        assert!(instance.field(PRIMARY_FIELD).is_none());
    }

    #[test]
    fn stable_sort_keeps_unranked_relative_order() {
        let mut entries = vec![
            MenuEntry::new(10, "a"),
            MenuEntry::new(11, "b"),
            MenuEntry::new(12, "c"),
        ];
        let mut positions = std::collections::HashMap::new();
        positions.insert(12u32, -1i32);

        sort_by_ordinal(&mut entries, |id| positions.get(&id).copied(), |e| e.action);

        let labels: Vec<_> = entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["c", "a", "b"]);
    }

    proptest! {
        /// Unranked items always keep their relative order, whatever the
        /// overrides say about the others.
        #[test]
        fn unranked_relative_order_is_preserved(
            count in 1usize..12,
            overrides in proptest::collection::hash_map(0u32..12, -20i32..20, 0..6),
        ) {
            let mut entries: Vec<MenuEntry> = (0..count as u32)
                .map(|i| MenuEntry::new(i, format!("e{}", i)))
                .collect();

            sort_by_ordinal(
                &mut entries,
                |id| overrides.get(&id).copied(),
                |e| e.action,
            );

            let unranked: Vec<u32> = entries
                .iter()
                .map(|e| e.action)
                .filter(|id| !overrides.contains_key(id))
                .collect();
            let mut expected = unranked.clone();
            expected.sort_unstable();
            prop_assert_eq!(unranked, expected);
        }
    }
}
