//! Action catalogs, ordinal overrides and click routing
//!
//! Two catalogs exist: inventory-item actions, keyed by item
//! classification and action-state, and world-entity actions, keyed by
//! entity kind. Both share one action-id enumeration with the host.
//!
//! Routing a click has no error isolation: a failing handler propagates
//! to the host call site, unlike hook dispatch. Missing classification
//! keys and empty handler lists are ordinary not-found states, never
//! errors.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use tracing::debug;

use super::entry::{ActionIds, MenuClick};

/// Classification key matching any item class or entity kind.
pub const WILDCARD: &str = "*";

/// Action-state bucket matched regardless of the player's current state.
pub const ANY_STATE: &str = "any";

/// A registered menu-action handler.
pub type ActionHandler = Rc<dyn Fn(&MenuClick) -> anyhow::Result<()>>;

/// Handler lists keyed by action name. Ordered, so menu synthesis is
/// deterministic.
type NameTable = BTreeMap<String, Vec<ActionHandler>>;

/// Extensible context-menu catalogs layered over the host's own menus.
pub struct ContextMenuManager {
    ids: Rc<ActionIds>,
    inventory: RefCell<BTreeMap<String, BTreeMap<String, NameTable>>>,
    world: RefCell<BTreeMap<String, NameTable>>,
    inventory_positions: RefCell<HashMap<u32, i32>>,
    world_positions: RefCell<HashMap<u32, i32>>,
}

impl ContextMenuManager {
    /// Creates empty catalogs over a shared action enumeration.
    pub fn new(ids: Rc<ActionIds>) -> Rc<Self> {
        Rc::new(Self {
            ids,
            inventory: RefCell::new(BTreeMap::new()),
            world: RefCell::new(BTreeMap::new()),
            inventory_positions: RefCell::new(HashMap::new()),
            world_positions: RefCell::new(HashMap::new()),
        })
    }

    /// The shared action enumeration.
    pub fn action_ids(&self) -> &Rc<ActionIds> {
        &self.ids
    }

    /// Registers an inventory-item action under a classification and
    /// action-state, allocating the action's id on first use anywhere.
    /// Returns the id.
    pub fn add_inventory_action(
        &self,
        name: &str,
        handler: ActionHandler,
        action_state: &str,
        classification: &str,
    ) -> u32 {
        let id = self.ids.ensure(name);
        self.inventory
            .borrow_mut()
            .entry(classification.to_string())
            .or_default()
            .entry(action_state.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .push(handler);
        id
    }

    /// Removes one specific inventory handler. Emptied handler lists,
    /// action-state buckets and classifications are pruned; the action's
    /// id allocation is never freed. Returns true if the handler was
    /// found.
    pub fn remove_inventory_action(
        &self,
        name: &str,
        handler: &ActionHandler,
        action_state: &str,
        classification: &str,
    ) -> bool {
        let mut catalog = self.inventory.borrow_mut();
        let Some(states) = catalog.get_mut(classification) else {
            return false;
        };
        let Some(by_name) = states.get_mut(action_state) else {
            return false;
        };
        let Some(handlers) = by_name.get_mut(name) else {
            return false;
        };

        let before = handlers.len();
        handlers.retain(|h| !Rc::ptr_eq(h, handler));
        let removed = handlers.len() != before;

        if handlers.is_empty() {
            by_name.remove(name);
        }
        if by_name.is_empty() {
            states.remove(action_state);
        }
        if states.is_empty() {
            catalog.remove(classification);
        }
        removed
    }

    /// Registers a world-entity action under an entity kind. Returns the
    /// action's shared id.
    pub fn add_world_action(&self, name: &str, handler: ActionHandler, entity_kind: &str) -> u32 {
        let id = self.ids.ensure(name);
        self.world
            .borrow_mut()
            .entry(entity_kind.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .push(handler);
        id
    }

    /// Removes one specific world handler, pruning emptied levels.
    /// Returns true if the handler was found.
    pub fn remove_world_action(
        &self,
        name: &str,
        handler: &ActionHandler,
        entity_kind: &str,
    ) -> bool {
        let mut catalog = self.world.borrow_mut();
        let Some(by_name) = catalog.get_mut(entity_kind) else {
            return false;
        };
        let Some(handlers) = by_name.get_mut(name) else {
            return false;
        };

        let before = handlers.len();
        handlers.retain(|h| !Rc::ptr_eq(h, handler));
        let removed = handlers.len() != before;

        if handlers.is_empty() {
            by_name.remove(name);
        }
        if by_name.is_empty() {
            catalog.remove(entity_kind);
        }
        removed
    }

    /// Records an explicit sort position for an inventory action.
    /// Returns the action's shared id.
    pub fn set_inventory_action_position(&self, name: &str, position: i32) -> u32 {
        let id = self.ids.ensure(name);
        self.inventory_positions.borrow_mut().insert(id, position);
        id
    }

    /// Clears an inventory action's position override, if any.
    pub fn remove_inventory_action_position(&self, name: &str) {
        if let Some(id) = self.ids.get(name) {
            self.inventory_positions.borrow_mut().remove(&id);
        }
    }

    /// Records an explicit sort position for a world action. Returns the
    /// action's shared id.
    pub fn set_world_action_position(&self, name: &str, position: i32) -> u32 {
        let id = self.ids.ensure(name);
        self.world_positions.borrow_mut().insert(id, position);
        id
    }

    /// Clears a world action's position override, if any.
    pub fn remove_world_action_position(&self, name: &str) {
        if let Some(id) = self.ids.get(name) {
            self.world_positions.borrow_mut().remove(&id);
        }
    }

    /// Routes a fired inventory action to every handler registered under
    /// the matching buckets: (classification, wildcard) × (any-state,
    /// current state). Handler failures propagate to the host call site.
    pub fn handle_inventory_click(
        &self,
        action: u32,
        classification: &str,
        action_state: &str,
        click: &MenuClick,
    ) -> anyhow::Result<()> {
        let Some(name) = self.ids.name_of(action) else {
            debug!("inventory click on unallocated action {}", action);
            return Ok(());
        };

        let handlers: Vec<ActionHandler> = {
            let catalog = self.inventory.borrow();
            let mut found = Vec::new();
            for class_key in class_keys(classification) {
                let Some(states) = catalog.get(class_key) else {
                    continue;
                };
                for state_key in state_keys(action_state) {
                    if let Some(list) = states.get(state_key).and_then(|t| t.get(&name)) {
                        found.extend(list.iter().cloned());
                    }
                }
            }
            found
        };

        // The borrow is released above: handlers may re-enter the catalog.
        for handler in handlers {
            (*handler)(click)?;
        }
        Ok(())
    }

    /// Routes a fired world action to every handler registered under the
    /// entity's kind and the wildcard kind. Handler failures propagate.
    pub fn handle_world_click(
        &self,
        action: u32,
        entity_kind: &str,
        click: &MenuClick,
    ) -> anyhow::Result<()> {
        let Some(name) = self.ids.name_of(action) else {
            debug!("world click on unallocated action {}", action);
            return Ok(());
        };

        let handlers: Vec<ActionHandler> = {
            let catalog = self.world.borrow();
            let mut found = Vec::new();
            for kind_key in class_keys(entity_kind) {
                if let Some(list) = catalog.get(kind_key).and_then(|t| t.get(&name)) {
                    found.extend(list.iter().cloned());
                }
            }
            found
        };

        for handler in handlers {
            (*handler)(click)?;
        }
        Ok(())
    }

    /// Returns (action name, handler count) for one inventory bucket
    /// pair, walking specific-before-wildcard classification and
    /// any-before-current state, without double-counting when the
    /// lookup keys already are the wildcards.
    pub(crate) fn inventory_bucket(
        &self,
        classification: &str,
        action_state: &str,
    ) -> Vec<(String, usize)> {
        let catalog = self.inventory.borrow();
        let mut out = Vec::new();
        for class_key in class_keys(classification) {
            let Some(states) = catalog.get(class_key) else {
                continue;
            };
            for state_key in state_keys(action_state) {
                if let Some(by_name) = states.get(state_key) {
                    for (name, handlers) in by_name {
                        out.push((name.clone(), handlers.len()));
                    }
                }
            }
        }
        out
    }

    /// Returns (action name, handler count) for one entity kind plus the
    /// wildcard kind.
    pub(crate) fn world_bucket(&self, entity_kind: &str) -> Vec<(String, usize)> {
        let catalog = self.world.borrow();
        let mut out = Vec::new();
        for kind_key in class_keys(entity_kind) {
            if let Some(by_name) = catalog.get(kind_key) {
                for (name, handlers) in by_name {
                    out.push((name.clone(), handlers.len()));
                }
            }
        }
        out
    }

    pub(crate) fn inventory_position_of(&self, action: u32) -> Option<i32> {
        self.inventory_positions.borrow().get(&action).copied()
    }

    pub(crate) fn world_position_of(&self, action: u32) -> Option<i32> {
        self.world_positions.borrow().get(&action).copied()
    }
}

/// Specific key first, wildcard second, deduplicated.
fn class_keys(specific: &str) -> impl Iterator<Item = &str> {
    let tail = if specific == WILDCARD { None } else { Some(WILDCARD) };
    std::iter::once(specific).chain(tail)
}

/// Any-state bucket first, current state second, deduplicated.
fn state_keys(current: &str) -> impl Iterator<Item = &str> {
    let tail = if current == ANY_STATE { None } else { Some(current) };
    std::iter::once(ANY_STATE).chain(tail)
}
