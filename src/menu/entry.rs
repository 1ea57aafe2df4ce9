//! Menu entries, click payloads and the shared action enumeration

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One context-menu line, host-computed or plugin-contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuEntry {
    /// Numeric id from the shared action enumeration.
    pub action: u32,

    /// Display label.
    pub label: String,

    /// Target descriptor (item slot, entity reference, ...).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub target: Value,
}

impl MenuEntry {
    /// Creates an entry with no target.
    pub fn new(action: u32, label: impl Into<String>) -> Self {
        Self {
            action,
            label: label.into(),
            target: Value::Null,
        }
    }
}

/// Arguments delivered to action handlers when a menu entry is clicked.
#[derive(Debug, Clone)]
pub struct MenuClick {
    /// The fired action id.
    pub action: u32,

    /// Target descriptor of the clicked entry.
    pub target: Value,

    /// The host's original click arguments, passed through untouched.
    pub args: Vec<Value>,
}

/// The shared action-name enumeration.
///
/// Ids are allocated sequentially by current table size, first caller
/// anywhere wins, and an allocation is never freed. The host allocates
/// its own built-in actions from the same table, so ids stay unique
/// across host and plugins.
#[derive(Default)]
pub struct ActionIds {
    names: RefCell<Vec<String>>,
    by_name: RefCell<HashMap<String, u32>>,
}

impl ActionIds {
    /// Creates an empty enumeration.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Returns the id for `name`, allocating the next one on first use.
    pub fn ensure(&self, name: &str) -> u32 {
        if let Some(&id) = self.by_name.borrow().get(name) {
            return id;
        }

        let mut names = self.names.borrow_mut();
        let id = names.len() as u32;
        names.push(name.to_string());
        self.by_name.borrow_mut().insert(name.to_string(), id);
        id
    }

    /// Returns the id for `name` without allocating.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.by_name.borrow().get(name).copied()
    }

    /// Reverse lookup: the name an id was allocated for.
    pub fn name_of(&self, id: u32) -> Option<String> {
        self.names.borrow().get(id as usize).cloned()
    }

    /// Number of allocated ids.
    pub fn len(&self) -> usize {
        self.names.borrow().len()
    }

    /// Returns true if nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.names.borrow().is_empty()
    }
}
