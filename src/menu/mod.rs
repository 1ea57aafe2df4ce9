//! # Context Menus
//!
//! Extensible action catalogs layered over the host's own context
//! menus, built directly on the raw hook primitive.
//!
//! ## Catalogs
//!
//! | Catalog | Classification key | Sorted where |
//! |---------|--------------------|--------------|
//! | Inventory items | item class × action-state | In the builder hook |
//! | World entities | entity kind | In mouse-target resolution |
//!
//! Action names map to numeric ids through one shared, append-only
//! enumeration ([`ActionIds`]) that the host allocates its own built-in
//! actions from; an id, once allocated, is never freed. Explicit ordinal
//! overrides re-rank merged menus; everything without an override keeps
//! its natural order under a stable sort.
//!
//! ## Key Types
//!
//! - [`ContextMenuManager`] - Catalogs, overrides, hook bodies, routing
//! - [`ActionIds`] - The shared action enumeration
//! - [`MenuEntry`] / [`MenuClick`] - Entries and click payloads

mod actions;
mod entry;
mod hooks;

pub use actions::{ActionHandler, ContextMenuManager, ANY_STATE, WILDCARD};
pub use entry::{ActionIds, MenuClick, MenuEntry};
pub use hooks::{
    ActionTarget, INVENTORY_BUILD_METHOD, INVENTORY_MENU_CLASS, MENU_FACTORY_CLASS,
    MENU_FACTORY_METHOD, MOUSE_RESOLVE_METHOD, MOUSE_TARGET_CLASS, PRIMARY_FIELD,
    TARGET_PAIRS_FIELD, WORLD_BUILD_METHOD, WORLD_MENU_CLASS,
};
