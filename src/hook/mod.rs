//! # Hook System
//!
//! Interception points on host methods, and the dispatch that carries
//! intercepted calls to plugins.
//!
//! ## Hook styles
//!
//! | Style | Original runs? | Result |
//! |-------|----------------|--------|
//! | Notify-after | Yes, unchanged | Original's result |
//! | Override | No (installer may capture it) | Dispatch fn's result |
//! | Static | Yes, unchanged | Original's result |
//!
//! ## Dispatch keys
//!
//! Every hook derives a name, `{SemanticClass}_{method}` with the
//! method's leading `_` marker stripped. Declaring that name in
//! [`crate::plugin::Plugin::hooks`] is the entire subscription
//! mechanism; the subscription map is built once at registration time.
//!
//! ## Key Types
//!
//! - [`HookManager`] - Handle map plus wrapper installation
//! - [`hook_name`] - Dispatch-key derivation
//! - [`dispatch_to_plugins`] - The isolating default dispatch

mod manager;
mod name;

pub use manager::{
    dispatch_to_plugins, HookError, HookKind, HookManager, NotifyDispatch, OverrideDispatch,
};
pub use name::hook_name;
