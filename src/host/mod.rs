//! Host object graph model
//!
//! The host client is an externally supplied, already-running application.
//! This crate never implements host behavior; it only needs a seam to act
//! on: classes addressed by opaque identifiers, whose methods are function
//! values that can be read and replaced at runtime. Replacing a method
//! with a function that closes over the previous value is the primitive
//! every hook is built from.

mod binding;

pub use binding::{HookCall, HostBinding, HostClass, HostFn, HostObject};
