//! Name-indexed host classes with replaceable function-valued members
//!
//! A `HostClass` carries two member tables: the shared instance-method
//! implementations and the function-valued members on the class object
//! itself ("statics"). Both store `Rc<HostFn>` values, so the current
//! implementation of any member can be captured as a value and a new one
//! installed in its place.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

/// A function-valued member of a host class.
pub type HostFn = dyn Fn(&HookCall) -> Value;

/// One host call: the invoked instance (if any) plus the raw arguments.
#[derive(Clone)]
pub struct HookCall {
    /// The instance the method was invoked on; `None` for static members.
    pub instance: Option<Rc<HostObject>>,

    /// Original call arguments.
    pub args: Vec<Value>,
}

impl HookCall {
    /// Creates a call with no instance (static member invocation).
    pub fn new(args: Vec<Value>) -> Self {
        Self {
            instance: None,
            args,
        }
    }

    /// Creates a call on a specific instance.
    pub fn on(instance: Rc<HostObject>, args: Vec<Value>) -> Self {
        Self {
            instance: Some(instance),
            args,
        }
    }

    /// Returns the argument at `index` as a string, if present and textual.
    pub fn str_arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(Value::as_str)
    }
}

/// An instance of a host class: class name plus a mutable field map.
pub struct HostObject {
    class: String,
    fields: RefCell<serde_json::Map<String, Value>>,
}

impl HostObject {
    /// Creates a fresh instance of the named class.
    pub fn new(class: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            class: class.into(),
            fields: RefCell::new(serde_json::Map::new()),
        })
    }

    /// Returns the raw class identifier this instance belongs to.
    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// Reads a field value, if set.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    /// Writes a field value, replacing any previous one.
    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        self.fields.borrow_mut().insert(name.into(), value);
    }
}

/// A host class handle: shared instance methods plus static members.
pub struct HostClass {
    name: String,
    methods: RefCell<HashMap<String, Rc<HostFn>>>,
    statics: RefCell<HashMap<String, Rc<HostFn>>>,
}

impl HostClass {
    fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            methods: RefCell::new(HashMap::new()),
            statics: RefCell::new(HashMap::new()),
        })
    }

    /// Returns the raw host identifier of this class.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Defines (or redefines) a shared instance method.
    pub fn define_method(&self, name: impl Into<String>, f: impl Fn(&HookCall) -> Value + 'static) {
        self.methods.borrow_mut().insert(name.into(), Rc::new(f));
    }

    /// Returns the current implementation of a method as a value.
    pub fn method(&self, name: &str) -> Option<Rc<HostFn>> {
        self.methods.borrow().get(name).cloned()
    }

    /// Installs a new implementation, returning the previous one.
    pub fn replace_method(&self, name: impl Into<String>, f: Rc<HostFn>) -> Option<Rc<HostFn>> {
        self.methods.borrow_mut().insert(name.into(), f)
    }

    /// Invokes a method the way the host's own loop does.
    ///
    /// Returns `None` when no such method exists.
    pub fn call(
        &self,
        method: &str,
        instance: Option<Rc<HostObject>>,
        args: Vec<Value>,
    ) -> Option<Value> {
        let f = self.method(method)?;
        let call = HookCall { instance, args };
        Some((*f)(&call))
    }

    /// Defines (or redefines) a function-valued member on the class object.
    pub fn define_static(&self, name: impl Into<String>, f: impl Fn(&HookCall) -> Value + 'static) {
        self.statics.borrow_mut().insert(name.into(), Rc::new(f));
    }

    /// Returns the current implementation of a static member as a value.
    pub fn static_member(&self, name: &str) -> Option<Rc<HostFn>> {
        self.statics.borrow().get(name).cloned()
    }

    /// Installs a new static implementation, returning the previous one.
    pub fn replace_static(&self, name: impl Into<String>, f: Rc<HostFn>) -> Option<Rc<HostFn>> {
        self.statics.borrow_mut().insert(name.into(), f)
    }

    /// Invokes a static member.
    pub fn call_static(&self, name: &str, args: Vec<Value>) -> Option<Value> {
        let f = self.static_member(name)?;
        let call = HookCall::new(args);
        Some((*f)(&call))
    }
}

/// The host binding: a name-indexed table of opaque class handles.
///
/// Identifiers are assumed stable per host-client version and may be
/// absent in others; lookups return `None` rather than failing.
#[derive(Default)]
pub struct HostBinding {
    classes: RefCell<HashMap<String, Rc<HostClass>>>,
}

impl HostBinding {
    /// Creates an empty binding.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Defines a class under its raw host identifier and returns its handle.
    pub fn define_class(&self, raw_id: impl Into<String>) -> Rc<HostClass> {
        let raw_id = raw_id.into();
        let class = HostClass::new(raw_id.clone());
        self.classes.borrow_mut().insert(raw_id, Rc::clone(&class));
        class
    }

    /// Looks up a class by raw host identifier.
    pub fn class(&self, raw_id: &str) -> Option<Rc<HostClass>> {
        self.classes.borrow().get(raw_id).cloned()
    }

    /// Returns the number of defined classes.
    pub fn len(&self) -> usize {
        self.classes.borrow().len()
    }

    /// Returns true if no classes are defined.
    pub fn is_empty(&self) -> bool {
        self.classes.borrow().is_empty()
    }

    /// Drops every class handle. Called when the host reloads its object
    /// graph; previously resolved handles keep working against the old
    /// graph but new lookups see only what the host redefines.
    pub fn invalidate(&self) {
        self.classes.borrow_mut().clear();
    }
}
