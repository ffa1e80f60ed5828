//! Method resolution for object-graph navigation.
//!
//! A `TypeRegistry` describes the classes queries can call methods on: user
//! classes registered by the application plus the built-in `String`,
//! `Collection`, `Entry`, `Region` and numeric classes. Resolution picks the most
//! specific applicable method and is memoized process-wide; every resolved
//! binding passes through a `MethodAuthorizer`.

mod authorizer;
mod builtins;
mod resolver;

pub use authorizer::{AllowAllAuthorizer, MethodAuthorizer, RestrictedAuthorizer};
pub use resolver::{resolution_cache_len, resolve_method};

use crate::error::MethodError;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use hashbrown::HashMap;
use std::sync::Arc;
use tessera_core::{ObjectType, Value};

/// Root of the class hierarchy.
pub const OBJECT_CLASS: &str = "Object";

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// A method body: receives the receiver and the evaluated arguments.
pub type MethodBody =
    Arc<dyn Fn(&Value, &[Value]) -> core::result::Result<Value, MethodError> + Send + Sync>;

/// A callable method of a registered class.
#[derive(Clone)]
pub struct MethodDescriptor {
    declaring_class: String,
    name: String,
    params: Vec<ObjectType>,
    body: MethodBody,
}

impl MethodDescriptor {
    /// Returns the class that declares the method.
    pub fn declaring_class(&self) -> &str {
        &self.declaring_class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared parameter types.
    pub fn params(&self) -> &[ObjectType] {
        &self.params
    }

    /// Returns `Class.method(Param, ...)`.
    pub fn signature(&self) -> String {
        let params: Vec<&str> = self.params.iter().map(|p| p.class_name()).collect();
        format!("{}.{}({})", self.declaring_class, self.name, params.join(", "))
    }

    /// Invokes the method body.
    pub fn invoke(&self, receiver: &Value, args: &[Value]) -> core::result::Result<Value, MethodError> {
        (self.body)(receiver, args)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// Description of one class.
#[derive(Clone, Debug)]
pub struct ClassDescriptor {
    name: String,
    superclass: Option<String>,
    methods: Vec<Arc<MethodDescriptor>>,
}

impl ClassDescriptor {
    /// Starts describing a class.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            methods: Vec::new(),
        }
    }

    /// Declares the superclass.
    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    /// Adds a method.
    pub fn method<F>(
        mut self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = ObjectType>,
        body: F,
    ) -> Self
    where
        F: Fn(&Value, &[Value]) -> core::result::Result<Value, MethodError> + Send + Sync + 'static,
    {
        self.methods.push(Arc::new(MethodDescriptor {
            declaring_class: self.name.clone(),
            name: name.into(),
            params: params.into_iter().collect(),
            body: Arc::new(body),
        }));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    /// Returns the methods declared directly on this class.
    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }
}

/// Registry of classes available to queries.
#[derive(Clone, Debug)]
pub struct TypeRegistry {
    id: u64,
    classes: HashMap<String, ClassDescriptor>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Creates a registry holding the built-in classes.
    pub fn new() -> Self {
        let mut registry = Self {
            id: 0,
            classes: HashMap::new(),
        };
        builtins::register(&mut registry);
        registry.id = NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed);
        registry
    }

    /// Registers (or replaces) a class.
    pub fn register(&mut self, class: ClassDescriptor) -> &mut Self {
        self.classes.insert(class.name.clone(), class);
        // Cached resolutions are keyed by registry id; a changed registry gets a new one.
        self.id = NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed);
        self
    }

    /// Builder form of `register`.
    pub fn with_class(mut self, class: ClassDescriptor) -> Self {
        self.register(class);
        self
    }

    /// Returns the registry identity used in the resolution cache key.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn class(&self, name: &str) -> Option<&ClassDescriptor> {
        self.classes.get(name)
    }

    /// Returns the superclass of a class. Every class but `Object` has one.
    pub fn superclass_of(&self, class: &str) -> Option<&str> {
        if class == OBJECT_CLASS {
            return None;
        }
        Some(
            self.classes
                .get(class)
                .and_then(|c| c.superclass())
                .unwrap_or(OBJECT_CLASS),
        )
    }

    /// Returns the class followed by its ancestors, ending at `Object`.
    pub fn lineage(&self, class: &str) -> Vec<String> {
        let mut chain = vec![class.to_owned()];
        let mut current = class;
        while let Some(parent) = self.superclass_of(current) {
            // A cyclic declaration stops at the repeat.
            if chain.iter().any(|c| c == parent) {
                break;
            }
            chain.push(parent.to_owned());
            current = parent;
        }
        chain
    }

    /// Returns true if `class` is `ancestor` or derives from it.
    pub fn is_subclass(&self, class: &str, ancestor: &str) -> bool {
        self.lineage(class).iter().any(|c| c == ancestor)
    }

    /// Returns true if a value of type `from` can be passed where `to` is expected.
    pub fn is_assignable(&self, from: &ObjectType, to: &ObjectType) -> bool {
        if from == to || is_root(to) {
            return true;
        }
        match (from, to) {
            (ObjectType::Null, t) => t.is_reference(),
            (f, t) if f.is_numeric() && t.is_numeric() => f.numeric_rank() <= t.numeric_rank(),
            (f, t) => self.is_subclass(f.class_name(), t.class_name()),
        }
    }
}

fn is_root(ty: &ObjectType) -> bool {
    match ty {
        ObjectType::Any => true,
        ObjectType::Object(name) => name == OBJECT_CLASS,
        _ => false,
    }
}
