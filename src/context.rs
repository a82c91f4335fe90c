//! Scoped capability registry
//!
//! Bindings created from factories look up their collaborators here. A
//! lookup that misses in a scope continues in the parent scope.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Instance = Arc<dyn Any + Send + Sync>;

/// A scope of registered instances
#[derive(Default)]
pub struct Context {
    parent: Option<Arc<Context>>,
    typed: HashMap<TypeId, Instance>,
    named: HashMap<String, Instance>,
    multi: HashMap<TypeId, Vec<Instance>>,
}

impl Context {
    /// An empty root scope
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty scope whose lookups fall back to `parent`
    pub fn child(parent: Arc<Context>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    /// The enclosing scope
    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }

    /// Register the instance of type `T`, replacing a previous one in this scope
    pub fn register<T: Any + Send + Sync>(&mut self, instance: T) {
        self.typed.insert(TypeId::of::<T>(), Arc::new(instance));
    }

    /// Register a shared instance of type `T`
    pub fn register_arc<T: Any + Send + Sync>(&mut self, instance: Arc<T>) {
        self.typed.insert(TypeId::of::<T>(), instance);
    }

    /// The instance of type `T`, searching enclosing scopes
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self.typed.get(&TypeId::of::<T>()) {
            Some(instance) => instance.clone().downcast::<T>().ok(),
            None => self.parent.as_ref().and_then(|p| p.get::<T>()),
        }
    }

    /// Register an instance under a key
    pub fn register_named<T: Any + Send + Sync>(&mut self, key: impl Into<String>, instance: T) {
        self.named.insert(key.into(), Arc::new(instance));
    }

    /// The instance registered under `key`, if it has type `T`
    pub fn get_named<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        match self.named.get(key) {
            Some(instance) => instance.clone().downcast::<T>().ok(),
            None => self.parent.as_ref().and_then(|p| p.get_named::<T>(key)),
        }
    }

    /// Add one of several instances of type `T`
    pub fn add<T: Any + Send + Sync>(&mut self, instance: T) {
        self.multi
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Arc::new(instance));
    }

    /// All instances of type `T`, enclosing scopes first
    pub fn all<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
        let mut instances = self
            .parent
            .as_ref()
            .map(|p| p.all::<T>())
            .unwrap_or_default();
        if let Some(local) = self.multi.get(&TypeId::of::<T>()) {
            instances.extend(local.iter().filter_map(|i| i.clone().downcast::<T>().ok()));
        }
        instances
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("typed", &self.typed.len())
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Precision(u32);

    #[test]
    fn test_lookup_falls_back_to_parent() {
        let mut root = Context::new();
        root.register(Precision(3));
        root.register_named("units", "m".to_string());
        let root = Arc::new(root);

        let mut child = Context::child(root.clone());
        assert_eq!(child.get::<Precision>().unwrap().as_ref(), &Precision(3));
        assert_eq!(child.get_named::<String>("units").unwrap().as_str(), "m");

        child.register(Precision(5));
        assert_eq!(child.get::<Precision>().unwrap().as_ref(), &Precision(5));
        assert_eq!(root.get::<Precision>().unwrap().as_ref(), &Precision(3));
    }

    #[test]
    fn test_missing_lookups() {
        let context = Context::new();
        assert!(context.get::<Precision>().is_none());
        // wrong type under an existing key
        let mut named = Context::new();
        named.register_named("units", 1u8);
        assert!(named.get_named::<String>("units").is_none());
    }

    #[test]
    fn test_multi_instances_parent_first() {
        let mut root = Context::new();
        root.add(Precision(1));
        let root = Arc::new(root);
        let mut child = Context::child(root);
        child.add(Precision(2));

        let all: Vec<u32> = child.all::<Precision>().iter().map(|p| p.0).collect();
        assert_eq!(all, vec![1, 2]);
    }
}
