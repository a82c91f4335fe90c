//! Binding registration
//!
//! The binding map is assembled from every configuration in dependency
//! order, in two passes: first each configuration registers its defaults,
//! then each gets a chance to override or remove entries.

use super::Binding;
use crate::config::{all_dependencies, Configuration};
use crate::context::Context;
use crate::error::Result;
use crate::namespaces::QName;
use indexmap::IndexMap;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Constructor of a binding, resolving its collaborators from a context
pub type BindingFactory = Arc<dyn Fn(&Context) -> Result<Arc<dyn Binding>> + Send + Sync>;

/// A registered binding: a ready instance or a factory
#[derive(Clone)]
pub enum BindingDescriptor {
    /// Shared instance
    Instance(Arc<dyn Binding>),
    /// Built on demand; the type id identifies the factory
    Factory(TypeId, BindingFactory),
}

impl BindingDescriptor {
    /// Descriptor for a ready instance
    pub fn instance(binding: impl Binding + 'static) -> Self {
        BindingDescriptor::Instance(Arc::new(binding))
    }

    /// Descriptor for a factory
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&Context) -> Result<Arc<dyn Binding>> + Send + Sync + 'static,
    {
        BindingDescriptor::Factory(TypeId::of::<F>(), Arc::new(factory))
    }

    /// True when both descriptors stand for the same binding: a shared
    /// handle, instances of equal [`Binding::identity`], or the same factory
    pub fn same_as(&self, other: &BindingDescriptor) -> bool {
        match (self, other) {
            (BindingDescriptor::Instance(a), BindingDescriptor::Instance(b)) => {
                Arc::ptr_eq(a, b) || a.identity() == b.identity()
            }
            (BindingDescriptor::Factory(a, first), BindingDescriptor::Factory(b, second)) => {
                a == b || Arc::ptr_eq(first, second)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for BindingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingDescriptor::Instance(binding) => write!(f, "Instance({:?})", binding),
            BindingDescriptor::Factory(..) => write!(f, "Factory"),
        }
    }
}

/// How a registration combines with earlier ones for the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPolicy {
    /// Replace whatever was registered
    Override,
    /// Append to the chain of cooperating bindings
    Extend,
}

/// Qualified name to binding chain
#[derive(Debug, Clone, Default)]
pub struct BindingMap {
    entries: IndexMap<QName, Vec<BindingDescriptor>>,
}

impl BindingMap {
    /// An empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `descriptor` for `name` under `policy`
    pub fn register(&mut self, name: QName, descriptor: BindingDescriptor, policy: ChainPolicy) {
        trace!(%name, ?policy, "registering binding");
        match policy {
            ChainPolicy::Override => {
                self.entries.insert(name, vec![descriptor]);
            }
            ChainPolicy::Extend => {
                let chain = self.entries.entry(name).or_default();
                if !chain.iter().any(|d| d.same_as(&descriptor)) {
                    chain.push(descriptor);
                }
            }
        }
    }

    /// Register a shared instance, replacing earlier registrations
    pub fn put(&mut self, binding: Arc<dyn Binding>) {
        self.register(binding.target(), BindingDescriptor::Instance(binding), ChainPolicy::Override);
    }

    /// Register a shared instance, extending the existing chain
    pub fn extend(&mut self, binding: Arc<dyn Binding>) {
        self.register(binding.target(), BindingDescriptor::Instance(binding), ChainPolicy::Extend);
    }

    /// Remove every registration for `name`
    pub fn remove(&mut self, name: &QName) -> Option<Vec<BindingDescriptor>> {
        self.entries.shift_remove(name)
    }

    /// Registrations for `name`, earliest first
    pub fn get(&self, name: &QName) -> Option<&[BindingDescriptor]> {
        self.entries.get(name).map(|chain| chain.as_slice())
    }

    /// True when something is registered for `name`
    pub fn contains(&self, name: &QName) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &QName> {
        self.entries.keys()
    }

    /// Number of registered names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the binding map for `root` and everything it depends on
pub fn build_binding_map(root: &Arc<Configuration>) -> Result<BindingMap> {
    let configurations = all_dependencies(root)?;
    let mut map = BindingMap::new();
    for configuration in &configurations {
        for configurer in configuration.configurers() {
            configurer.register_bindings(&mut map);
        }
    }
    for configuration in &configurations {
        for configurer in configuration.configurers() {
            configurer.configure_bindings(&mut map);
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindingConfigurer;

    #[derive(Debug)]
    struct Named(&'static str);

    impl Binding for Named {
        fn target(&self) -> QName {
            QName::local(self.0)
        }
    }

    /// Cooperates with [`Named`] on the same name
    #[derive(Debug)]
    struct Helper(&'static str);

    impl Binding for Helper {
        fn target(&self) -> QName {
            QName::local(self.0)
        }
    }

    /// Registers fresh instances on every call
    struct Defaults;

    impl BindingConfigurer for Defaults {
        fn register_bindings(&self, bindings: &mut BindingMap) {
            bindings.extend(Arc::new(Named("D")));
            bindings.extend(Arc::new(Helper("D")));
            bindings.register(
                QName::local("D"),
                BindingDescriptor::factory(|_: &Context| Ok(Arc::new(Named("D")) as Arc<dyn Binding>)),
                ChainPolicy::Extend,
            );
            bindings.put(Arc::new(Named("E")));
        }
    }

    fn same_maps(first: &BindingMap, second: &BindingMap) -> bool {
        first.names().eq(second.names())
            && first.names().all(|name| {
                let (a, b) = (first.get(name).unwrap(), second.get(name).unwrap());
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            })
    }

    #[test]
    fn test_override_replaces_chain() {
        let mut map = BindingMap::new();
        map.put(Arc::new(Named("A")));
        map.extend(Arc::new(Helper("A")));
        assert_eq!(map.get(&QName::local("A")).unwrap().len(), 2);

        map.put(Arc::new(Named("A")));
        assert_eq!(map.get(&QName::local("A")).unwrap().len(), 1);
    }

    #[test]
    fn test_extend_is_idempotent_for_shared_handles() {
        let shared: Arc<dyn Binding> = Arc::new(Named("B"));
        let mut map = BindingMap::new();
        map.extend(shared.clone());
        map.extend(shared.clone());
        assert_eq!(map.get(&QName::local("B")).unwrap().len(), 1);
    }

    #[test]
    fn test_extend_skips_bindings_of_the_same_identity() {
        let mut map = BindingMap::new();
        map.extend(Arc::new(Named("B")));
        map.extend(Arc::new(Named("B")));
        map.extend(Arc::new(Helper("B")));
        assert_eq!(map.get(&QName::local("B")).unwrap().len(), 2);
    }

    #[test]
    fn test_repeated_default_registration_is_idempotent() {
        let mut once = BindingMap::new();
        Defaults.register_bindings(&mut once);

        let mut twice = BindingMap::new();
        Defaults.register_bindings(&mut twice);
        Defaults.register_bindings(&mut twice);

        assert_eq!(once.get(&QName::local("D")).unwrap().len(), 3);
        assert!(same_maps(&once, &twice));
    }

    #[test]
    fn test_remove() {
        let mut map = BindingMap::new();
        map.put(Arc::new(Named("C")));
        assert!(map.contains(&QName::local("C")));
        assert!(map.remove(&QName::local("C")).is_some());
        assert!(map.is_empty());
    }
}
