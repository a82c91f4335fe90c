//! Binding instantiation

use super::{Binding, BindingDescriptor, BindingMap};
use crate::context::Context;
use crate::error::Result;
use crate::namespaces::QName;
use std::sync::Arc;
use tracing::trace;

/// Resolves registered bindings into instances
#[derive(Debug, Clone)]
pub struct BindingLoader {
    bindings: Arc<BindingMap>,
}

impl BindingLoader {
    /// Create a loader over a built binding map
    pub fn new(bindings: BindingMap) -> Self {
        Self {
            bindings: Arc::new(bindings),
        }
    }

    /// The underlying map
    pub fn bindings(&self) -> &BindingMap {
        &self.bindings
    }

    /// Every binding registered for `name`, earliest registration first
    ///
    /// Factories are run against `context`. Empty when nothing is registered.
    pub fn load_chain(&self, name: &QName, context: &Context) -> Result<Vec<Arc<dyn Binding>>> {
        let Some(descriptors) = self.bindings.get(name) else {
            return Ok(Vec::new());
        };
        descriptors
            .iter()
            .map(|descriptor| match descriptor {
                BindingDescriptor::Instance(binding) => Ok(binding.clone()),
                BindingDescriptor::Factory(_, factory) => {
                    trace!(%name, "instantiating binding");
                    factory(context)
                }
            })
            .collect()
    }

    /// The most recently registered binding for `name`
    pub fn load_binding(&self, name: &QName, context: &Context) -> Result<Option<Arc<dyn Binding>>> {
        Ok(self.load_chain(name, context)?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[derive(Debug)]
    struct Scaled(u32);

    impl Binding for Scaled {
        fn target(&self) -> QName {
            QName::local("Scaled")
        }
    }

    #[test]
    fn test_factory_uses_context() {
        let mut map = BindingMap::new();
        map.register(
            QName::local("Scaled"),
            BindingDescriptor::factory(|context: &Context| {
                let scale = context
                    .get::<u32>()
                    .ok_or_else(|| Error::Binding("no scale registered".into()))?;
                Ok(Arc::new(Scaled(*scale)) as Arc<dyn Binding>)
            }),
            super::super::ChainPolicy::Override,
        );
        let loader = BindingLoader::new(map);

        let mut context = Context::new();
        assert!(loader.load_binding(&QName::local("Scaled"), &context).is_err());

        context.register(7u32);
        let binding = loader.load_binding(&QName::local("Scaled"), &context).unwrap();
        assert_eq!(format!("{:?}", binding.unwrap()), "Scaled(7)");
    }

    #[test]
    fn test_unregistered_is_none() {
        let loader = BindingLoader::new(BindingMap::new());
        let context = Context::new();
        assert!(loader.load_binding(&QName::local("X"), &context).unwrap().is_none());
        assert!(loader.load_chain(&QName::local("X"), &context).unwrap().is_empty());
    }
}
