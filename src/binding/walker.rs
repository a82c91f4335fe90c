//! Binding chain assembly
//!
//! The chain for an element is gathered by walking its type hierarchy from
//! the most specific type upward, starting with the binding of the element
//! itself when it is global. An [`ExecutionMode::Override`] binding ends
//! the walk. The result is returned in execution order, most general
//! binding first, with [`ExecutionMode::Before`] bindings moved in front of
//! everything gathered above them.

use super::{Binding, BindingLoader, ExecutionMode};
use crate::context::Context;
use crate::error::Result;
use crate::namespaces::QName;
use crate::schema::{ElementDeclaration, Schema, TypeId, TypeWalker};
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// Assembles binding chains against one schema
pub struct BindingWalker<'a> {
    schema: &'a Schema,
    loader: &'a BindingLoader,
}

impl<'a> BindingWalker<'a> {
    /// Create a walker
    pub fn new(schema: &'a Schema, loader: &'a BindingLoader) -> Self {
        Self { schema, loader }
    }

    /// Chain for an element declaration
    pub fn element_chain(&self, element: &ElementDeclaration, context: &Context) -> Result<Vec<Arc<dyn Binding>>> {
        self.chain(Some(element), element.type_id, context)
    }

    /// Chain for a bare type
    pub fn type_chain(&self, type_id: TypeId, context: &Context) -> Result<Vec<Arc<dyn Binding>>> {
        self.chain(None, type_id, context)
    }

    /// Chain for `type_id`, preceded by the binding of `element` when it is global
    pub fn chain(
        &self,
        element: Option<&ElementDeclaration>,
        type_id: TypeId,
        context: &Context,
    ) -> Result<Vec<Arc<dyn Binding>>> {
        let mut levels: Vec<Arc<dyn Binding>> = Vec::new();

        if let Some(element) = element.filter(|e| e.global) {
            if self.collect(&element.name, context, &mut levels)? {
                return Ok(assemble(levels));
            }
        }

        for level in TypeWalker::new(self.schema).hierarchy(type_id) {
            let Some(name) = self.schema.type_name(level) else {
                continue;
            };
            if self.collect(name, context, &mut levels)? {
                break;
            }
        }
        Ok(assemble(levels))
    }

    /// Push the bindings registered for `name`, most specific first;
    /// returns true when an override ends the walk
    fn collect(&self, name: &QName, context: &Context, levels: &mut Vec<Arc<dyn Binding>>) -> Result<bool> {
        for binding in self.loader.load_chain(name, context)?.into_iter().rev() {
            let mode = binding.execution_mode();
            levels.push(binding);
            if mode == ExecutionMode::Override {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn assemble(levels: Vec<Arc<dyn Binding>>) -> Vec<Arc<dyn Binding>> {
    let mut chain = VecDeque::with_capacity(levels.len());
    for binding in levels.into_iter().rev() {
        match binding.execution_mode() {
            ExecutionMode::Before => chain.push_front(binding),
            ExecutionMode::After | ExecutionMode::Override => chain.push_back(binding),
        }
    }
    chain.into()
}

/// Ask the chain for a property, most specific binding first
pub fn chain_property(chain: &[Arc<dyn Binding>], value: &Value, name: &QName) -> Result<Option<Value>> {
    for binding in chain.iter().rev() {
        if let Some(found) = binding.property(value, name)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Collect additional properties from every binding in the chain
pub fn chain_properties(
    chain: &[Arc<dyn Binding>],
    value: &Value,
    element: &ElementDeclaration,
) -> Result<Vec<(QName, Value)>> {
    let mut properties = Vec::new();
    for binding in chain.iter().rev() {
        properties.extend(binding.properties(value, element)?);
    }
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingMap;
    use crate::schema::builtins::xs;

    #[derive(Debug)]
    struct Tagged(QName, ExecutionMode);

    impl Binding for Tagged {
        fn target(&self) -> QName {
            self.0.clone()
        }
        fn execution_mode(&self) -> ExecutionMode {
            self.1
        }
    }

    fn names(chain: &[Arc<dyn Binding>]) -> Vec<String> {
        chain.iter().map(|b| b.target().local_name).collect()
    }

    fn loader(bindings: Vec<Tagged>) -> BindingLoader {
        let mut map = BindingMap::new();
        for binding in bindings {
            map.put(Arc::new(binding));
        }
        BindingLoader::new(map)
    }

    #[test]
    fn test_chain_runs_general_first() {
        let schema = Schema::new();
        let loader = loader(vec![
            Tagged(xs("anyType"), ExecutionMode::After),
            Tagged(xs("decimal"), ExecutionMode::After),
            Tagged(xs("int"), ExecutionMode::After),
        ]);
        let int = schema.type_by_name(&xs("int")).unwrap();
        let chain = BindingWalker::new(&schema, &loader)
            .type_chain(int, &Context::new())
            .unwrap();
        assert_eq!(names(&chain), vec!["anyType", "decimal", "int"]);
    }

    #[test]
    fn test_override_stops_walk() {
        let schema = Schema::new();
        let loader = loader(vec![
            Tagged(xs("anyType"), ExecutionMode::After),
            Tagged(xs("integer"), ExecutionMode::Override),
            Tagged(xs("int"), ExecutionMode::After),
        ]);
        let int = schema.type_by_name(&xs("int")).unwrap();
        let chain = BindingWalker::new(&schema, &loader)
            .type_chain(int, &Context::new())
            .unwrap();
        assert_eq!(names(&chain), vec!["integer", "int"]);
    }

    #[test]
    fn test_before_moves_ahead_of_base() {
        let schema = Schema::new();
        let loader = loader(vec![
            Tagged(xs("anyType"), ExecutionMode::After),
            Tagged(xs("string"), ExecutionMode::Before),
        ]);
        let string = schema.type_by_name(&xs("string")).unwrap();
        let chain = BindingWalker::new(&schema, &loader)
            .type_chain(string, &Context::new())
            .unwrap();
        assert_eq!(names(&chain), vec!["string", "anyType"]);
    }

    #[test]
    fn test_global_element_binding_is_most_specific() {
        let mut schema = Schema::new();
        let string = schema.type_by_name(&xs("string")).unwrap();
        let name = QName::namespaced("urn:test", "Label");
        let id = schema.add_element(ElementDeclaration::new(name.clone(), string));
        let loader = loader(vec![
            Tagged(xs("string"), ExecutionMode::After),
            Tagged(name, ExecutionMode::After),
        ]);
        let chain = BindingWalker::new(&schema, &loader)
            .element_chain(schema.element(id), &Context::new())
            .unwrap();
        assert_eq!(names(&chain), vec!["string", "Label"]);
    }
}
